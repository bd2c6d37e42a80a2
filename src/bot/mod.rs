//! # Bot Module
//!
//! Discord glue for Open Music Bot.
//!
//! This module contains:
//! - Command registration and handling
//! - Gateway events that end playback sessions (bot kicked from voice,
//!   bot removed from a guild)
//!
//! ## Architecture
//!
//! [`OpenMusicBot`] implements Serenity's [`EventHandler`]. Playback itself
//! lives in [`PlaybackManager`], which is stored in the client's `TypeMap`
//! once the Songbird manager and the cache exist.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
    model::guild::Guild,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{events::LifecycleEvent, manager::PlaybackManager},
    config::Config,
    sources::YtDlpProvider,
};

/// Main Discord bot handler for Open Music Bot.
///
/// ## Fields
///
/// - `config`: Bot configuration (tokens, limits)
/// - `sources`: Resolves `/play` queries into tracks
pub struct OpenMusicBot {
    config: Arc<Config>,
    pub sources: Arc<YtDlpProvider>,
}

impl OpenMusicBot {
    pub fn new(config: Config, sources: Arc<YtDlpProvider>) -> Self {
        Self {
            config: Arc::new(config),
            sources,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered per guild when `GUILD_ID` is set (instant
    /// propagation, useful for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    async fn publish(&self, ctx: &Context, event: LifecycleEvent) {
        let data = ctx.data.read().await;
        match data.get::<PlaybackManager>() {
            Some(manager) => manager.events().lifecycle(event),
            None => debug!("PlaybackManager aún no disponible, {:?} descartado", event),
        }
    }
}

#[async_trait]
impl EventHandler for OpenMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        let sources = self.sources.clone();
        tokio::spawn(async move {
            if let Err(e) = sources.verify_dependencies().await {
                warn!("Error verificando dependencias: {}", e);
            }
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Detecta cuando el bot sale (o lo sacan) de un canal de voz.
    ///
    /// Solo interesa el estado del propio bot; el canal anterior permite a la
    /// sesión ignorar salidas de un canal que ya no es el suyo.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        let Some(guild) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild);
        let channel = old.and_then(|state| state.channel_id);
        self.publish(&ctx, LifecycleEvent::VoiceLeft { guild, channel })
            .await;
    }

    async fn guild_delete(&self, ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Una caída de Discord también marca la guild como no disponible
        if incomplete.unavailable {
            warn!("⚠️ Guild {} no disponible temporalmente", incomplete.id);
            return;
        }

        info!("🚪 El bot fue removido de la guild {}", incomplete.id);
        self.publish(&ctx, LifecycleEvent::GuildLeft(incomplete.id))
            .await;
    }
}
