use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info};

use super::{
    events::{EventSink, PlaybackIds, TeardownCause},
    player::{ListenerRoster, VoiceTransport},
    session::{EnqueueReport, PlaybackSession, SessionContext, SessionHandle, SessionMap},
    track::Track,
};
use crate::{config::EngineConfig, error::SessionError};

/// Mapa único guild -> sesión.
///
/// El `DashMap` solo se toca para insertar, consultar y eliminar; ninguna
/// espera (conexión, desconexión) ocurre con un shard bloqueado. Las
/// entradas las elimina la propia sesión al terminar su cierre.
///
/// Tras `shutdown` no se crean sesiones nuevas.
pub struct SessionRegistry {
    sessions: SessionMap,
    context: SessionContext,
    next_id: AtomicU64,
    closed: AtomicBool,
}

enum Attach {
    Created(tokio::sync::oneshot::Receiver<Result<EnqueueReport, SessionError>>),
    Existing(SessionHandle),
    Closing(SessionHandle),
}

impl SessionRegistry {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn VoiceTransport>,
        roster: Arc<dyn ListenerRoster>,
        events: EventSink,
    ) -> Self {
        let sessions: SessionMap = Arc::new(DashMap::new());

        Self {
            context: SessionContext {
                transport,
                roster,
                events,
                sessions: sessions.clone(),
                playbacks: Arc::new(PlaybackIds::default()),
                config,
            },
            sessions,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Sesión viva del guild, si existe. Sin efectos secundarios.
    pub fn get_session(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.lookup(guild_id).filter(|handle| !handle.is_closing())
    }

    /// Como `get_session` pero incluye sesiones que se están cerrando
    pub(crate) fn lookup(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Crea la sesión del guild con `tracks` o, si ya existe una viva, agrega
    /// los tracks a su cola.
    ///
    /// Si la sesión existente se está cerrando, espera a que termine y crea
    /// una nueva.
    pub async fn create_or_enqueue(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        tracks: Vec<Track>,
    ) -> Result<EnqueueReport, SessionError> {
        if tracks.is_empty() {
            return Err(SessionError::NothingToQueue);
        }

        loop {
            let attach = match self.sessions.entry(guild_id) {
                Entry::Occupied(entry) if entry.get().is_closing() => {
                    Attach::Closing(entry.get().clone())
                }
                Entry::Occupied(entry) => Attach::Existing(entry.get().clone()),
                // El flag se lee con el shard bloqueado: `shutdown` ve la
                // entrada o esta inserción ve el flag
                Entry::Vacant(_) if self.is_closed() => return Err(SessionError::ShuttingDown),
                Entry::Vacant(entry) => {
                    let (handle, started) = self.spawn(guild_id, channel_id, tracks.clone());
                    entry.insert(handle);
                    Attach::Created(started)
                }
            };

            match attach {
                Attach::Created(started) => {
                    return started
                        .await
                        .map_err(|_| SessionError::NotFound(guild_id))?;
                }
                Attach::Existing(handle) => match handle.enqueue(tracks.clone()).await {
                    // Se cerró mientras esperábamos; los tracks no entraron
                    Err(SessionError::NotFound(_)) if handle.is_closing() => {
                        handle.terminated().await;
                    }
                    result => return result,
                },
                Attach::Closing(handle) => {
                    debug!(
                        "⏳ Esperando el cierre de la sesión anterior en guild {}",
                        guild_id
                    );
                    handle.terminated().await;
                }
            }
        }
    }

    /// Crea una sesión nueva; falla si el guild ya tiene una viva.
    pub async fn create(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        tracks: Vec<Track>,
    ) -> Result<SessionHandle, SessionError> {
        if tracks.is_empty() {
            return Err(SessionError::NothingToQueue);
        }

        let (handle, started) = match self.sessions.entry(guild_id) {
            Entry::Occupied(_) => return Err(SessionError::AlreadyExists(guild_id)),
            Entry::Vacant(_) if self.is_closed() => return Err(SessionError::ShuttingDown),
            Entry::Vacant(entry) => {
                let (handle, started) = self.spawn(guild_id, channel_id, tracks);
                entry.insert(handle.clone());
                (handle, started)
            }
        };

        started
            .await
            .map_err(|_| SessionError::NotFound(guild_id))??;
        Ok(handle)
    }

    fn spawn(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        tracks: Vec<Track>,
    ) -> (
        SessionHandle,
        tokio::sync::oneshot::Receiver<Result<EnqueueReport, SessionError>>,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!("🎶 Nueva sesión de reproducción en guild {}", guild_id);
        PlaybackSession::spawn(&self.context, id, guild_id, channel_id, tracks)
    }

    /// Cierra la sesión del guild y espera a que termine. Sin efecto si no
    /// hay ninguna.
    pub async fn remove_session(&self, guild_id: GuildId, cause: TeardownCause) {
        if let Some(handle) = self.lookup(guild_id) {
            handle.teardown(cause).await;
        }
    }

    /// Cierra todas las sesiones en paralelo y rechaza las nuevas
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let handles: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        if handles.is_empty() {
            return;
        }

        info!("⚠️ Cerrando {} sesiones activas", handles.len());
        join_all(
            handles
                .iter()
                .map(|handle| handle.teardown(TeardownCause::Shutdown)),
        )
        .await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
