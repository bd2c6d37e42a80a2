use anyhow::Result;
use serenity::{
    builder::EditInteractionResponse,
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{manager::PlaybackManager, queue::QueueInfo},
    bot::OpenMusicBot,
    sources::AudioSourceProvider,
};

const ITEMS_PER_PAGE: usize = 10;

/// Maneja comandos slash.
///
/// Todas las respuestas se difieren primero: resolver una búsqueda o
/// conectarse a voz puede tardar más que la ventana de respuesta de Discord.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    command.defer(&ctx.http).await?;

    let manager = playback_manager(ctx).await?;
    let reply = match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, &manager, guild_id).await,
        "skip" => handle_skip(&manager, guild_id).await,
        "voteskip" => handle_voteskip(ctx, &command, &manager, guild_id).await,
        "shuffle" => handle_shuffle(&command, &manager, guild_id).await,
        "stop" => handle_stop(&manager, guild_id).await,
        "pause" => handle_pause(&manager, guild_id, true).await,
        "resume" => handle_pause(&manager, guild_id, false).await,
        "volume" => handle_volume(&command, &manager, guild_id).await,
        "queue" => handle_queue(&command, &manager, guild_id).await,
        "nowplaying" => handle_nowplaying(&manager, guild_id).await,
        _ => Ok("❌ Comando no reconocido".to_string()),
    };

    let content = reply.unwrap_or_else(|e| {
        warn!("Comando /{} falló en guild {}: {}", command.data.name, guild_id, e);
        format!("❌ {}", e)
    });

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

async fn playback_manager(ctx: &Context) -> Result<Arc<PlaybackManager>> {
    let data = ctx.data.read().await;
    data.get::<PlaybackManager>()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("PlaybackManager no inicializado"))
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    manager: &PlaybackManager,
    guild_id: GuildId,
) -> Result<String> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Verificar que el usuario esté en un canal de voz
    let channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;

    let mut tracks = bot.sources.resolve(query, command.user.id).await?;

    if tracks.len() == 1 {
        let track = tracks.remove(0);
        let title = track.to_string();
        let position = manager.queue_or_create(guild_id, channel_id, track).await?;
        return Ok(match position {
            0 => format!("🎵 Reproduciendo: {}", title),
            n => format!("✅ Agregado a la cola en posición {}: {}", n, title),
        });
    }

    let total = tracks.len();
    let report = manager.queue_all(guild_id, channel_id, tracks).await?;
    let mut reply = format!("📃 {} canciones agregadas a la cola", report.queued);
    if report.queued < total {
        reply.push_str(&format!(
            " ({} descartadas: cola llena)",
            total - report.queued
        ));
    }
    Ok(reply)
}

async fn handle_skip(manager: &PlaybackManager, guild_id: GuildId) -> Result<String> {
    let skipped = manager.skip(guild_id).await?;
    Ok(format!("⏭️ Saltado: {}", skipped.title()))
}

async fn handle_voteskip(
    ctx: &Context,
    command: &CommandInteraction,
    manager: &PlaybackManager,
    guild_id: GuildId,
) -> Result<String> {
    let session = manager
        .get(guild_id)
        .ok_or_else(|| anyhow::anyhow!("No hay nada reproduciéndose"))?;

    let channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;
    if channel_id != session.channel_id() {
        anyhow::bail!("Debes estar en el canal de voz del bot para votar");
    }

    let outcome = manager.vote_to_skip(guild_id, command.user.id).await?;
    Ok(match outcome.skipped {
        Some(track) => format!(
            "⏭️ Votación aprobada ({}/{}), saltando: {}",
            outcome.votes,
            outcome.required,
            track.title()
        ),
        None => format!(
            "🗳️ Voto registrado ({}/{} necesarios)",
            outcome.votes, outcome.required
        ),
    })
}

async fn handle_shuffle(
    command: &CommandInteraction,
    manager: &PlaybackManager,
    guild_id: GuildId,
) -> Result<String> {
    let shuffled = manager.shuffle(guild_id, command.user.id).await?;
    Ok(match shuffled {
        0 | 1 => "🔀 No tienes suficientes canciones en la cola para mezclar".to_string(),
        n => format!("🔀 {} de tus canciones fueron mezcladas", n),
    })
}

async fn handle_stop(manager: &PlaybackManager, guild_id: GuildId) -> Result<String> {
    manager.stop(guild_id).await?;
    Ok("⏹️ Reproducción detenida y cola limpiada".to_string())
}

async fn handle_pause(
    manager: &PlaybackManager,
    guild_id: GuildId,
    paused: bool,
) -> Result<String> {
    manager.set_paused(guild_id, paused).await?;
    Ok(if paused {
        "⏸️ Reproducción pausada".to_string()
    } else {
        "▶️ Reproducción reanudada".to_string()
    })
}

async fn handle_volume(
    command: &CommandInteraction,
    manager: &PlaybackManager,
    guild_id: GuildId,
) -> Result<String> {
    let level = integer_option(command, "level")
        .ok_or_else(|| anyhow::anyhow!("Nivel de volumen no proporcionado"))?;

    let applied = manager.set_volume(guild_id, level as f32 / 100.0).await?;
    Ok(format!("🔊 Volumen ajustado a {}%", (applied * 100.0).round() as u32))
}

async fn handle_queue(
    command: &CommandInteraction,
    manager: &PlaybackManager,
    guild_id: GuildId,
) -> Result<String> {
    let page = integer_option(command, "page").unwrap_or(1).max(1) as usize;
    let snapshot = manager.snapshot(guild_id).await?;
    Ok(format_queue(&snapshot.queue, page))
}

async fn handle_nowplaying(manager: &PlaybackManager, guild_id: GuildId) -> Result<String> {
    let snapshot = manager.snapshot(guild_id).await?;
    let current = snapshot
        .queue
        .current
        .ok_or_else(|| anyhow::anyhow!("No hay nada reproduciéndose"))?;

    let state = if snapshot.paused { "⏸️" } else { "🎵" };
    Ok(format!(
        "{} {}\nPedida por <@{}> · Volumen {}% · {} en cola",
        state,
        current,
        current.requested_by(),
        (snapshot.volume * 100.0).round() as u32,
        snapshot.queue.total_items
    ))
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

/// Texto de una página de la cola
pub fn format_queue(queue: &QueueInfo, page: usize) -> String {
    let mut lines = Vec::new();

    match &queue.current {
        Some(current) => lines.push(format!("🎵 **Ahora:** {}", current)),
        None => lines.push("🎵 **Ahora:** nada".to_string()),
    }

    if queue.total_items == 0 {
        lines.push("📭 La cola está vacía".to_string());
        return lines.join("\n");
    }

    let page = queue.get_page(page, ITEMS_PER_PAGE);
    for (offset, track) in page.items.iter().enumerate() {
        lines.push(format!("`{}.` {}", page.first_position + offset, track));
    }
    lines.push(format!(
        "Página {}/{} · {} canciones · {}",
        page.current_page,
        page.total_pages,
        queue.total_items,
        humantime::format_duration(queue.total_duration)
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{queue::MusicQueue, track::Track};
    use std::time::Duration;

    fn track(title: &str, secs: u64) -> Track {
        Track::new(title, format!("https://example.com/{}", title), UserId::new(1))
            .with_duration(Duration::from_secs(secs))
    }

    #[test]
    fn test_format_empty_queue() {
        let queue = MusicQueue::new(10);
        let text = format_queue(&queue.info(None), 1);

        assert!(text.contains("nada"));
        assert!(text.contains("La cola está vacía"));
    }

    #[test]
    fn test_format_queue_pages() {
        let mut queue = MusicQueue::new(50);
        for i in 0..12 {
            queue.push(track(&format!("t{}", i), 60)).unwrap();
        }
        let current = track("now", 30);
        let info = queue.info(Some(&current));

        let first = format_queue(&info, 1);
        assert!(first.contains("now"));
        assert!(first.contains("`1.` t0"));
        assert!(first.contains("Página 1/2"));

        let second = format_queue(&info, 2);
        assert!(second.contains("`11.` t10"));
        assert!(!second.contains("`1.` t0"));
        assert!(second.contains("12 canciones"));
    }
}
