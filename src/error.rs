//! Error types shared by the playback engine and its adapters.

use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;

/// Errores que el motor devuelve a la capa de comandos.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No hay una sesión de reproducción activa en guild {0}")]
    NotFound(GuildId),

    #[error("Ya existe una sesión de reproducción en guild {0}")]
    AlreadyExists(GuildId),

    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("No hay canciones para agregar")]
    NothingToQueue,

    #[error("El motor de reproducción se está apagando")]
    ShuttingDown,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Fallos de la conexión de voz.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("No se pudo conectar al canal {channel} en guild {guild}: {reason}")]
    Connect {
        guild: GuildId,
        channel: ChannelId,
        reason: String,
    },

    #[error("No se pudo desconectar de guild {guild}: {reason}")]
    Disconnect { guild: GuildId, reason: String },
}

/// Fallos del reproductor. Nunca llegan al llamador original de `queue`;
/// la sesión se recupera avanzando al siguiente track.
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    #[error("No se pudo cargar '{title}': {reason}")]
    Load { title: String, reason: String },

    #[error("Error al reproducir '{title}': {reason}")]
    Exception { title: String, reason: String },

    #[error("'{title}' se atascó durante {threshold_ms}ms")]
    Stuck { title: String, threshold_ms: u128 },

    #[error("Error de control del reproductor: {0}")]
    Control(String),

    #[error("El reproductor no está conectado")]
    NotConnected,
}

/// Fallos al resolver una búsqueda o URL en tracks reproducibles.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("No se encontraron resultados para: {0}")]
    NoMatches(String),

    #[error("'{title}' excede la duración máxima permitida ({max_secs}s)")]
    TooLong { title: String, max_secs: u64 },

    #[error("yt-dlp falló: {0}")]
    Process(String),

    #[error("No se pudo ejecutar yt-dlp: {0}")]
    Io(#[from] std::io::Error),

    #[error("Respuesta inválida de yt-dlp: {0}")]
    Parse(#[from] serde_json::Error),
}
