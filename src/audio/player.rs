//! Seams towards the voice backend.
//!
//! The session only talks to these traits; `crate::voice` implements them
//! on top of Songbird and the serenity cache.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};

use super::{
    events::{EventSink, PlaybackId},
    track::Track,
};
use crate::error::{PlaybackError, TransportError};

/// Reproduce un único track a la vez sobre una conexión de voz.
///
/// Los eventos (inicio, fin, error) se emiten de forma asíncrona por el
/// `EventSink` recibido en `VoiceTransport::connect`, etiquetados con el
/// `PlaybackId` de la llamada a `play` que los produjo.
#[async_trait]
pub trait Player: Send {
    async fn play(&mut self, track: &Track, playback: PlaybackId) -> Result<(), PlaybackError>;

    /// Detiene el track actual. Sin efecto si no hay ninguno.
    async fn stop(&mut self);

    async fn set_paused(&mut self, paused: bool) -> Result<(), PlaybackError>;

    async fn set_volume(&mut self, volume: f32) -> Result<(), PlaybackError>;
}

/// Abre y cierra la conexión de voz de un guild.
///
/// `connect` devuelve el reproductor ligado a esa conexión: es el lado de
/// envío de audio.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
        events: EventSink,
    ) -> Result<Box<dyn Player>, TransportError>;

    async fn disconnect(&self, guild: GuildId) -> Result<(), TransportError>;
}

/// Oyentes (miembros que no son bots) conectados a un canal de voz.
#[cfg_attr(test, mockall::automock)]
pub trait ListenerRoster: Send + Sync {
    fn listeners(&self, guild: GuildId, channel: ChannelId) -> Vec<UserId>;
}
