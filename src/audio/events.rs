//! Closed set of events the engine reacts to.
//!
//! Player callbacks and guild/voice lifecycle notifications are funneled into
//! a single FIFO consumed by [`AudioEventBridge`](super::bridge::AudioEventBridge).
//! Anything a backend emits that is not listed here is dropped at the adapter.

use serenity::model::id::{ChannelId, GuildId};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Identifica una llamada concreta a `Player::play`.
///
/// Los ids salen de un [`PlaybackIds`] compartido por todo el registro, así
/// que nunca se repiten entre sesiones sucesivas del mismo guild. Los eventos
/// del reproductor llevan este id; la sesión descarta los que no
/// corresponden a la reproducción actual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PlaybackId(pub(crate) u64);

/// Contador de `PlaybackId` compartido por todas las sesiones
#[derive(Debug, Default)]
pub struct PlaybackIds(AtomicU64);

impl PlaybackIds {
    pub fn allocate(&self) -> PlaybackId {
        PlaybackId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    Stopped,
    Replaced,
    Cleanup,
    LoadFailed,
    /// Excepción del decodificador
    Failed,
    Stuck,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Started,
    Ended(TrackEndReason),
    Exception(String),
    Stuck(Duration),
}

/// Motivo del cierre de una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownCause {
    QueueExhausted,
    Stopped,
    GuildLeft,
    VoiceLeft,
    Shutdown,
    ConnectFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Shutdown,
    GuildLeft(GuildId),
    /// El bot salió (o lo sacaron) del canal de voz. `channel` es el canal
    /// anterior si se conoce.
    VoiceLeft {
        guild: GuildId,
        channel: Option<ChannelId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    Player {
        guild: GuildId,
        playback: PlaybackId,
        event: PlayerEvent,
    },
    Lifecycle(LifecycleEvent),
}

/// Extremo de envío hacia el bridge. Barato de clonar y no bloqueante, así
/// que puede usarse desde callbacks del driver de voz o del gateway.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AudioEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AudioEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn player(&self, guild: GuildId, playback: PlaybackId, event: PlayerEvent) {
        self.send(AudioEvent::Player {
            guild,
            playback,
            event,
        });
    }

    pub fn lifecycle(&self, event: LifecycleEvent) {
        self.send(AudioEvent::Lifecycle(event));
    }

    fn send(&self, event: AudioEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Bridge detenido, evento descartado: {:?}", e.0);
        }
    }
}
