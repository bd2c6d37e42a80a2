//! Fakes del backend de voz compartidos por los tests del motor.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};

use super::{
    bridge::AudioEventBridge,
    events::{AudioEvent, EventSink, PlaybackId, PlayerEvent, TrackEndReason},
    player::{MockListenerRoster, Player, VoiceTransport},
    registry::SessionRegistry,
    track::Track,
};
use crate::{
    config::EngineConfig,
    error::{PlaybackError, TransportError},
};

pub const GUILD: GuildId = GuildId::new(100);
pub const OTHER_GUILD: GuildId = GuildId::new(200);
pub const CHANNEL: ChannelId = ChannelId::new(10);
pub const OTHER_CHANNEL: ChannelId = ChannelId::new(20);

#[derive(Debug, Default)]
pub struct VoiceLog {
    pub connects: Vec<(GuildId, ChannelId)>,
    pub disconnects: Vec<GuildId>,
    pub played: Vec<(GuildId, String, PlaybackId)>,
    pub stops: Vec<GuildId>,
    pub paused: Vec<bool>,
    pub volumes: Vec<f32>,
}

/// Transporte en memoria que registra cada llamada
#[derive(Clone, Default)]
pub struct FakeTransport {
    log: Arc<Mutex<VoiceLog>>,
    fail_connect: bool,
    fail_disconnect: bool,
    connect_delay: Duration,
    disconnect_delay: Duration,
    broken: Arc<HashSet<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_disconnect_delay(mut self, delay: Duration) -> Self {
        self.disconnect_delay = delay;
        self
    }

    /// Tracks cuyo `play` falla al cargar
    pub fn with_broken(mut self, titles: &[&str]) -> Self {
        self.broken = Arc::new(titles.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn log(&self) -> MutexGuard<'_, VoiceLog> {
        self.log.lock().unwrap()
    }

    pub fn played_in(&self, guild: GuildId) -> Vec<String> {
        self.log()
            .played
            .iter()
            .filter(|(g, _, _)| *g == guild)
            .map(|(_, title, _)| title.clone())
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.log().connects.len()
    }

    pub fn disconnects(&self) -> Vec<GuildId> {
        self.log().disconnects.clone()
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
        events: EventSink,
    ) -> Result<Box<dyn Player>, TransportError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        self.log().connects.push((guild, channel));

        if self.fail_connect {
            return Err(TransportError::Connect {
                guild,
                channel,
                reason: "canal lleno".to_string(),
            });
        }

        Ok(Box::new(FakePlayer {
            guild,
            events,
            log: self.log.clone(),
            broken: self.broken.clone(),
            current: None,
        }))
    }

    async fn disconnect(&self, guild: GuildId) -> Result<(), TransportError> {
        if !self.disconnect_delay.is_zero() {
            tokio::time::sleep(self.disconnect_delay).await;
        }
        self.log().disconnects.push(guild);

        if self.fail_disconnect {
            return Err(TransportError::Disconnect {
                guild,
                reason: "gateway no disponible".to_string(),
            });
        }
        Ok(())
    }
}

/// Reproductor falso: emite `Started` al reproducir y `Ended(Stopped)` al
/// detener, igual que el driver real.
pub struct FakePlayer {
    guild: GuildId,
    events: EventSink,
    log: Arc<Mutex<VoiceLog>>,
    broken: Arc<HashSet<String>>,
    current: Option<PlaybackId>,
}

#[async_trait]
impl Player for FakePlayer {
    async fn play(&mut self, track: &Track, playback: PlaybackId) -> Result<(), PlaybackError> {
        if self.broken.contains(track.title()) {
            return Err(PlaybackError::Load {
                title: track.title().to_string(),
                reason: "formato no soportado".to_string(),
            });
        }

        if let Some(previous) = self.current.replace(playback) {
            self.events
                .player(self.guild, previous, PlayerEvent::Ended(TrackEndReason::Replaced));
        }
        self.log
            .lock()
            .unwrap()
            .played
            .push((self.guild, track.title().to_string(), playback));
        self.events.player(self.guild, playback, PlayerEvent::Started);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(playback) = self.current.take() {
            self.log.lock().unwrap().stops.push(self.guild);
            self.events
                .player(self.guild, playback, PlayerEvent::Ended(TrackEndReason::Stopped));
        }
    }

    async fn set_paused(&mut self, paused: bool) -> Result<(), PlaybackError> {
        self.log.lock().unwrap().paused.push(paused);
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> Result<(), PlaybackError> {
        self.log.lock().unwrap().volumes.push(volume);
        Ok(())
    }
}

pub fn roster(listeners: &[u64]) -> Arc<MockListenerRoster> {
    let listeners: Vec<UserId> = listeners.iter().map(|id| UserId::new(*id)).collect();
    let mut roster = MockListenerRoster::new();
    roster
        .expect_listeners()
        .returning(move |_, _| listeners.clone());
    Arc::new(roster)
}

pub fn config() -> EngineConfig {
    EngineConfig {
        default_volume: 0.5,
        max_queue_size: 50,
        teardown_timeout: Duration::from_secs(2),
    }
}

pub fn track(title: &str, requested_by: u64) -> Track {
    Track::new(
        title,
        format!("https://example.com/{}", title),
        UserId::new(requested_by),
    )
}

pub fn tracks(titles: &[&str], requested_by: u64) -> Vec<Track> {
    titles.iter().map(|title| track(title, requested_by)).collect()
}

/// Registro sin bridge: los eventos del reproductor quedan en el receptor
/// devuelto y los tests los entregan a mano.
pub fn registry(
    transport: &FakeTransport,
    listeners: &[u64],
) -> (Arc<SessionRegistry>, mpsc::UnboundedReceiver<AudioEvent>) {
    let (events, inbox) = EventSink::channel();
    let registry = SessionRegistry::new(
        config(),
        Arc::new(transport.clone()),
        roster(listeners),
        events,
    );
    (Arc::new(registry), inbox)
}

/// Espera a que `condition` se cumpla o falla tras dos segundos
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "la condición no se cumplió a tiempo"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Registro con su bridge corriendo, como lo arma `PlaybackManager`
pub fn bridged(
    transport: &FakeTransport,
    listeners: &[u64],
) -> (Arc<SessionRegistry>, EventSink, JoinHandle<()>) {
    let (events, inbox) = EventSink::channel();
    let registry = Arc::new(SessionRegistry::new(
        config(),
        Arc::new(transport.clone()),
        roster(listeners),
        events.clone(),
    ));
    let bridge = AudioEventBridge::spawn(registry.clone(), inbox);
    (registry, events, bridge)
}
