use serenity::{
    async_trait,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    error::JoinError,
    input::{Input, YoutubeDl},
    tracks::TrackHandle,
    Call, Event, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::events::TrackEventForwarder;
use crate::{
    audio::{
        events::{EventSink, PlaybackId},
        player::{Player, VoiceTransport},
        track::Track,
    },
    error::{PlaybackError, TransportError},
};

/// Conexiones de voz a través del gestor de Songbird registrado en el
/// cliente de serenity.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
        events: EventSink,
    ) -> Result<Box<dyn Player>, TransportError> {
        let call = self
            .manager
            .join(guild, channel)
            .await
            .map_err(|e| TransportError::Connect {
                guild,
                channel,
                reason: e.to_string(),
            })?;

        info!("🔊 Conectado al canal de voz en guild {}", guild);
        Ok(Box::new(SongbirdPlayer::new(
            guild,
            call,
            self.http.clone(),
            events,
        )))
    }

    async fn disconnect(&self, guild: GuildId) -> Result<(), TransportError> {
        match self.manager.remove(guild).await {
            Ok(()) => Ok(()),
            Err(JoinError::NoCall) => {
                debug!("Guild {} ya no tenía llamada de voz", guild);
                Ok(())
            }
            Err(e) => Err(TransportError::Disconnect {
                guild,
                reason: e.to_string(),
            }),
        }
    }
}

/// Reproduce sobre la `Call` de un guild; solo mantiene el handle del track
/// actual.
pub struct SongbirdPlayer {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    events: EventSink,
    current: Option<TrackHandle>,
    volume: f32,
}

impl SongbirdPlayer {
    pub fn new(
        guild_id: GuildId,
        call: Arc<Mutex<Call>>,
        http: reqwest::Client,
        events: EventSink,
    ) -> Self {
        Self {
            guild_id,
            call,
            http,
            events,
            current: None,
            volume: 1.0,
        }
    }

    fn control_error(e: impl std::fmt::Display) -> PlaybackError {
        PlaybackError::Control(e.to_string())
    }
}

/// Lo que `play` hace con un handle recién creado antes de adoptarlo
trait FreshTrack {
    fn forward_events(&self, forwarder: TrackEventForwarder) -> Result<(), String>;
    fn apply_volume(&self, volume: f32) -> Result<(), String>;
    fn discard(&self);
}

impl FreshTrack for TrackHandle {
    fn forward_events(&self, forwarder: TrackEventForwarder) -> Result<(), String> {
        for event in [TrackEvent::Play, TrackEvent::End, TrackEvent::Error] {
            self.add_event(Event::Track(event), forwarder.clone())
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn apply_volume(&self, volume: f32) -> Result<(), String> {
        self.set_volume(volume).map_err(|e| e.to_string())
    }

    fn discard(&self) {
        if let Err(e) = self.stop() {
            debug!("El track descartado ya había terminado: {}", e);
        }
    }
}

/// Registra los eventos y el volumen del track. Si algo falla, detiene el
/// track antes de devolver el error.
fn arm(
    handle: &impl FreshTrack,
    track: &Track,
    forwarder: TrackEventForwarder,
    volume: f32,
) -> Result<(), PlaybackError> {
    let armed = handle
        .forward_events(forwarder)
        .map_err(|reason| PlaybackError::Load {
            title: track.title().to_string(),
            reason,
        })
        .and_then(|()| {
            handle
                .apply_volume(volume)
                .map_err(SongbirdPlayer::control_error)
        });

    if armed.is_err() {
        handle.discard();
    }
    armed
}

#[async_trait]
impl Player for SongbirdPlayer {
    async fn play(&mut self, track: &Track, playback: PlaybackId) -> Result<(), PlaybackError> {
        if let Some(previous) = self.current.take() {
            if let Err(e) = previous.stop() {
                debug!("El track anterior ya había terminado: {}", e);
            }
        }

        let input: Input = YoutubeDl::new(self.http.clone(), track.identifier().to_string()).into();
        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        arm(
            &handle,
            track,
            TrackEventForwarder::new(self.guild_id, playback, self.events.clone()),
            self.volume,
        )?;

        self.current = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            if let Err(e) = handle.stop() {
                debug!("No se pudo detener el track en guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn set_paused(&mut self, paused: bool) -> Result<(), PlaybackError> {
        let handle = self.current.as_ref().ok_or(PlaybackError::NotConnected)?;
        if paused {
            handle.pause().map_err(Self::control_error)
        } else {
            handle.play().map_err(Self::control_error)
        }
    }

    async fn set_volume(&mut self, volume: f32) -> Result<(), PlaybackError> {
        self.volume = volume;
        if let Some(handle) = &self.current {
            handle.set_volume(volume).map_err(Self::control_error)?;
        }
        Ok(())
    }
}
