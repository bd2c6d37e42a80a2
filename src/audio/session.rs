//! Per-guild playback session.
//!
//! Each session is an actor: a tokio task that owns the queue, the current
//! track, the skip votes and the [`Player`]. Every mutation arrives through
//! its ordered inbox, so there is never more than one writer. The rest of the
//! crate only ever holds a [`SessionHandle`].
//!
//! Teardown is terminal and runs once: stop the player, await the voice
//! disconnect (bounded by `teardown_timeout`), then remove the registry entry
//! and signal termination. Commands still queued at that point are dropped
//! and their callers receive [`SessionError::NotFound`].

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    events::{EventSink, PlaybackId, PlaybackIds, PlayerEvent, TeardownCause, TrackEndReason},
    player::{ListenerRoster, Player, VoiceTransport},
    queue::{MusicQueue, QueueInfo},
    skip_votes::SkipVoteTracker,
    track::Track,
};
use crate::{
    config::EngineConfig,
    error::{PlaybackError, SessionError},
};

pub(crate) type SessionMap = Arc<DashMap<GuildId, SessionHandle>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Playing,
    Dead,
}

/// Resultado de agregar tracks a una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueReport {
    /// 0 si el primer track empezó a sonar de inmediato; si no, su posición
    /// (1-based) en la cola
    pub position: usize,
    /// Cuántos tracks se aceptaron
    pub queued: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoteOutcome {
    pub votes: usize,
    pub required: usize,
    /// El track saltado si este voto alcanzó el umbral
    pub skipped: Option<Track>,
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub state: SessionState,
    pub queue: QueueInfo,
    pub skip_votes: usize,
    pub paused: bool,
    pub volume: f32,
}

/// Dependencias que recibe cada sesión nueva
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub transport: Arc<dyn VoiceTransport>,
    pub roster: Arc<dyn ListenerRoster>,
    pub events: EventSink,
    pub sessions: SessionMap,
    pub playbacks: Arc<PlaybackIds>,
    pub config: EngineConfig,
}

type Reply<T> = oneshot::Sender<T>;

enum SessionCommand {
    Enqueue {
        tracks: Vec<Track>,
        reply: Reply<Result<EnqueueReport, SessionError>>,
    },
    Skip {
        reply: Reply<Result<Track, SessionError>>,
    },
    VoteSkip {
        user: UserId,
        playback: PlaybackId,
        reply: Reply<VoteOutcome>,
    },
    Shuffle {
        user: UserId,
        reply: Reply<usize>,
    },
    SetPaused {
        paused: bool,
        reply: Reply<Result<(), SessionError>>,
    },
    SetVolume {
        volume: f32,
        reply: Reply<Result<f32, SessionError>>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    Player {
        playback: PlaybackId,
        event: PlayerEvent,
    },
    Teardown {
        cause: TeardownCause,
    },
}

/// Referencia barata a una sesión viva. Todas las operaciones se envían al
/// actor y esperan su respuesta.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    guild_id: GuildId,
    channel_id: ChannelId,
    tx: mpsc::UnboundedSender<SessionCommand>,
    closing: Arc<AtomicBool>,
    now_playing: Arc<AtomicU64>,
    terminated: CancellationToken,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Enqueue { .. } => "Enqueue",
            Self::Skip { .. } => "Skip",
            Self::VoteSkip { .. } => "VoteSkip",
            Self::Shuffle { .. } => "Shuffle",
            Self::SetPaused { .. } => "SetPaused",
            Self::SetVolume { .. } => "SetVolume",
            Self::Snapshot { .. } => "Snapshot",
            Self::Player { .. } => "Player",
            Self::Teardown { .. } => "Teardown",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Reproducción en curso según la última actualización del actor
    pub(crate) fn current_playback(&self) -> PlaybackId {
        PlaybackId(self.now_playing.load(Ordering::SeqCst))
    }

    /// `true` desde que empezó el cierre de la sesión
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst) || self.terminated.is_cancelled()
    }

    /// Espera a que la sesión termine por completo (voz desconectada y
    /// entrada del registro eliminada).
    pub async fn terminated(&self) {
        self.terminated.cancelled().await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| SessionError::NotFound(self.guild_id))?;
        response.await.map_err(|_| SessionError::NotFound(self.guild_id))
    }

    /// Agrega tracks al final de la cola
    pub async fn enqueue(&self, tracks: Vec<Track>) -> Result<EnqueueReport, SessionError> {
        self.request(|reply| SessionCommand::Enqueue { tracks, reply })
            .await?
    }

    /// Salta el track actual y devuelve el track saltado
    pub async fn skip(&self) -> Result<Track, SessionError> {
        self.request(|reply| SessionCommand::Skip { reply }).await?
    }

    /// Registra un voto para saltar.
    ///
    /// El voto queda ligado al track que sonaba al enviarlo: si para cuando
    /// la sesión lo procesa ese track ya terminó, no cuenta.
    pub async fn vote_to_skip(&self, listener: UserId) -> Result<VoteOutcome, SessionError> {
        let playback = self.current_playback();
        self.request(|reply| SessionCommand::VoteSkip {
            user: listener,
            playback,
            reply,
        })
        .await
    }

    /// Mezcla los tracks en cola pedidos por `user`
    pub async fn shuffle(&self, user: UserId) -> Result<usize, SessionError> {
        self.request(|reply| SessionCommand::Shuffle { user, reply })
            .await
    }

    pub async fn set_paused(&self, paused: bool) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetPaused { paused, reply })
            .await?
    }

    /// Ajusta el volumen (0.0 - 2.0) y devuelve el valor aplicado
    pub async fn set_volume(&self, volume: f32) -> Result<f32, SessionError> {
        self.request(|reply| SessionCommand::SetVolume { volume, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Entrega un evento del reproductor sin esperar a que se procese
    pub(crate) fn deliver(&self, playback: PlaybackId, event: PlayerEvent) {
        if self
            .tx
            .send(SessionCommand::Player { playback, event })
            .is_err()
        {
            debug!(
                "Evento de reproductor para sesión cerrada en guild {} descartado",
                self.guild_id
            );
        }
    }

    /// Pide el cierre sin esperar a que termine
    pub fn request_teardown(&self, cause: TeardownCause) {
        // Si el inbox ya está cerrado la sesión está terminando por su cuenta
        let _ = self.tx.send(SessionCommand::Teardown { cause });
    }

    /// Cierra la sesión y espera a que termine. Idempotente.
    pub async fn teardown(&self, cause: TeardownCause) {
        self.request_teardown(cause);
        self.terminated().await;
    }
}

/// Estado de la sesión, propiedad exclusiva de su tarea.
pub(crate) struct PlaybackSession {
    id: u64,
    guild_id: GuildId,
    channel_id: ChannelId,
    state: SessionState,
    queue: MusicQueue,
    current: Option<Track>,
    votes: SkipVoteTracker,
    playback: PlaybackId,
    paused: bool,
    volume: f32,
    teardown_timeout: Duration,
    player: Option<Box<dyn Player>>,
    transport: Arc<dyn VoiceTransport>,
    roster: Arc<dyn ListenerRoster>,
    events: EventSink,
    sessions: SessionMap,
    playbacks: Arc<PlaybackIds>,
    closing: Arc<AtomicBool>,
    now_playing: Arc<AtomicU64>,
    terminated: CancellationToken,
}

type Started = oneshot::Receiver<Result<EnqueueReport, SessionError>>;

impl PlaybackSession {
    /// Lanza el actor de una sesión nueva. El primer track de `tracks` pasa
    /// a ser el actual y el resto va a la cola.
    ///
    /// El receptor devuelto se resuelve cuando la conexión de voz quedó
    /// establecida y el primer track fue entregado al reproductor.
    pub(crate) fn spawn(
        ctx: &SessionContext,
        id: u64,
        guild_id: GuildId,
        channel_id: ChannelId,
        tracks: Vec<Track>,
    ) -> (SessionHandle, Started) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (started_tx, started_rx) = oneshot::channel();
        let closing = Arc::new(AtomicBool::new(false));
        let now_playing = Arc::new(AtomicU64::new(0));
        let terminated = CancellationToken::new();

        let handle = SessionHandle {
            id,
            guild_id,
            channel_id,
            tx,
            closing: closing.clone(),
            now_playing: now_playing.clone(),
            terminated: terminated.clone(),
        };

        let session = Self {
            id,
            guild_id,
            channel_id,
            state: SessionState::Playing,
            queue: MusicQueue::new(ctx.config.max_queue_size),
            current: None,
            votes: SkipVoteTracker::new(),
            playback: PlaybackId::default(),
            paused: false,
            volume: ctx.config.default_volume.clamp(0.0, 2.0),
            teardown_timeout: ctx.config.teardown_timeout,
            player: None,
            transport: ctx.transport.clone(),
            roster: ctx.roster.clone(),
            events: ctx.events.clone(),
            sessions: ctx.sessions.clone(),
            playbacks: ctx.playbacks.clone(),
            closing,
            now_playing,
            terminated,
        };

        tokio::spawn(session.run(inbox, tracks, started_tx));

        (handle, started_rx)
    }

    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<SessionCommand>,
        tracks: Vec<Track>,
        started: oneshot::Sender<Result<EnqueueReport, SessionError>>,
    ) {
        info!(
            "🔗 Conectando al canal {} en guild {}",
            self.channel_id, self.guild_id
        );

        match self
            .transport
            .connect(self.guild_id, self.channel_id, self.events.clone())
            .await
        {
            Ok(mut player) => {
                if let Err(e) = player.set_volume(self.volume).await {
                    warn!("No se pudo aplicar el volumen inicial: {}", e);
                }
                self.player = Some(player);
            }
            Err(e) => {
                error!("❌ {}", e);
                // La llamada puede haber quedado a medio crear
                self.teardown(TeardownCause::ConnectFailed).await;
                let _ = started.send(Err(SessionError::Transport(e)));
                return;
            }
        }

        let report = self.start_with(tracks).await;
        let _ = started.send(Ok(report));

        while self.state == SessionState::Playing {
            match inbox.recv().await {
                Some(command) => self.handle(command).await,
                None => self.teardown(TeardownCause::Stopped).await,
            }
        }

        inbox.close();
        debug!("Sesión de guild {} finalizada", self.guild_id);
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Enqueue { tracks, reply } => {
                let _ = reply.send(self.enqueue(tracks));
            }
            SessionCommand::Skip { reply } => {
                let result = self.skip(TrackEndReason::Stopped).await;
                let _ = reply.send(result);
            }
            SessionCommand::VoteSkip {
                user,
                playback,
                reply,
            } => {
                let outcome = self.vote(user, playback).await;
                let _ = reply.send(outcome);
            }
            SessionCommand::Shuffle { user, reply } => {
                let shuffled = self
                    .queue
                    .shuffle_requested_by(user, &mut rand::thread_rng());
                let _ = reply.send(shuffled);
            }
            SessionCommand::SetPaused { paused, reply } => {
                let result = self.set_paused(paused).await;
                let _ = reply.send(result);
            }
            SessionCommand::SetVolume { volume, reply } => {
                let result = self.set_volume(volume).await;
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Player { playback, event } => {
                self.on_player_event(playback, event).await;
            }
            SessionCommand::Teardown { cause } => {
                self.teardown(cause).await;
            }
        }
    }

    async fn start_with(&mut self, tracks: Vec<Track>) -> EnqueueReport {
        let mut tracks = tracks.into_iter();
        let Some(first) = tracks.next() else {
            self.teardown(TeardownCause::QueueExhausted).await;
            return EnqueueReport {
                position: 0,
                queued: 0,
            };
        };

        let queued = 1 + self.queue.extend(tracks.collect());

        if !self.start(first).await {
            self.advance(TrackEndReason::LoadFailed).await;
        }

        EnqueueReport { position: 0, queued }
    }

    /// Entrega `track` al reproductor. Devuelve `false` si no se pudo cargar.
    async fn start(&mut self, track: Track) -> bool {
        self.playback = self.playbacks.allocate();
        self.now_playing.store(self.playback.0, Ordering::SeqCst);
        self.votes.clear();
        self.paused = false;

        let Some(player) = self.player.as_mut() else {
            warn!("{}", PlaybackError::NotConnected);
            return false;
        };

        match player.play(&track, self.playback).await {
            Ok(()) => {
                info!(
                    "🎵 Reproduciendo: {} en guild {} ({})",
                    track, self.guild_id, self.playback
                );
                self.current = Some(track);
                true
            }
            Err(e) => {
                warn!("❌ {} - saltando al siguiente", e);
                false
            }
        }
    }

    /// Fin del track actual: pasa al siguiente o cierra la sesión si la cola
    /// está vacía.
    async fn advance(&mut self, reason: TrackEndReason) {
        if let Some(ended) = self.current.take() {
            debug!(
                "⏹️ Terminó {} en guild {} ({:?})",
                ended.title(),
                self.guild_id,
                reason
            );
        }

        while let Some(next) = self.queue.pop_front() {
            if self.start(next).await {
                return;
            }
        }

        info!("📭 Cola vacía en guild {}", self.guild_id);
        self.teardown(TeardownCause::QueueExhausted).await;
    }

    async fn skip(&mut self, reason: TrackEndReason) -> Result<Track, SessionError> {
        let skipped = self
            .current
            .clone()
            .ok_or(SessionError::NotFound(self.guild_id))?;

        // El fin de este track llegará después como evento obsoleto
        if let Some(player) = self.player.as_mut() {
            player.stop().await;
        }

        info!("⏭️ Saltando {} en guild {}", skipped.title(), self.guild_id);
        self.advance(reason).await;

        Ok(skipped)
    }

    fn enqueue(&mut self, tracks: Vec<Track>) -> Result<EnqueueReport, SessionError> {
        let position = self.queue.len() + 1;

        match tracks.len() {
            0 => Err(SessionError::NothingToQueue),
            1 => {
                let track = tracks
                    .into_iter()
                    .next()
                    .ok_or(SessionError::NothingToQueue)?;
                let position = self.queue.push(track)?;
                Ok(EnqueueReport {
                    position,
                    queued: 1,
                })
            }
            _ => match self.queue.extend(tracks) {
                0 => Err(SessionError::QueueFull {
                    max: self.queue.max_size(),
                }),
                queued => Ok(EnqueueReport { position, queued }),
            },
        }
    }

    async fn vote(&mut self, user: UserId, playback: PlaybackId) -> VoteOutcome {
        let listeners = self.roster.listeners(self.guild_id, self.channel_id);
        let required = SkipVoteTracker::required_votes(listeners.len());

        if playback != self.playback {
            debug!(
                "Voto de {} para una reproducción anterior ({}) ignorado",
                user, playback
            );
            return VoteOutcome {
                votes: self.votes.current_votes(&listeners),
                required,
                skipped: None,
            };
        }

        self.votes.add_vote(user);
        let votes = self.votes.current_votes(&listeners);
        info!(
            "🗳️ {} votó para saltar en guild {} ({}/{})",
            user, self.guild_id, votes, required
        );

        let skipped = if votes >= required {
            self.skip(TrackEndReason::Stopped).await.ok()
        } else {
            None
        };

        VoteOutcome {
            votes,
            required,
            skipped,
        }
    }

    async fn set_paused(&mut self, paused: bool) -> Result<(), SessionError> {
        let player = self.player.as_mut().ok_or(PlaybackError::NotConnected)?;
        player.set_paused(paused).await?;
        self.paused = paused;

        if paused {
            info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        } else {
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        }
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> Result<f32, SessionError> {
        let clamped_volume = volume.clamp(0.0, 2.0);
        let player = self.player.as_mut().ok_or(PlaybackError::NotConnected)?;
        player.set_volume(clamped_volume).await?;
        self.volume = clamped_volume;

        info!(
            "🔊 Volumen ajustado a {}% en guild {}",
            (clamped_volume * 100.0) as u32,
            self.guild_id
        );
        Ok(clamped_volume)
    }

    /// Los votos se cuentan contra los oyentes actuales, igual que al votar
    fn snapshot(&mut self) -> SessionSnapshot {
        let listeners = self.roster.listeners(self.guild_id, self.channel_id);
        let skip_votes = self.votes.current_votes(&listeners);

        SessionSnapshot {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            state: self.state,
            queue: self.queue.info(self.current.as_ref()),
            skip_votes,
            paused: self.paused,
            volume: self.volume,
        }
    }

    async fn on_player_event(&mut self, playback: PlaybackId, event: PlayerEvent) {
        if playback != self.playback || self.current.is_none() {
            debug!(
                "Evento {:?} de {} obsoleto en guild {}",
                event, playback, self.guild_id
            );
            return;
        }

        match event {
            PlayerEvent::Started => {
                debug!("▶️ Track {} iniciado en guild {}", playback, self.guild_id);
            }
            PlayerEvent::Ended(reason) => self.advance(reason).await,
            PlayerEvent::Exception(reason) => {
                let title = self.current_title();
                error!("❌ {}", PlaybackError::Exception { title, reason });
                self.advance(TrackEndReason::Failed).await;
            }
            PlayerEvent::Stuck(threshold) => {
                let title = self.current_title();
                warn!(
                    "⚠️ {}",
                    PlaybackError::Stuck {
                        title,
                        threshold_ms: threshold.as_millis(),
                    }
                );
                if let Err(e) = self.skip(TrackEndReason::Stuck).await {
                    debug!("No se pudo detener el track atascado: {}", e);
                }
            }
        }
    }

    fn current_title(&self) -> String {
        self.current
            .as_ref()
            .map(|track| track.title().to_string())
            .unwrap_or_default()
    }

    async fn teardown(&mut self, cause: TeardownCause) {
        if self.state == SessionState::Dead {
            debug!("Sesión de guild {} ya cerrada ({:?})", self.guild_id, cause);
            return;
        }

        self.closing.store(true, Ordering::SeqCst);
        info!("🛑 Cerrando sesión de guild {} ({:?})", self.guild_id, cause);

        if let Some(mut player) = self.player.take() {
            player.stop().await;
        }
        self.current = None;
        let dropped = self.queue.clear();
        self.votes.clear();
        if dropped > 0 {
            debug!("🗑️ {} canciones descartadas en guild {}", dropped, self.guild_id);
        }

        match tokio::time::timeout(self.teardown_timeout, self.transport.disconnect(self.guild_id))
            .await
        {
            Ok(Ok(())) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Ok(Err(e)) => warn!("⚠️ {} - la sesión se cierra igualmente", e),
            Err(_) => warn!(
                "⚠️ Timeout de {:?} desconectando guild {} - la sesión se cierra igualmente",
                self.teardown_timeout, self.guild_id
            ),
        }

        self.state = SessionState::Dead;
        self.detach();
    }

    /// Elimina la entrada del registro (solo si sigue siendo esta sesión) y
    /// despierta a quienes esperan la terminación.
    fn detach(&self) {
        let id = self.id;
        self.sessions
            .remove_if(&self.guild_id, |_, handle| handle.id() == id);
        self.terminated.cancel();
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        // Solo ocurre si la tarea terminó sin pasar por teardown (panic)
        if !self.terminated.is_cancelled() {
            self.closing.store(true, Ordering::SeqCst);
            self.detach();
        }
    }
}
