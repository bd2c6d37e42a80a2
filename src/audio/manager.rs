use serenity::{
    model::id::{ChannelId, GuildId, UserId},
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{info, warn};

use super::{
    bridge::AudioEventBridge,
    events::{EventSink, LifecycleEvent, TeardownCause},
    player::{ListenerRoster, VoiceTransport},
    registry::SessionRegistry,
    session::{EnqueueReport, SessionHandle, SessionSnapshot, VoteOutcome},
    track::Track,
};
use crate::{config::EngineConfig, error::SessionError};

/// Punto de entrada del motor para la capa de comandos.
///
/// Agrupa el registro de sesiones y el bridge de eventos. Se guarda en el
/// `TypeMap` de serenity igual que el resto de servicios compartidos.
pub struct PlaybackManager {
    registry: Arc<SessionRegistry>,
    events: EventSink,
    bridge: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackManager {
    /// Crea el manager y lanza el bridge de eventos. Debe llamarse dentro de
    /// un runtime de tokio.
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn VoiceTransport>,
        roster: Arc<dyn ListenerRoster>,
    ) -> Self {
        info!("🎵 Inicializando PlaybackManager");

        let (events, inbox) = EventSink::channel();
        let registry = Arc::new(SessionRegistry::new(
            config,
            transport,
            roster,
            events.clone(),
        ));
        let bridge = AudioEventBridge::spawn(registry.clone(), inbox);

        Self {
            registry,
            events,
            bridge: Mutex::new(Some(bridge)),
        }
    }

    /// Emisor para eventos del reproductor y del ciclo de vida del guild
    pub fn events(&self) -> EventSink {
        self.events.clone()
    }

    /// Agrega un track; crea la sesión si el guild no tiene una.
    ///
    /// Devuelve 0 si el track empezó a sonar de inmediato, si no su posición
    /// en la cola.
    pub async fn queue_or_create(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        track: Track,
    ) -> Result<usize, SessionError> {
        let report = self
            .registry
            .create_or_enqueue(guild_id, channel_id, vec![track])
            .await?;
        Ok(report.position)
    }

    /// Agrega varios tracks en orden; el primero puede crear la sesión
    pub async fn queue_all(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        tracks: Vec<Track>,
    ) -> Result<EnqueueReport, SessionError> {
        self.registry
            .create_or_enqueue(guild_id, channel_id, tracks)
            .await
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<Track, SessionError> {
        self.session(guild_id)?.skip().await
    }

    pub async fn vote_to_skip(
        &self,
        guild_id: GuildId,
        listener: UserId,
    ) -> Result<VoteOutcome, SessionError> {
        self.session(guild_id)?.vote_to_skip(listener).await
    }

    pub async fn shuffle(&self, guild_id: GuildId, user_id: UserId) -> Result<usize, SessionError> {
        self.session(guild_id)?.shuffle(user_id).await
    }

    /// Detiene la reproducción, limpia la cola y sale del canal de voz
    pub async fn stop(&self, guild_id: GuildId) -> Result<(), SessionError> {
        let session = self.session(guild_id)?;
        session.teardown(TeardownCause::Stopped).await;
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        Ok(())
    }

    pub async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), SessionError> {
        self.session(guild_id)?.set_paused(paused).await
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: f32) -> Result<f32, SessionError> {
        self.session(guild_id)?.set_volume(volume).await
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Result<SessionSnapshot, SessionError> {
        self.session(guild_id)?.snapshot().await
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.registry.get_session(guild_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Cierra todas las sesiones (esperando cada desconexión) y detiene el
    /// bridge.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        self.events.lifecycle(LifecycleEvent::Shutdown);

        if let Some(bridge) = self.bridge.lock().await.take() {
            if let Err(e) = bridge.await {
                warn!("El bridge de eventos terminó con error: {:?}", e);
            }
        }
        info!("✅ PlaybackManager detenido");
    }

    fn session(&self, guild_id: GuildId) -> Result<SessionHandle, SessionError> {
        self.registry
            .get_session(guild_id)
            .ok_or(SessionError::NotFound(guild_id))
    }
}

impl TypeMapKey for PlaybackManager {
    type Value = Arc<PlaybackManager>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        events::{PlayerEvent, TrackEndReason},
        testing::{self, FakeTransport, CHANNEL, GUILD, OTHER_GUILD},
    };
    use pretty_assertions::assert_eq;

    fn manager(transport: &FakeTransport, listeners: &[u64]) -> PlaybackManager {
        PlaybackManager::new(
            testing::config(),
            Arc::new(transport.clone()),
            testing::roster(listeners),
        )
    }

    #[tokio::test]
    async fn test_queue_reports_positions() {
        let transport = FakeTransport::new();
        let manager = manager(&transport, &[1]);

        let mut positions = Vec::new();
        for title in ["a", "b", "c"] {
            positions.push(
                manager
                    .queue_or_create(GUILD, CHANNEL, testing::track(title, 1))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(manager.active_sessions(), 1);
        let snapshot = manager.snapshot(GUILD).await.unwrap();
        assert_eq!(snapshot.queue.total_items, 2);
        assert_eq!(snapshot.channel_id, CHANNEL);
    }

    #[tokio::test]
    async fn test_queue_all_reports_accepted_tracks() {
        let transport = FakeTransport::new();
        let manager = manager(&transport, &[1]);

        let report = manager
            .queue_all(GUILD, CHANNEL, testing::tracks(&["a", "b", "c"], 1))
            .await
            .unwrap();
        assert_eq!(report, EnqueueReport { position: 0, queued: 3 });

        let report = manager
            .queue_all(GUILD, CHANNEL, testing::tracks(&["d", "e"], 1))
            .await
            .unwrap();
        assert_eq!(report, EnqueueReport { position: 3, queued: 2 });
    }

    #[tokio::test]
    async fn test_skip_with_empty_queue_ends_the_session() {
        let transport = FakeTransport::new();
        let manager = manager(&transport, &[1]);
        manager
            .queue_or_create(GUILD, CHANNEL, testing::track("a", 1))
            .await
            .unwrap();

        let skipped = manager.skip(GUILD).await.unwrap();

        assert_eq!(skipped.title(), "a");
        assert!(manager.get(GUILD).is_none());
        assert_eq!(transport.disconnects(), vec![GUILD]);
    }

    #[tokio::test]
    async fn test_vote_to_skip_through_the_manager() {
        let transport = FakeTransport::new();
        let manager = manager(&transport, &[1, 2, 3, 4]);
        manager
            .queue_all(GUILD, CHANNEL, testing::tracks(&["a", "b"], 1))
            .await
            .unwrap();

        let first = manager.vote_to_skip(GUILD, UserId::new(1)).await.unwrap();
        assert_eq!((first.votes, first.required, first.skipped), (1, 2, None));

        let second = manager.vote_to_skip(GUILD, UserId::new(2)).await.unwrap();
        assert_eq!(second.skipped.map(|t| t.title().to_string()), Some("a".to_string()));
        assert_eq!(transport.played_in(GUILD), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stop_removes_the_session() {
        let transport = FakeTransport::new();
        let manager = manager(&transport, &[1]);
        manager
            .queue_all(GUILD, CHANNEL, testing::tracks(&["a", "b"], 1))
            .await
            .unwrap();

        manager.stop(GUILD).await.unwrap();

        assert!(manager.get(GUILD).is_none());
        assert_eq!(manager.active_sessions(), 0);
        assert_eq!(transport.disconnects(), vec![GUILD]);
        assert!(matches!(manager.stop(GUILD).await, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_guild_is_not_found() {
        let transport = FakeTransport::new();
        let manager = manager(&transport, &[1]);

        assert!(matches!(manager.skip(OTHER_GUILD).await, Err(SessionError::NotFound(_))));
        assert!(matches!(
            manager.vote_to_skip(OTHER_GUILD, UserId::new(1)).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            manager.set_volume(OTHER_GUILD, 1.0).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(manager.get(OTHER_GUILD).is_none());
    }

    #[tokio::test]
    async fn test_natural_end_plays_the_whole_queue_then_leaves() {
        let transport = FakeTransport::new();
        let manager = manager(&transport, &[1]);
        manager
            .queue_all(GUILD, CHANNEL, testing::tracks(&["a", "b", "c"], 1))
            .await
            .unwrap();

        let events = manager.events();
        for _ in 0..3 {
            let playback = manager.get(GUILD).unwrap().current_playback();
            let played = transport.played_in(GUILD).len();
            events.player(GUILD, playback, PlayerEvent::Ended(TrackEndReason::Finished));
            testing::eventually(|| {
                transport.played_in(GUILD).len() > played || manager.get(GUILD).is_none()
            })
            .await;
        }

        testing::eventually(|| manager.active_sessions() == 0).await;
        assert_eq!(transport.played_in(GUILD), vec!["a", "b", "c"]);
        assert_eq!(transport.disconnects(), vec![GUILD]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions_and_is_repeatable() {
        let transport = FakeTransport::new();
        let manager = manager(&transport, &[1]);
        for guild in [GUILD, OTHER_GUILD] {
            manager
                .queue_or_create(guild, CHANNEL, testing::track("a", 1))
                .await
                .unwrap();
        }

        manager.shutdown().await;
        manager.shutdown().await;

        assert_eq!(manager.active_sessions(), 0);
        assert_eq!(transport.disconnects().len(), 2);
    }

    #[tokio::test]
    async fn test_queue_after_shutdown_is_rejected() {
        let transport = FakeTransport::new();
        let manager = manager(&transport, &[1]);
        manager
            .queue_or_create(GUILD, CHANNEL, testing::track("a", 1))
            .await
            .unwrap();

        manager.shutdown().await;
        let late = manager
            .queue_or_create(GUILD, CHANNEL, testing::track("late", 1))
            .await;

        assert!(matches!(late, Err(SessionError::ShuttingDown)));
        assert!(manager.get(GUILD).is_none());
        assert_eq!(transport.connects(), 1);
        assert_eq!(transport.disconnects(), vec![GUILD]);
    }
}
