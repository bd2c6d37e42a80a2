//! Audio event bridge.
//!
//! Runs on its own task and turns [`AudioEvent`]s into commands on the owning
//! session. Forwarding never waits for the session: teardown completion is
//! awaited on a separate task, so a slow voice disconnect in one guild does
//! not hold up events for the others.

use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use super::{
    events::{AudioEvent, LifecycleEvent, TeardownCause},
    registry::SessionRegistry,
};

pub struct AudioEventBridge {
    registry: Arc<SessionRegistry>,
    inbox: mpsc::UnboundedReceiver<AudioEvent>,
}

impl AudioEventBridge {
    pub fn spawn(
        registry: Arc<SessionRegistry>,
        inbox: mpsc::UnboundedReceiver<AudioEvent>,
    ) -> JoinHandle<()> {
        let bridge = Self { registry, inbox };
        tokio::spawn(bridge.run())
    }

    async fn run(mut self) {
        info!("🌉 Bridge de eventos de audio iniciado");

        while let Some(event) = self.inbox.recv().await {
            if !self.dispatch(event) {
                break;
            }
        }

        info!("🌉 Bridge de eventos de audio detenido");
    }

    /// Devuelve `false` cuando el bridge debe detenerse
    fn dispatch(&self, event: AudioEvent) -> bool {
        match event {
            AudioEvent::Player {
                guild,
                playback,
                event,
            } => {
                match self.registry.lookup(guild) {
                    Some(session) => session.deliver(playback, event),
                    None => debug!(
                        "Evento {:?} para guild {} sin sesión, ignorado",
                        event, guild
                    ),
                }
                true
            }
            AudioEvent::Lifecycle(LifecycleEvent::GuildLeft(guild)) => {
                info!("🚪 El bot salió del guild {}", guild);
                self.force_teardown(guild, TeardownCause::GuildLeft);
                true
            }
            AudioEvent::Lifecycle(LifecycleEvent::VoiceLeft { guild, channel }) => {
                match self.registry.lookup(guild) {
                    Some(session) if channel.is_none_or(|c| c == session.channel_id()) => {
                        info!("🔌 Bot desconectado del canal de voz en guild {}", guild);
                        self.force_teardown(guild, TeardownCause::VoiceLeft);
                    }
                    Some(_) => debug!(
                        "Salida de un canal distinto al de la sesión en guild {}, ignorada",
                        guild
                    ),
                    None => debug!("Salida de voz en guild {} sin sesión", guild),
                }
                true
            }
            AudioEvent::Lifecycle(LifecycleEvent::Shutdown) => {
                let registry = self.registry.clone();
                tokio::spawn(async move { registry.shutdown().await });
                false
            }
        }
    }

    fn force_teardown(&self, guild: GuildId, cause: TeardownCause) {
        let Some(session) = self.registry.lookup(guild) else {
            debug!("Sin sesión que cerrar en guild {} ({:?})", guild, cause);
            return;
        };

        session.request_teardown(cause);
        tokio::spawn(async move {
            session.terminated().await;
            info!("✅ Sesión de guild {} cerrada ({:?})", guild, cause);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        events::{PlayerEvent, TrackEndReason},
        testing::{self, FakeTransport, CHANNEL, GUILD, OTHER_CHANNEL, OTHER_GUILD},
    };
    use crate::error::SessionError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_player_events_reach_the_owning_session() {
        let transport = FakeTransport::new();
        let (registry, events, _bridge) = testing::bridged(&transport, &[1]);
        registry
            .create_or_enqueue(GUILD, CHANNEL, testing::tracks(&["a", "b"], 1))
            .await
            .unwrap();
        let playback = registry.get_session(GUILD).unwrap().current_playback();

        events.player(GUILD, playback, PlayerEvent::Ended(TrackEndReason::Finished));

        testing::eventually(|| transport.played_in(GUILD).len() == 2).await;
        assert_eq!(transport.played_in(GUILD), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_guild_left_tears_down_a_busy_session() {
        let transport = FakeTransport::new();
        let (registry, events, _bridge) = testing::bridged(&transport, &[1]);
        registry
            .create_or_enqueue(GUILD, CHANNEL, testing::tracks(&["a", "b", "c"], 1))
            .await
            .unwrap();

        events.lifecycle(LifecycleEvent::GuildLeft(GUILD));

        testing::eventually(|| registry.is_empty()).await;
        assert_eq!(transport.disconnects(), vec![GUILD]);
        assert_eq!(transport.played_in(GUILD), vec!["a"]);
    }

    #[tokio::test]
    async fn test_voice_left_only_closes_the_matching_channel() {
        let transport = FakeTransport::new();
        let (registry, events, _bridge) = testing::bridged(&transport, &[1]);
        registry
            .create_or_enqueue(GUILD, CHANNEL, vec![testing::track("a", 1)])
            .await
            .unwrap();
        registry
            .create_or_enqueue(OTHER_GUILD, CHANNEL, vec![testing::track("x", 1)])
            .await
            .unwrap();

        events.lifecycle(LifecycleEvent::VoiceLeft {
            guild: GUILD,
            channel: Some(OTHER_CHANNEL),
        });
        events.lifecycle(LifecycleEvent::VoiceLeft {
            guild: OTHER_GUILD,
            channel: None,
        });

        // El bridge procesa en orden: cuando cae la segunda, la primera ya pasó
        testing::eventually(|| registry.lookup(OTHER_GUILD).is_none()).await;
        assert!(registry.get_session(GUILD).is_some());
        assert_eq!(transport.disconnects(), vec![OTHER_GUILD]);
    }

    #[tokio::test]
    async fn test_events_without_a_session_are_dropped() {
        let transport = FakeTransport::new();
        let (registry, events, _bridge) = testing::bridged(&transport, &[1]);

        events.player(
            OTHER_GUILD,
            Default::default(),
            PlayerEvent::Ended(TrackEndReason::Finished),
        );
        events.lifecycle(LifecycleEvent::GuildLeft(OTHER_GUILD));

        registry
            .create_or_enqueue(GUILD, CHANNEL, vec![testing::track("a", 1)])
            .await
            .unwrap();
        events.lifecycle(LifecycleEvent::GuildLeft(GUILD));

        testing::eventually(|| registry.is_empty()).await;
        assert_eq!(transport.disconnects(), vec![GUILD]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_bridge_and_closes_sessions() {
        let transport = FakeTransport::new();
        let (registry, events, bridge) = testing::bridged(&transport, &[1]);
        registry
            .create_or_enqueue(GUILD, CHANNEL, vec![testing::track("a", 1)])
            .await
            .unwrap();

        events.lifecycle(LifecycleEvent::Shutdown);

        bridge.await.unwrap();
        testing::eventually(|| registry.is_empty()).await;
        assert_eq!(transport.disconnects(), vec![GUILD]);

        let late = registry
            .create_or_enqueue(GUILD, CHANNEL, vec![testing::track("b", 1)])
            .await;
        assert!(matches!(late, Err(SessionError::ShuttingDown)));
        assert_eq!(transport.connects(), 1);
    }

    #[tokio::test]
    async fn test_late_events_from_a_closed_session_do_not_reach_its_successor() {
        let transport = FakeTransport::new().with_connect_delay(Duration::from_millis(30));
        let (registry, events, _bridge) = testing::bridged(&transport, &[1]);
        registry
            .create_or_enqueue(GUILD, CHANNEL, vec![testing::track("old", 1)])
            .await
            .unwrap();
        let old = registry.get_session(GUILD).unwrap();
        let old_playback = old.current_playback();
        old.teardown(TeardownCause::Stopped).await;

        let successor = tokio::spawn({
            let registry = registry.clone();
            async move {
                registry
                    .create_or_enqueue(GUILD, CHANNEL, testing::tracks(&["b1", "b2"], 1))
                    .await
            }
        });
        // Llega mientras la sesión nueva todavía se está conectando
        tokio::time::sleep(Duration::from_millis(10)).await;
        events.player(GUILD, old_playback, PlayerEvent::Ended(TrackEndReason::Stopped));
        successor.await.unwrap().unwrap();

        events.player(GUILD, old_playback, PlayerEvent::Ended(TrackEndReason::Finished));
        events.player(GUILD, old_playback, PlayerEvent::Exception("decoder".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let session = registry.get_session(GUILD).unwrap();
        assert_ne!(session.current_playback(), old_playback);
        assert_eq!(transport.played_in(GUILD), vec!["old", "b1"]);
        assert_eq!(session.snapshot().await.unwrap().queue.total_items, 1);
    }
}
