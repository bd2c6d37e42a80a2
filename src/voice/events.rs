use serenity::{async_trait, model::id::GuildId};
use songbird::{tracks::PlayMode, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler};
use tracing::debug;

use crate::audio::events::{EventSink, PlaybackId, PlayerEvent, TrackEndReason};

/// Reenvía los eventos de un track de Songbird al bridge, etiquetados con la
/// reproducción que los originó.
#[derive(Clone)]
pub struct TrackEventForwarder {
    pub guild_id: GuildId,
    pub playback: PlaybackId,
    pub events: EventSink,
}

impl TrackEventForwarder {
    pub fn new(guild_id: GuildId, playback: PlaybackId, events: EventSink) -> Self {
        Self {
            guild_id,
            playback,
            events,
        }
    }
}

/// Traduce el estado de un track al evento que entiende la sesión
pub fn player_event(mode: &PlayMode) -> Option<PlayerEvent> {
    match mode {
        PlayMode::Play => Some(PlayerEvent::Started),
        PlayMode::End => Some(PlayerEvent::Ended(TrackEndReason::Finished)),
        PlayMode::Stop => Some(PlayerEvent::Ended(TrackEndReason::Stopped)),
        PlayMode::Errored(e) => Some(PlayerEvent::Exception(format!("{:?}", e))),
        _ => None,
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEventForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                match player_event(&state.playing) {
                    Some(event) => self.events.player(self.guild_id, self.playback, event),
                    None => debug!(
                        "Estado {:?} de {} en guild {} ignorado",
                        state.playing, self.playback, self.guild_id
                    ),
                }
            }
        }

        None
    }
}
