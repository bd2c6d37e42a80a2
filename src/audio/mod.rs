//! # Audio Module
//!
//! Per-guild playback engine for Open Music Bot.
//!
//! ## Architecture
//!
//! Every guild with music playing owns exactly one session. Sessions are
//! actors: all mutations (queue, current track, skip votes, teardown) are
//! processed in order by the session's own task, so no locks guard session
//! state.
//!
//! ### [`registry`] - Session Registry
//! - One `DashMap` entry per guild, created through create-or-enqueue
//! - Entries are removed by the session itself once its voice connection
//!   has been closed
//!
//! ### [`session`] - Playback Session
//! - FIFO queue, current track, skip votes, pause and volume
//! - Single, idempotent teardown that awaits the voice disconnect
//!
//! ### [`bridge`] - Event Bridge
//! - Routes player callbacks and guild/voice lifecycle events to the
//!   owning session from a dedicated task
//!
//! ### [`manager`] - Public API
//! - Entry point used by the command layer
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_music_engine::audio::{manager::PlaybackManager, track::Track};
//! use serenity::all::{ChannelId, GuildId, UserId};
//!
//! # async fn example(manager: &PlaybackManager) -> anyhow::Result<()> {
//! let guild_id = GuildId::new(123456789);
//! let channel_id = ChannelId::new(987654321);
//! let track = Track::new("Song", "https://example.com/song", UserId::new(1));
//!
//! let position = manager.queue_or_create(guild_id, channel_id, track).await?;
//! manager.vote_to_skip(guild_id, UserId::new(2)).await?;
//! manager.stop(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod events;
pub mod manager;
pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod skip_votes;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;
