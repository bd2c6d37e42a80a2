//! # Open Music Engine
//!
//! Per-guild voice playback engine for the Open Music Discord bot.
//!
//! - [`audio`]: sessions, queue, skip votes and the event bridge
//! - [`voice`]: Songbird/serenity implementations of the voice seams
//! - [`sources`]: yt-dlp based track resolution
//! - [`bot`]: slash commands and gateway events

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod voice;

pub use audio::{
    events::{AudioEvent, EventSink, LifecycleEvent, PlayerEvent, TeardownCause, TrackEndReason},
    manager::PlaybackManager,
    session::{EnqueueReport, SessionHandle, SessionSnapshot, VoteOutcome},
    track::Track,
};
pub use config::{Config, EngineConfig};
pub use error::{PlaybackError, ResolutionError, SessionError, TransportError};
