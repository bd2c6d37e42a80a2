//! Songbird and serenity implementations of the engine's voice seams.

pub mod events;
pub mod roster;
pub mod transport;

pub use roster::SerenityRoster;
pub use transport::{SongbirdPlayer, SongbirdTransport};
