//! Resolución de búsquedas y URLs en tracks reproducibles.

pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;

use crate::{audio::track::Track, error::ResolutionError};

pub use ytdlp::YtDlpProvider;

/// Trait común para las fuentes de música
#[async_trait]
pub trait AudioSourceProvider: Send + Sync {
    /// Resuelve una URL (video o playlist) o un término de búsqueda.
    ///
    /// Devuelve al menos un track o un error.
    async fn resolve(&self, query: &str, requested_by: UserId)
        -> Result<Vec<Track>, ResolutionError>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}
