use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{fmt, time::Duration};

/// Un track ya resuelto y listo para entregarse al reproductor.
///
/// Inmutable una vez creado: pasa de la cola al slot `current` de la sesión
/// y se descarta cuando termina.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    author: Option<String>,
    duration: Option<Duration>,
    identifier: String,
    requested_by: UserId,
    added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(title: impl Into<String>, identifier: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: title.into(),
            author: None,
            duration: None,
            identifier: identifier.into(),
            requested_by,
            added_at: Utc::now(),
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    /// URL o identificador de la fuente que entiende el reproductor
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    // Setters
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        if let Some(author) = &self.author {
            write!(f, " - {}", author)?;
        }
        if let Some(duration) = self.duration {
            // Sin milisegundos en el texto visible
            let secs = Duration::from_secs(duration.as_secs());
            write!(f, " ({})", humantime::format_duration(secs))?;
        }
        Ok(())
    }
}
