use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Sesiones
    pub teardown_timeout_secs: u64,

    // Límites
    pub max_song_duration: u64, // En segundos
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: env_or("DEFAULT_VOLUME", "0.5").parse()?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", "1000").parse()?,
            max_playlist_size: env_or("MAX_PLAYLIST_SIZE", "100").parse()?,

            // Sesiones
            teardown_timeout_secs: env_or("TEARDOWN_TIMEOUT_SECS", "10").parse()?,

            // Límites
            max_song_duration: env_or("MAX_SONG_DURATION", "3600").parse()?, // 1 hora
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue and playlist limits must be greater than 0
    /// - Teardown timeout must be at least one second
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.teardown_timeout_secs == 0 {
            anyhow::bail!("Teardown timeout must be at least 1 second");
        }

        if self.max_song_duration == 0 {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol\n  \
            Limits: {} queue, {} playlist, {}s max duration\n  \
            Sessions: {}s teardown timeout",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.max_playlist_size,
            self.max_song_duration,
            self.teardown_timeout_secs,
        )
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            default_volume: self.default_volume,
            max_queue_size: self.max_queue_size,
            teardown_timeout: Duration::from_secs(self.teardown_timeout_secs),
        }
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: 0.5,
            max_queue_size: 1000,
            max_playlist_size: 100,

            teardown_timeout_secs: 10,

            max_song_duration: 3600,
        }
    }
}

/// Parámetros que consume el motor de sesiones
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_volume: f32,
    pub max_queue_size: usize,
    /// Tiempo máximo de espera para la desconexión de voz al cerrar una sesión
    pub teardown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Config::default().engine()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
