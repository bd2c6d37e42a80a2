use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use super::AudioSourceProvider;
use crate::{audio::track::Track, config::Config, error::ResolutionError};

/// Resuelve tracks con yt-dlp. El audio lo descarga después el reproductor;
/// aquí solo se extraen metadatos.
pub struct YtDlpProvider {
    max_playlist_size: usize,
    max_song_duration: Duration,
}

/// Una línea de `yt-dlp --dump-json --flat-playlist`
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
}

impl VideoInfo {
    fn identifier(&self) -> Option<String> {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone())
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })
    }
}

impl YtDlpProvider {
    pub fn new(max_playlist_size: usize, max_song_duration: Duration) -> Self {
        Self {
            max_playlist_size: max_playlist_size.max(1),
            max_song_duration,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_playlist_size,
            Duration::from_secs(config.max_song_duration),
        )
    }

    /// Verifica que yt-dlp y ffmpeg estén disponibles
    pub async fn verify_dependencies(&self) -> Result<(), ResolutionError> {
        let ytdlp = tokio::process::Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await?;
        if !ytdlp.status.success() {
            error!("❌ yt-dlp no encontrado. Instala con: pip install yt-dlp");
            return Err(ResolutionError::Process("yt-dlp no disponible".to_string()));
        }
        info!(
            "✅ yt-dlp versión: {}",
            String::from_utf8_lossy(&ytdlp.stdout).trim()
        );

        let ffmpeg = tokio::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await?;
        if !ffmpeg.status.success() {
            error!("❌ ffmpeg no encontrado. Instala con: sudo apt install ffmpeg");
            return Err(ResolutionError::Process("ffmpeg no disponible".to_string()));
        }
        info!("✅ ffmpeg disponible");

        Ok(())
    }

    /// URL http(s) tal cual; cualquier otra cosa es una búsqueda en YouTube
    fn target(query: &str) -> String {
        match Url::parse(query) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => query.to_string(),
            _ => format!("ytsearch1:{}", query),
        }
    }

    async fn run(&self, target: &str) -> Result<String, ResolutionError> {
        let output = tokio::process::Command::new("yt-dlp")
            .args([
                "--dump-json",
                "--flat-playlist",
                "--no-warnings",
                "--socket-timeout",
                "30",
                "--playlist-end",
                &self.max_playlist_size.to_string(),
            ])
            .arg(target)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolutionError::Process(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Convierte la salida de yt-dlp en tracks, aplicando los límites de
    /// playlist y duración.
    fn parse_output(
        &self,
        query: &str,
        stdout: &str,
        requested_by: UserId,
    ) -> Result<Vec<Track>, ResolutionError> {
        let entries = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<VideoInfo>)
            .collect::<Result<Vec<_>, _>>()?;
        let single = entries.len() == 1;

        let mut tracks = Vec::new();
        for entry in entries.into_iter().take(self.max_playlist_size) {
            let Some(identifier) = entry.identifier() else {
                warn!("Entrada de yt-dlp sin URL ignorada: {:?}", entry.title);
                continue;
            };
            let title = entry.title.clone().unwrap_or_else(|| identifier.clone());
            let duration = entry.duration.map(Duration::from_secs_f64);

            if duration.is_some_and(|d| d > self.max_song_duration) {
                let max_secs = self.max_song_duration.as_secs();
                if single {
                    return Err(ResolutionError::TooLong { title, max_secs });
                }
                warn!("⏱️ '{}' excede {}s, omitida", title, max_secs);
                continue;
            }

            let mut track = Track::new(title, identifier, requested_by);
            if let Some(author) = entry.uploader.or(entry.channel) {
                track = track.with_author(author);
            }
            if let Some(duration) = duration {
                track = track.with_duration(duration);
            }
            tracks.push(track);
        }

        if tracks.is_empty() {
            return Err(ResolutionError::NoMatches(query.to_string()));
        }
        Ok(tracks)
    }
}

#[async_trait]
impl AudioSourceProvider for YtDlpProvider {
    async fn resolve(
        &self,
        query: &str,
        requested_by: UserId,
    ) -> Result<Vec<Track>, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::NoMatches(query.to_string()));
        }

        let stdout = self.run(&Self::target(query)).await?;
        let tracks = self.parse_output(query, &stdout, requested_by)?;

        info!("🔍 '{}' resuelto en {} tracks", query, tracks.len());
        Ok(tracks)
    }

    fn source_name(&self) -> &'static str {
        "yt-dlp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> YtDlpProvider {
        YtDlpProvider::new(2, Duration::from_secs(600))
    }

    #[test]
    fn test_urls_pass_through_and_text_becomes_search() {
        assert_eq!(
            YtDlpProvider::target("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
        assert_eq!(
            YtDlpProvider::target("never gonna give you up"),
            "ytsearch1:never gonna give you up"
        );
        assert_eq!(YtDlpProvider::target("ftp://host/file"), "ytsearch1:ftp://host/file");
    }

    #[test]
    fn test_parse_single_video() {
        let stdout = r#"{"id":"abc","title":"Song","webpage_url":"https://www.youtube.com/watch?v=abc","uploader":"Band","duration":185.0}"#;

        let tracks = provider().parse_output("song", stdout, UserId::new(1)).unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title(), "Song");
        assert_eq!(tracks[0].author(), Some("Band"));
        assert_eq!(tracks[0].duration(), Some(Duration::from_secs(185)));
        assert_eq!(tracks[0].identifier(), "https://www.youtube.com/watch?v=abc");
        assert_eq!(tracks[0].requested_by(), UserId::new(1));
    }

    #[test]
    fn test_parse_flat_playlist_respects_limits() {
        let stdout = [
            r#"{"id":"a","title":"A","url":"https://www.youtube.com/watch?v=a","channel":"X","duration":100}"#,
            r#"{"id":"b","title":"B","duration":9000}"#,
            r#"{"id":"c","title":"C","duration":null}"#,
            r#"{"id":"d","title":"D","duration":50}"#,
        ]
        .join("\n");

        let tracks = provider().parse_output("list", &stdout, UserId::new(1)).unwrap();

        // Solo se consideran las primeras dos entradas y B es demasiado larga
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title(), "A");
        assert_eq!(tracks[0].author(), Some("X"));
    }

    #[test]
    fn test_parse_builds_url_from_id() {
        let stdout = r#"{"id":"xyz","title":"Only id"}"#;

        let tracks = provider().parse_output("q", stdout, UserId::new(1)).unwrap();

        assert_eq!(tracks[0].identifier(), "https://www.youtube.com/watch?v=xyz");
        assert_eq!(tracks[0].duration(), None);
    }

    #[test]
    fn test_single_video_too_long_is_an_error() {
        let stdout = r#"{"id":"long","title":"Mix 10h","duration":36000}"#;

        let result = provider().parse_output("mix", stdout, UserId::new(1));

        assert!(matches!(result, Err(ResolutionError::TooLong { max_secs: 600, .. })));
    }

    #[test]
    fn test_empty_or_invalid_output() {
        assert!(matches!(
            provider().parse_output("nada", "\n", UserId::new(1)),
            Err(ResolutionError::NoMatches(_))
        ));
        assert!(matches!(
            provider().parse_output("roto", "not json", UserId::new(1)),
            Err(ResolutionError::Parse(_))
        ));
    }
}
