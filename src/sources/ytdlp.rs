use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{MetadataResolver, QueryKind, TrackMetadata};

/// Resolver que ejecuta yt-dlp y lee su salida JSON
pub struct YtDlpResolver {
    binary: String,
    cookies: Option<PathBuf>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            cookies: None,
        }
    }

    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies.or_else(find_cookies_file);
        self
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify(&self) -> Result<String> {
        let output = tokio::process::Command::new(&self.binary)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("no se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            anyhow::bail!("{} --version terminó con {}", self.binary, output.status);
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }

    fn target_for(query: &str) -> String {
        let query = query.trim();
        if QueryKind::of(query).is_search_term() {
            format!("ytsearch1:{query}")
        } else {
            query.to_string()
        }
    }
}

#[async_trait]
impl MetadataResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<TrackMetadata> {
        let target = Self::target_for(query);
        debug!("🔍 yt-dlp resolviendo: {}", target);

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args([
            "--dump-single-json",
            "--format",
            "bestaudio/best",
            "--no-playlist",
            "--no-warnings",
            "--quiet",
            "--socket-timeout",
            "15",
        ]);

        if let Some(cookies) = &self.cookies {
            cmd.arg("--cookies").arg(cookies);
        }

        // A timed-out resolution drops this future; the child must not outlive it.
        cmd.arg(&target).kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .with_context(|| format!("no se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp falló ({}): {}", output.status, stderr.trim());
        }

        let metadata = parse_info(&output.stdout, query)?;
        info!("✅ yt-dlp resolvió '{}' → {}", query, metadata.title);
        Ok(metadata)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    url: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    entries: Vec<YtDlpInfo>,
}

/// Convierte la salida de `--dump-single-json` en metadata; para búsquedas toma el primer resultado
pub(crate) fn parse_info(raw: &[u8], query: &str) -> Result<TrackMetadata> {
    let mut info: YtDlpInfo =
        serde_json::from_slice(raw).context("salida JSON de yt-dlp inválida")?;

    if info.url.is_none() && !info.entries.is_empty() {
        info = info.entries.swap_remove(0);
    }

    let audio_url = info
        .url
        .ok_or_else(|| anyhow::anyhow!("yt-dlp no devolvió resultados para '{}'", query))?;
    let webpage_url = info.webpage_url.unwrap_or_else(|| query.to_string());

    Ok(TrackMetadata {
        audio_url,
        title: info.title.unwrap_or_else(|| "Unknown Title".to_string()),
        webpage_url,
        thumbnail: info.thumbnail,
    })
}

/// Busca archivo de cookies disponible
fn find_cookies_file() -> Option<PathBuf> {
    let candidates = [
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".config/yt-dlp/cookies.txt"))
            .ok(),
        Some(PathBuf::from("/app/.config/yt-dlp/cookies.txt")),
        Some(PathBuf::from("./cookies.txt")),
    ];

    let found = candidates.into_iter().flatten().find(|path| path.exists());
    match &found {
        Some(path) => info!("🍪 Cookies encontradas en: {}", path.display()),
        None => warn!("🍪 No se encontraron cookies - algunas funcionalidades pueden estar limitadas"),
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn search_terms_get_ytsearch_prefix() {
        assert_eq!(YtDlpResolver::target_for(" lofi beats "), "ytsearch1:lofi beats");
        assert_eq!(
            YtDlpResolver::target_for("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
    }

    #[test]
    fn parses_single_video() {
        let raw = br#"{
            "url": "https://rr1.googlevideo.com/a",
            "title": "Song",
            "webpage_url": "https://www.youtube.com/watch?v=abc",
            "thumbnail": "https://i.ytimg.com/abc.jpg"
        }"#;

        let metadata = parse_info(raw, "https://www.youtube.com/watch?v=abc").unwrap();
        assert_eq!(
            metadata,
            TrackMetadata::new(
                "https://rr1.googlevideo.com/a",
                "Song",
                "https://www.youtube.com/watch?v=abc"
            )
            .with_thumbnail("https://i.ytimg.com/abc.jpg")
        );
    }

    #[test]
    fn search_results_take_first_entry() {
        let raw = br#"{
            "title": "lofi",
            "entries": [
                {"url": "https://cdn/first", "title": "First", "webpage_url": "https://yt/first"},
                {"url": "https://cdn/second", "title": "Second", "webpage_url": "https://yt/second"}
            ]
        }"#;

        let metadata = parse_info(raw, "lofi").unwrap();
        assert_eq!(metadata.title, "First");
        assert_eq!(metadata.audio_url, "https://cdn/first");
        assert_eq!(metadata.thumbnail, None);
    }

    #[test]
    fn empty_search_is_an_error() {
        let raw = br#"{"title": "nothing", "entries": []}"#;
        assert!(parse_info(raw, "nothing").is_err());
    }

    #[test]
    fn missing_title_falls_back() {
        let raw = br#"{"url": "https://cdn/x"}"#;
        let metadata = parse_info(raw, "https://example.com/x.mp3").unwrap();
        assert_eq!(metadata.title, "Unknown Title");
        assert_eq!(metadata.webpage_url, "https://example.com/x.mp3");
    }
}
