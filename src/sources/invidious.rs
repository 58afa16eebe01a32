use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        LazyLock,
    },
    time::Duration,
};
use tracing::{info, warn};

use super::{MetadataResolver, TrackMetadata};

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]{11})")
        .expect("valid video id regex")
});

static BARE_VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("valid bare id regex"));

/// Resolver sobre la API de Invidious (alternativa a yt-dlp)
pub struct InvidiousResolver {
    client: reqwest::Client,
    instances: Vec<String>,
    current_instance: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct InvidiousVideo {
    title: String,
    #[serde(rename = "videoThumbnails", default)]
    video_thumbnails: Vec<Thumbnail>,
    #[serde(rename = "adaptiveFormats", default)]
    adaptive_formats: Vec<StreamFormat>,
    #[serde(rename = "formatStreams", default)]
    format_streams: Vec<StreamFormat>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StreamFormat {
    url: String,
    #[serde(rename = "type", default)]
    format_type: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    bitrate: u64,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

// Invidious reports bitrates as strings on some endpoints and numbers on others.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or_default(),
        serde_json::Value::String(s) => s.parse().unwrap_or_default(),
        _ => 0,
    })
}

impl InvidiousResolver {
    pub fn new(instances: Vec<String>) -> Result<Self> {
        if instances.is_empty() {
            anyhow::bail!("se necesita al menos una instancia de Invidious");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; SonixBot/1.0)")
            .build()
            .context("no se pudo crear el cliente HTTP")?;

        Ok(Self {
            client,
            instances: instances
                .into_iter()
                .map(|i| i.trim_end_matches('/').to_string())
                .collect(),
            current_instance: AtomicUsize::new(0),
        })
    }

    /// Obtiene la siguiente instancia de Invidious
    fn next_instance(&self) -> &str {
        let current = self.current_instance.fetch_add(1, Ordering::Relaxed);
        &self.instances[current % self.instances.len()]
    }

    /// Extrae el video ID de una URL de YouTube o de un ID directo
    pub fn extract_video_id(url_or_id: &str) -> Option<String> {
        let trimmed = url_or_id.trim();
        if BARE_VIDEO_ID.is_match(trimmed) {
            return Some(trimmed.to_string());
        }

        VIDEO_ID
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    async fn search(&self, instance: &str, query: &str) -> Result<String> {
        let url = format!(
            "{}/api/v1/search?q={}&type=video",
            instance,
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Error en request a Invidious")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let items: Vec<SearchItem> = response
            .json()
            .await
            .context("Error parseando respuesta JSON")?;

        items
            .into_iter()
            .find_map(|item| item.video_id)
            .ok_or_else(|| anyhow::anyhow!("sin resultados en {} para '{}'", instance, query))
    }

    async fn video(&self, instance: &str, video_id: &str) -> Result<InvidiousVideo> {
        let url = format!("{}/api/v1/videos/{}", instance, video_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Error en request a Invidious")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        response
            .json()
            .await
            .context("Error parseando información del video")
    }
}

/// Elige el stream de audio de mayor bitrate
fn best_audio(video: InvidiousVideo, video_id: &str) -> Result<TrackMetadata> {
    let best = video
        .adaptive_formats
        .into_iter()
        .chain(video.format_streams)
        .filter(|f| f.format_type.starts_with("audio/"))
        .max_by_key(|f| f.bitrate)
        .ok_or_else(|| anyhow::anyhow!("No se encontró formato de audio válido"))?;

    let mut metadata = TrackMetadata::new(
        best.url,
        video.title,
        format!("https://youtube.com/watch?v={video_id}"),
    );
    metadata.thumbnail = video.video_thumbnails.into_iter().next().map(|t| t.url);
    Ok(metadata)
}

#[async_trait]
impl MetadataResolver for InvidiousResolver {
    async fn resolve(&self, query: &str) -> Result<TrackMetadata> {
        let instance = self.next_instance().to_string();

        let video_id = match Self::extract_video_id(query) {
            Some(id) => id,
            None => self.search(&instance, query).await?,
        };

        let video = self.video(&instance, &video_id).await.map_err(|e| {
            warn!("❌ Falló obtener info en {}: {}", instance, e);
            e
        })?;

        let metadata = best_audio(video, &video_id)?;
        info!("✅ Invidious resolvió '{}' → {}", query, metadata.title);
        Ok(metadata)
    }

    fn name(&self) -> &'static str {
        "invidious"
    }
}
