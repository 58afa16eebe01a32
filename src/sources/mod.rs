//! # Sources
//!
//! Everything that turns what a user typed into something playable.
//!
//! - [`MetadataResolver`]: query → [`TrackMetadata`] (yt-dlp, Invidious)
//! - [`PlaylistExpander`]: playlist/album link → ordered list of search queries (Spotify)
//!
//! The playback core only sees these traits; which implementations are wired in is
//! decided in `main`.

pub mod invidious;
pub mod spotify;
pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub use invidious::InvidiousResolver;
pub use spotify::SpotifyExpander;
pub use ytdlp::YtDlpResolver;

/// Playable metadata for one resolved query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Direct media URL handed to the voice transport
    pub audio_url: String,
    pub title: String,
    /// Human-facing page for the track (used for links in embeds)
    pub webpage_url: String,
    pub thumbnail: Option<String>,
}

impl TrackMetadata {
    pub fn new(
        audio_url: impl Into<String>,
        title: impl Into<String>,
        webpage_url: impl Into<String>,
    ) -> Self {
        Self {
            audio_url: audio_url.into(),
            title: title.into(),
            webpage_url: webpage_url.into(),
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn is_youtube_music(&self) -> bool {
        self.webpage_url.contains("music.youtube.com")
    }
}

/// Resolves a user query into playable metadata.
///
/// Implementations may block for seconds; callers run them on the resolver pool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<TrackMetadata>;

    fn name(&self) -> &'static str;
}

/// Expands a third-party playlist, album or track link into search queries.
#[async_trait]
pub trait PlaylistExpander: Send + Sync {
    /// Whether this expander understands `query` at all.
    fn accepts(&self, query: &str) -> bool;

    async fn expand(&self, url: &str) -> Result<Vec<String>>;
}

/// Tries the primary resolver and falls back to the secondary one.
///
/// Both run inside a single resolution attempt, so the pool's retry policy still
/// applies to the pair as a whole.
pub struct FallbackResolver {
    primary: Arc<dyn MetadataResolver>,
    secondary: Arc<dyn MetadataResolver>,
}

impl FallbackResolver {
    pub fn new(primary: Arc<dyn MetadataResolver>, secondary: Arc<dyn MetadataResolver>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl MetadataResolver for FallbackResolver {
    async fn resolve(&self, query: &str) -> Result<TrackMetadata> {
        match self.primary.resolve(query).await {
            Ok(metadata) => Ok(metadata),
            Err(e) => {
                warn!(
                    "❌ {} falló para '{}': {}, intentando con {}",
                    self.primary.name(),
                    query,
                    e,
                    self.secondary.name()
                );
                self.secondary.resolve(query).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

/// What kind of thing a user typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Any http(s) link
    Link,
    /// A YouTube Music link
    YouTubeMusic,
    /// Free text to search for
    SearchTerm,
}

impl QueryKind {
    pub fn of(query: &str) -> Self {
        let trimmed = query.trim();
        match url::Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                if url.host_str() == Some("music.youtube.com") {
                    QueryKind::YouTubeMusic
                } else {
                    QueryKind::Link
                }
            }
            _ => QueryKind::SearchTerm,
        }
    }

    pub fn is_search_term(self) -> bool {
        self == QueryKind::SearchTerm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_queries() {
        assert_eq!(
            QueryKind::of("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            QueryKind::Link
        );
        assert_eq!(
            QueryKind::of("https://music.youtube.com/watch?v=abc"),
            QueryKind::YouTubeMusic
        );
        assert_eq!(QueryKind::of("  http://example.com/song.mp3 "), QueryKind::Link);
        assert_eq!(QueryKind::of("never gonna give you up"), QueryKind::SearchTerm);
        assert_eq!(QueryKind::of("ftp://example.com/a.mp3"), QueryKind::SearchTerm);
    }

    #[tokio::test]
    async fn fallback_resolver_uses_secondary_on_failure() {
        let mut primary = MockMetadataResolver::new();
        primary
            .expect_resolve()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("yt-dlp exploded")));
        primary.expect_name().return_const("primary");

        let mut secondary = MockMetadataResolver::new();
        secondary
            .expect_resolve()
            .times(1)
            .returning(|q| Ok(TrackMetadata::new("https://cdn/a", q, "https://page/a")));
        secondary.expect_name().return_const("secondary");

        let chain = FallbackResolver::new(Arc::new(primary), Arc::new(secondary));
        let metadata = chain.resolve("song").await.unwrap();
        assert_eq!(metadata.title, "song");
    }

    #[tokio::test]
    async fn fallback_resolver_skips_secondary_on_success() {
        let mut primary = MockMetadataResolver::new();
        primary
            .expect_resolve()
            .times(1)
            .returning(|q| Ok(TrackMetadata::new("https://cdn/a", q, "https://page/a")));

        let mut secondary = MockMetadataResolver::new();
        secondary.expect_resolve().never();

        let chain = FallbackResolver::new(Arc::new(primary), Arc::new(secondary));
        assert!(chain.resolve("song").await.is_ok());
    }
}
