//! # Cache Module
//!
//! Process-wide resolution cache for Sonix.
//!
//! Resolving a query (running yt-dlp, asking an Invidious instance) takes seconds,
//! while the same song resolves identically in every guild. The cache maps the raw
//! query string to the [`TrackMetadata`] it resolved to, so a repeated `!play` or a
//! preloaded queue head starts without touching the network.
//!
//! ## Behaviour
//!
//! - **Bounded**: fixed capacity (`CACHE_SIZE`, 128 by default)
//! - **Strict LRU**: inserting a new key into a full cache drops the least recently read
//! - **No TTL**: stream URLs are assumed to outlive the bot session
//! - **Shared**: safe to read and write from every guild session at once
//!
//! ## Example
//!
//! ```rust
//! use sonix::cache::MusicCache;
//! use sonix::sources::TrackMetadata;
//!
//! let cache = MusicCache::new(128);
//! cache.put(
//!     "lofi beats".to_string(),
//!     TrackMetadata::new("https://cdn.example/a.webm", "Lofi Beats", "https://youtube.com/watch?v=x"),
//! );
//! assert!(cache.get(&"lofi beats".to_string()).is_some());
//! ```

pub mod lru_cache;

pub use lru_cache::{CacheMetrics, LRUCache};

use crate::sources::TrackMetadata;
use tracing::info;

/// Cache from user query to resolved track metadata.
pub type MusicCache = LRUCache<String, TrackMetadata>;

impl MusicCache {
    /// Logs a one-line usage summary.
    pub fn log_summary(&self) {
        let metrics = self.metrics();
        info!(
            "🗄️ Cache: {}/{} entradas, {:.0}% hits, {} expulsadas",
            metrics.entries,
            self.capacity(),
            metrics.hit_rate() * 100.0,
            metrics.evictions
        );
    }
}
