use tracing::debug;

use super::{resolver_pool::ResolverPool, track::Track};

/// Warms the cache for the next queued track while the current one plays.
#[derive(Clone)]
pub struct Preloader {
    pool: ResolverPool,
}

impl Preloader {
    pub fn new(pool: ResolverPool) -> Self {
        Self { pool }
    }

    /// Best effort: one background resolution attempt, result discarded.
    /// Returns whether a resolution was started.
    pub fn warm(&self, next: Option<&Track>) -> bool {
        let Some(track) = next else {
            return false;
        };
        if track.is_resolved() || self.pool.is_cached(&track.source_query) {
            return false;
        }

        let pool = self.pool.clone();
        let query = track.source_query.clone();
        tokio::spawn(async move {
            match pool.resolve(&query).await {
                Ok(metadata) => debug!("🔮 Precargado: {}", metadata.title),
                Err(e) => debug!("🔮 Precarga fallida para '{}': {:#}", query, e),
            }
        });
        true
    }
}
