use anyhow::{anyhow, Result};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{
    cache::MusicCache,
    error::{PlaybackError, PlaybackResult},
    sources::{MetadataResolver, TrackMetadata},
};

struct ResolveJob {
    query: String,
    reply: oneshot::Sender<Result<TrackMetadata>>,
}

/// Fixed set of workers that run resolutions off the guild session tasks.
///
/// Every resolution goes through the shared [`MusicCache`] first; only misses reach a
/// worker, and only successful results are written back. Workers stop once the pool
/// and every clone of its sender are dropped.
#[derive(Clone)]
pub struct ResolverPool {
    jobs: flume::Sender<ResolveJob>,
    cache: Arc<MusicCache>,
    workers: usize,
}

impl ResolverPool {
    /// Spawns `workers` tasks on the current runtime.
    pub fn new(
        resolver: Arc<dyn MetadataResolver>,
        cache: Arc<MusicCache>,
        workers: usize,
        timeout: Duration,
    ) -> Self {
        let workers = workers.max(1);
        let (jobs, rx) = flume::unbounded::<ResolveJob>();

        for worker_id in 0..workers {
            let rx = rx.clone();
            let resolver = resolver.clone();
            let cache = cache.clone();

            tokio::spawn(async move {
                while let Ok(job) = rx.recv_async().await {
                    let result = match tokio::time::timeout(timeout, resolver.resolve(&job.query)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(anyhow!(
                            "{} timed out after {}",
                            resolver.name(),
                            humantime::format_duration(timeout)
                        )),
                    };

                    if let Ok(metadata) = &result {
                        cache.put(job.query.clone(), metadata.clone());
                    }

                    // The requester may have moved on; its result still warmed the cache.
                    let _ = job.reply.send(result);
                }
                debug!("🔧 Worker de resolución {} terminado", worker_id);
            });
        }

        info!(
            "🔧 Pool de resolución iniciado: {} workers ({}), timeout {}",
            workers,
            resolver.name(),
            humantime::format_duration(timeout)
        );

        Self {
            jobs,
            cache,
            workers,
        }
    }

    /// One resolution attempt: cache hit or a single trip through a worker.
    pub async fn resolve(&self, query: &str) -> Result<TrackMetadata> {
        let key = query.to_string();
        if let Some(metadata) = self.cache.get(&key) {
            debug!("⚡ Cache hit: {}", query);
            return Ok(metadata);
        }

        let (reply, response) = oneshot::channel();
        self.jobs
            .send_async(ResolveJob { query: key, reply })
            .await
            .map_err(|_| anyhow!("resolver pool is shut down"))?;

        response
            .await
            .map_err(|_| anyhow!("resolver worker dropped the request"))?
    }

    /// Resolves with exactly one retry; the second failure is final.
    pub async fn resolve_with_retry(&self, query: &str) -> PlaybackResult<TrackMetadata> {
        match self.resolve(query).await {
            Ok(metadata) => Ok(metadata),
            Err(first) => {
                warn!("🔄 Reintentando '{}' tras error: {:#}", query, first);
                self.resolve(query)
                    .await
                    .map_err(|e| PlaybackError::ResolutionFailed {
                        query: query.to_string(),
                        reason: format!("{e:#}"),
                    })
            }
        }
    }

    pub fn is_cached(&self, query: &str) -> bool {
        self.cache.contains(&query.to_string())
    }

    pub fn cache(&self) -> &Arc<MusicCache> {
        &self.cache
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}
