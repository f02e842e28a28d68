//! High-level batch processing façade
//!
//! [`BatchProcessor`] wraps a [`WorkerPool`] for the common case: resolve a
//! list of record ids, block until every one of them reached a terminal
//! state, and return the aggregate statistics.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::pool::WorkerPool;
use crate::registry::JobRegistry;
use crate::store::{CacheStore, RemoteFetcher};
use crate::types::{JobStats, RecordId};

/// Convenience wrapper that owns a started worker pool
///
/// For long-running services that juggle many concurrent export jobs, use
/// [`WorkerPool`] and [`JobRegistry`] directly; this façade suits one-shot
/// batch runs and embedding in simple applications.
pub struct BatchProcessor {
    pool: Arc<WorkerPool>,
}

impl BatchProcessor {
    /// Build and start a worker pool around the two collaborators
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any setting is out of range; the
    /// pool is not left running in that case.
    pub fn new(
        config: Config,
        cache: Arc<dyn CacheStore>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Result<Self> {
        let pool = Arc::new(WorkerPool::new(config, cache, fetcher)?);
        pool.start()?;
        Ok(Self { pool })
    }

    /// The underlying pool, for event subscriptions or ad-hoc job control
    pub fn pool(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.pool)
    }

    /// The job registry backing this processor
    pub fn registry(&self) -> Arc<JobRegistry> {
        self.pool.registry()
    }

    /// Resolve a batch of record ids and block until all of them finish
    ///
    /// Creates a job at the given priority, submits it, and waits on the
    /// job's completion signal (no polling). Individual fetch failures are
    /// reflected in the returned counters, never as an `Err`.
    pub async fn process_records(&self, ids: &[RecordId], priority: i32) -> Result<JobStats> {
        let registry = self.pool.registry();
        let job_id = registry.create_job(ids.to_vec(), priority);

        tracing::info!(
            job_id = %job_id,
            total = ids.len(),
            priority,
            "Starting batch processing"
        );

        self.pool.submit_job(job_id, None).await?;
        let stats = registry.await_completion(job_id).await?;

        tracing::info!(
            job_id = %job_id,
            completed = stats.progress.completed,
            failed = stats.progress.failed,
            cache_hits = stats.progress.cache_hits,
            api_calls = stats.progress.api_calls,
            retries = stats.progress.retries,
            "Batch processing finished"
        );
        Ok(stats)
    }

    /// Stop the underlying pool
    ///
    /// With `wait = true`, pending tasks drain first; with `wait = false`
    /// they are discarded and only in-flight tasks finish.
    pub async fn shutdown(&self, wait: bool) {
        self.pool.stop(wait).await;
    }
}
