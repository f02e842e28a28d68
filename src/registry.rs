//! Job registry — tracks every export job by id
//!
//! The registry owns all [`Job`]s for their lifetime and is the lookup
//! point for progress polling, cancellation, and completion waits. Jobs are
//! kept after they finish so late progress queries still resolve; eviction
//! happens only through [`JobRegistry::remove`] — the retention policy
//! belongs to the caller.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{JobError, Result};
use crate::job::Job;
use crate::types::{JobId, JobProgress, JobStats, RecordId};

/// Thread-safe registry of active and finished jobs
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Pending job from an ordered list of record ids
    ///
    /// The job is registered immediately but processes nothing until
    /// submitted to a pool.
    pub fn create_job(&self, record_ids: Vec<RecordId>, priority: i32) -> JobId {
        let job = Arc::new(Job::new(record_ids, priority));
        let id = job.id();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, job);

        tracing::debug!(job_id = %id, "Job created");
        id
    }

    /// Look up a job by id
    pub fn get(&self, id: JobId) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn get_or_not_found(&self, id: JobId) -> Result<Arc<Job>> {
        self.get(id)
            .ok_or_else(|| JobError::NotFound { id }.into())
    }

    /// Request best-effort cooperative cancellation of a job
    ///
    /// Already-dequeued tasks observe the flag and exit cheaply; queued
    /// tasks are discarded when a worker pops them; an in-flight remote
    /// call completes naturally.
    pub fn cancel(&self, id: JobId) -> Result<()> {
        let job = self.get_or_not_found(id)?;
        job.request_cancel()?;

        tracing::info!(job_id = %id, "Job cancellation requested");
        Ok(())
    }

    /// Progress snapshot for one job
    ///
    /// Safe to poll concurrently from any task.
    pub fn progress(&self, id: JobId) -> Result<JobProgress> {
        Ok(self.get_or_not_found(id)?.progress())
    }

    /// Block until the job finishes (all tasks terminal, or cancelled),
    /// then return its final statistics
    pub async fn await_completion(&self, id: JobId) -> Result<JobStats> {
        let job = self.get_or_not_found(id)?;
        Ok(job.await_completion().await)
    }

    /// Remove a job from the registry (explicit cleanup)
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if no job with this id is registered.
    pub fn remove(&self, id: JobId) -> Result<()> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .ok_or(JobError::NotFound { id })?;

        tracing::debug!(job_id = %id, "Job removed from registry");
        Ok(())
    }

    /// Progress snapshots for every registered job
    pub fn list(&self) -> Vec<(JobId, JobProgress)> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, job)| (*id, job.progress()))
            .collect()
    }

    /// Aggregate counters summed across every registered job
    pub fn aggregate_stats(&self) -> AggregateStats {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);

        let mut aggregate = AggregateStats {
            jobs: jobs.len(),
            ..AggregateStats::default()
        };
        for job in jobs.values() {
            let p = job.progress();
            aggregate.total += p.total;
            aggregate.completed += p.completed;
            aggregate.failed += p.failed;
            aggregate.cache_hits += p.cache_hits;
            aggregate.api_calls += p.api_calls;
            aggregate.retries += p.retries;
        }
        aggregate
    }
}

/// Counter totals across all jobs in a registry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AggregateStats {
    /// Number of registered jobs (any state)
    pub jobs: usize,
    /// Sum of job totals
    pub total: u64,
    /// Tasks that reached a terminal resolution
    pub completed: u64,
    /// Tasks that exhausted retries
    pub failed: u64,
    /// Cache hits
    pub cache_hits: u64,
    /// Successful remote calls
    pub api_calls: u64,
    /// Retry attempts
    pub retries: u64,
}
