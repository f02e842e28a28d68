//! Worker pool — the batch-processing core
//!
//! A [`WorkerPool`] owns a fixed number of workers, one shared
//! [`TaskQueue`](queue::TaskQueue), and one shared
//! [`RateLimiter`](crate::rate_limiter::RateLimiter). Jobs are created in
//! the pool's [`JobRegistry`](crate::registry::JobRegistry) and submitted
//! here; the pool fans each job out into per-record tasks that idle workers
//! claim in priority order.

pub(crate) mod queue;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::Config;
use crate::error::{Error, JobError, Result};
use crate::job::Job;
use crate::rate_limiter::RateLimiter;
use crate::registry::{AggregateStats, JobRegistry};
use crate::store::{CacheStore, RemoteFetcher};
use crate::types::{Event, JobId, JobProgress, TaskCallback, TaskResolution};

use queue::{Task, TaskQueue};
use worker::{WorkerContext, worker_loop};

/// Buffer size for the event broadcast channel; a subscriber lagging by
/// more than this many events receives `Lagged` instead of stalling workers
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Fixed pool of workers resolving record-fetch tasks
///
/// All workers share one task queue and one rate limiter, so remote calls
/// are admission-controlled globally no matter how many jobs run at once.
/// Cache lookups bypass the limiter entirely and run fully in parallel.
pub struct WorkerPool {
    config: Arc<Config>,
    queue: Arc<TaskQueue>,
    rate_limiter: RateLimiter,
    registry: Arc<JobRegistry>,
    cache: Arc<dyn CacheStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    event_tx: broadcast::Sender<Event>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    running: AtomicBool,
    stopped: AtomicBool,
}

impl WorkerPool {
    /// Create a new pool around the two collaborator interfaces
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any setting is out of range.
    pub fn new(
        config: Config,
        cache: Arc<dyn CacheStore>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Result<Self> {
        config.validate()?;

        let rate_limiter =
            RateLimiter::new(config.rate_limit.capacity, config.rate_limit.refill_rate);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            queue: Arc::new(TaskQueue::new()),
            rate_limiter,
            registry: Arc::new(JobRegistry::new()),
            cache,
            fetcher,
            event_tx,
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// The registry tracking this pool's jobs
    ///
    /// Use it to create jobs before submission and to poll or await them
    /// afterwards.
    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    /// Spawn the configured number of workers
    ///
    /// Idempotent while running. Tasks submitted before `start` wait in the
    /// queue until workers come up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if the pool was already stopped; a
    /// stopped pool is terminal.
    pub fn start(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Worker pool already running");
            return Ok(());
        }

        let num_workers = self.config.pool.num_workers;
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for worker_id in 0..num_workers {
            let ctx = WorkerContext {
                worker_id,
                queue: Arc::clone(&self.queue),
                rate_limiter: self.rate_limiter.clone(),
                registry: Arc::clone(&self.registry),
                cache: Arc::clone(&self.cache),
                fetcher: Arc::clone(&self.fetcher),
                event_tx: self.event_tx.clone(),
                retry: self.config.retry,
            };
            workers.push(tokio::spawn(worker_loop(ctx)));
        }

        tracing::info!(num_workers, "Worker pool started");
        Ok(())
    }

    /// Submit a job for processing
    ///
    /// Enqueues one task per record id at the job's priority, transitions
    /// the job to Running, and returns immediately; workers resolve the
    /// tasks in the background. The optional callback is invoked exactly
    /// once per task with its final resolution.
    ///
    /// # Errors
    ///
    /// - [`JobError::NotFound`] if the job id is not in this pool's registry
    /// - [`JobError::InvalidState`] if the job was already submitted or
    ///   cancelled
    /// - [`Error::ShuttingDown`] after [`stop`](Self::stop)
    pub async fn submit_job(&self, id: JobId, callback: Option<TaskCallback>) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let job = self
            .registry
            .get(id)
            .ok_or(JobError::NotFound { id })?;
        job.mark_running()?;

        let total = job.record_ids().len();
        if total == 0 {
            // Nothing to enqueue; the job completes on the spot
            job.finish();
            self.emit(Event::JobStarted { id, total: 0 });
            self.emit(Event::JobCompleted {
                id,
                stats: job.stats(),
            });
            return Ok(());
        }

        // Announce the job before its first task can resolve
        self.emit(Event::JobStarted {
            id,
            total: total as u64,
        });

        for &record_id in job.record_ids() {
            let task = Task {
                record_id,
                job_id: id,
                priority: job.priority(),
                attempt: 0,
                callback: callback.clone(),
            };
            if let Err(task) = self.queue.push(task).await {
                // Stop raced with this submit; account for the task so the
                // job's completed count still converges
                discard_task(&job, &task);
            }
        }

        tracing::info!(
            job_id = %id,
            total,
            priority = job.priority(),
            "Job submitted"
        );
        Ok(())
    }

    /// Request best-effort cooperative cancellation of a job
    ///
    /// Already-claimed tasks notice the flag at their next check; queued
    /// tasks are discarded when popped; an in-flight remote call completes
    /// naturally.
    pub fn cancel_job(&self, id: JobId) -> Result<()> {
        self.registry.cancel(id)?;
        self.emit(Event::JobCancelled { id });
        Ok(())
    }

    /// Stop the pool and wait for workers to exit
    ///
    /// With `wait = true` the queue is closed and workers drain every
    /// pending task first. With `wait = false` pending tasks are discarded
    /// and only in-flight tasks finish. Either way the pool is terminal
    /// afterwards: no new submissions are accepted.
    pub async fn stop(&self, wait: bool) {
        self.stopped.store(true, Ordering::SeqCst);
        if !self.running.swap(false, Ordering::SeqCst) {
            self.queue.close();
            return;
        }

        if wait {
            let pending = self.queue.len().await;
            if pending > 0 {
                tracing::info!(pending, "Draining queued tasks before shutdown");
            }
        } else {
            let discarded = self.queue.clear().await;
            if discarded > 0 {
                tracing::info!(discarded, "Discarded pending tasks on immediate stop");
            }
        }
        self.queue.close();

        let handles: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task panicked during shutdown");
            }
        }

        tracing::info!("Worker pool stopped");
    }

    /// Aggregate counters across every job in the registry
    pub fn stats(&self) -> AggregateStats {
        self.registry.aggregate_stats()
    }

    /// Progress snapshot for one job
    pub fn progress(&self, id: JobId) -> Result<JobProgress> {
        self.registry.progress(id)
    }

    /// Subscribe to processing events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Stream of progress snapshots for one job
    ///
    /// Yields after every terminal task resolution of the given job; ready
    /// to be forwarded as server-sent events by a web layer.
    pub fn progress_stream(
        &self,
        id: JobId,
    ) -> impl tokio_stream::Stream<Item = JobProgress> + Send + use<> {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(move |event| match event {
            Ok(Event::Progress { job_id, progress }) if job_id == id => Some(progress),
            _ => None,
        })
    }

    /// Emit an event to all subscribers; dropped silently if nobody listens
    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Account for a task that could not be enqueued: its callback still fires
/// and it still counts toward the job's completed total
fn discard_task(job: &Arc<Job>, task: &Task) {
    if let Some(callback) = &task.callback {
        callback(task.record_id, &TaskResolution::Cancelled);
    }
    job.task_finished();
}
