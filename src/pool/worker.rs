//! Worker loop — dequeues tasks and resolves them cache-first
//!
//! Each worker runs the same loop: pop a task, check its job's cancellation
//! flag, try the cache, and only on a miss spend a rate-limit token and call
//! the remote fetcher. Failures back off exponentially and re-enter the
//! queue at their original priority until retries are exhausted.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;

use super::queue::{Task, TaskQueue};
use crate::backoff;
use crate::config::RetryConfig;
use crate::job::Job;
use crate::rate_limiter::RateLimiter;
use crate::registry::JobRegistry;
use crate::store::{CacheStore, RemoteFetcher};
use crate::types::{Event, TaskResolution};

/// Everything one worker needs, cloned per spawned worker task
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) worker_id: usize,
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) cache: Arc<dyn CacheStore>,
    pub(crate) fetcher: Arc<dyn RemoteFetcher>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) retry: RetryConfig,
}

impl WorkerContext {
    /// Emit an event to all subscribers; dropped silently if nobody listens
    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Main loop for one worker; exits when the queue is closed and drained
pub(crate) async fn worker_loop(ctx: WorkerContext) {
    tracing::debug!(worker_id = ctx.worker_id, "Worker started");

    while let Some(task) = ctx.queue.pop().await {
        let Some(job) = ctx.registry.get(task.job_id) else {
            // Job was evicted while its tasks were still queued
            tracing::warn!(
                worker_id = ctx.worker_id,
                job_id = %task.job_id,
                record_id = %task.record_id,
                "Dropping task for unknown job"
            );
            continue;
        };

        resolve_task(&ctx, &job, task).await;
    }

    tracing::debug!(worker_id = ctx.worker_id, "Worker stopped");
}

/// Resolve one dequeued task to a terminal state or re-enqueue it for retry
async fn resolve_task(ctx: &WorkerContext, job: &Arc<Job>, mut task: Task) {
    // Cancelled jobs discard their tasks at dequeue time, cheaply
    if job.is_cancel_requested() {
        finish_task(ctx, job, &task, TaskResolution::Cancelled);
        return;
    }

    // Cache first — hits are unlimited and never touch the rate limiter
    match ctx.cache.get(task.record_id).await {
        Ok(Some(record)) => {
            job.counters.cache_hits.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                worker_id = ctx.worker_id,
                record_id = %task.record_id,
                "Cache hit"
            );
            finish_task(
                ctx,
                job,
                &task,
                TaskResolution::Resolved {
                    record,
                    from_cache: true,
                },
            );
            return;
        }
        Ok(None) => {}
        Err(e) => {
            // A failing cache read is a miss; the remote can still serve it
            tracing::warn!(
                worker_id = ctx.worker_id,
                record_id = %task.record_id,
                error = %e,
                "Cache read failed, falling through to remote fetch"
            );
        }
    }

    // Miss — wait for a rate-limit token, abandoning the wait on cancel
    if !ctx.rate_limiter.acquire(1, job.cancel_token()).await {
        finish_task(ctx, job, &task, TaskResolution::Cancelled);
        return;
    }

    match ctx.fetcher.fetch(task.record_id).await {
        Ok(record) => {
            job.counters.api_calls.fetch_add(1, Ordering::SeqCst);

            // Best effort: a cache-write failure never fails the task
            if let Err(e) = ctx.cache.put(task.record_id, &record).await {
                tracing::warn!(
                    worker_id = ctx.worker_id,
                    record_id = %task.record_id,
                    error = %e,
                    "Failed to cache fetched record"
                );
            }

            tracing::debug!(
                worker_id = ctx.worker_id,
                record_id = %task.record_id,
                "Fetched record from remote"
            );
            finish_task(
                ctx,
                job,
                &task,
                TaskResolution::Resolved {
                    record,
                    from_cache: false,
                },
            );
        }
        Err(error) => {
            if task.attempt < ctx.retry.max_retries {
                job.counters.retries.fetch_add(1, Ordering::SeqCst);

                let delay = backoff::delay_for_attempt(&ctx.retry, task.attempt);
                task.attempt += 1;

                tracing::warn!(
                    worker_id = ctx.worker_id,
                    record_id = %task.record_id,
                    job_id = %task.job_id,
                    attempt = task.attempt,
                    max_retries = ctx.retry.max_retries,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Fetch failed, retrying"
                );

                // Backoff sleep, interruptible by job cancellation
                let cancelled = tokio::select! {
                    _ = job.cancel_token().cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if cancelled {
                    finish_task(ctx, job, &task, TaskResolution::Cancelled);
                    return;
                }

                // Back into the queue at the original priority
                if let Err(task) = ctx.queue.push(task).await {
                    // Queue closed during backoff — no further attempts
                    // are possible, so the task fails now
                    job.counters.failed.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(
                        worker_id = ctx.worker_id,
                        record_id = %task.record_id,
                        job_id = %task.job_id,
                        "Queue closed during backoff, failing task"
                    );
                    finish_task(ctx, job, &task, TaskResolution::Failed { error });
                }
            } else {
                job.counters.failed.fetch_add(1, Ordering::SeqCst);

                tracing::error!(
                    worker_id = ctx.worker_id,
                    record_id = %task.record_id,
                    job_id = %task.job_id,
                    attempts = task.attempt + 1,
                    error = %error,
                    "Fetch failed after all retry attempts"
                );
                finish_task(ctx, job, &task, TaskResolution::Failed { error });
            }
        }
    }
}

/// Deliver the final resolution: callback, events, and completion counting
fn finish_task(ctx: &WorkerContext, job: &Arc<Job>, task: &Task, resolution: TaskResolution) {
    if let Some(callback) = &task.callback {
        callback(task.record_id, &resolution);
    }

    match &resolution {
        TaskResolution::Resolved { from_cache, .. } => {
            ctx.emit(Event::TaskResolved {
                job_id: task.job_id,
                record_id: task.record_id,
                from_cache: *from_cache,
            });
        }
        TaskResolution::Failed { error } => {
            ctx.emit(Event::TaskFailed {
                job_id: task.job_id,
                record_id: task.record_id,
                error: error.to_string(),
            });
        }
        TaskResolution::Cancelled => {}
    }

    let finished = job.task_finished();
    ctx.emit(Event::Progress {
        job_id: task.job_id,
        progress: job.progress(),
    });

    if finished {
        let stats = job.stats();
        tracing::info!(
            job_id = %task.job_id,
            completed = stats.progress.completed,
            failed = stats.progress.failed,
            cache_hits = stats.progress.cache_hits,
            api_calls = stats.progress.api_calls,
            "Job finished"
        );
        ctx.emit(Event::JobCompleted {
            id: task.job_id,
            stats,
        });
    }
}
