//! Export job state and progress tracking
//!
//! A [`Job`] is one caller-initiated batch of record fetches tracked as a
//! unit. Workers mutate its counters through atomic increments; the
//! cancellation flag is a shared token checked at every blocking point.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::types::{JobId, JobProgress, JobState, JobStats, RecordId};

/// Aggregate counters for one job
///
/// `total` is fixed at creation; the rest are incremented by workers as
/// tasks resolve. Reads are snapshots and may lag in-flight updates.
#[derive(Debug)]
pub(crate) struct JobCounters {
    pub(crate) total: u64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) api_calls: AtomicU64,
    pub(crate) retries: AtomicU64,
}

impl JobCounters {
    fn new(total: u64) -> Self {
        Self {
            total,
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            api_calls: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }
}

/// One export run: the ordered record ids to resolve, aggregate counters,
/// and the cancellation flag
///
/// Owned by the [`JobRegistry`](crate::registry::JobRegistry) behind an
/// `Arc`; all mutation goes through atomic operations, so progress can be
/// polled from any task while workers are running.
pub struct Job {
    id: JobId,
    record_ids: Vec<RecordId>,
    priority: i32,
    state: AtomicI32,
    pub(crate) counters: JobCounters,
    cancel: CancellationToken,
    done: Notify,
    started_at: Mutex<Option<DateTime<Utc>>>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl Job {
    /// Create a new job in the Pending state
    pub(crate) fn new(record_ids: Vec<RecordId>, priority: i32) -> Self {
        let total = record_ids.len() as u64;
        Self {
            id: JobId::new(),
            record_ids,
            priority,
            state: AtomicI32::new(JobState::Pending.to_i32()),
            counters: JobCounters::new(total),
            cancel: CancellationToken::new(),
            done: Notify::new(),
            started_at: Mutex::new(None),
            finished_at: Mutex::new(None),
        }
    }

    /// Job identifier
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Queue priority for this job's tasks (lower = served first)
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The record ids this job resolves, in submission order
    pub fn record_ids(&self) -> &[RecordId] {
        &self.record_ids
    }

    /// Current state
    pub fn state(&self) -> JobState {
        JobState::from_i32(self.state.load(Ordering::SeqCst))
    }

    /// Cancellation token checked by workers at every blocking point
    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once cancellation has been requested
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Transition Pending → Running and stamp the start time
    pub(crate) fn mark_running(&self) -> Result<(), JobError> {
        self.state
            .compare_exchange(
                JobState::Pending.to_i32(),
                JobState::Running.to_i32(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|actual| JobError::InvalidState {
                id: self.id,
                operation: "submit".to_string(),
                current_state: format!("{:?}", JobState::from_i32(actual)).to_lowercase(),
            })?;

        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        Ok(())
    }

    /// Request cooperative cancellation
    ///
    /// Sets the cancellation flag and moves the job to Cancelled. Queued
    /// tasks are discarded lazily as workers dequeue them; an in-flight
    /// remote call completes naturally. Idempotent for already-cancelled
    /// jobs; an error for jobs that already completed or failed.
    pub(crate) fn request_cancel(&self) -> Result<(), JobError> {
        loop {
            let current = self.state.load(Ordering::SeqCst);
            match JobState::from_i32(current) {
                JobState::Cancelled => return Ok(()),
                JobState::Completed | JobState::Failed => {
                    return Err(JobError::InvalidState {
                        id: self.id,
                        operation: "cancel".to_string(),
                        current_state: format!("{:?}", JobState::from_i32(current)).to_lowercase(),
                    });
                }
                JobState::Pending | JobState::Running => {
                    if self
                        .state
                        .compare_exchange(
                            current,
                            JobState::Cancelled.to_i32(),
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        )
                        .is_err()
                    {
                        continue; // state moved under us, re-examine
                    }
                    self.cancel.cancel();
                    self.stamp_finished();
                    self.done.notify_waiters();
                    return Ok(());
                }
            }
        }
    }

    /// Record a terminal task resolution
    ///
    /// Increments `completed`; when the last task lands, the job finishes
    /// (Completed unless already Cancelled) and waiters are woken. Returns
    /// true when this call finished the job.
    pub(crate) fn task_finished(&self) -> bool {
        let completed = self.counters.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if completed >= self.counters.total {
            self.finish();
            true
        } else {
            false
        }
    }

    /// Finish the job: Completed unless cancellation already won
    pub(crate) fn finish(&self) {
        // A cancelled job keeps its Cancelled state even after draining
        let _ = self.state.compare_exchange(
            JobState::Running.to_i32(),
            JobState::Completed.to_i32(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.stamp_finished();
        self.done.notify_waiters();
    }

    fn stamp_finished(&self) {
        let mut finished = self
            .finished_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if finished.is_none() {
            *finished = Some(Utc::now());
        }
    }

    /// Snapshot of the job's progress counters
    pub fn progress(&self) -> JobProgress {
        JobProgress {
            total: self.counters.total,
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            cache_hits: self.counters.cache_hits.load(Ordering::SeqCst),
            api_calls: self.counters.api_calls.load(Ordering::SeqCst),
            retries: self.counters.retries.load(Ordering::SeqCst),
            state: self.state(),
        }
    }

    /// Full statistics, including timing and throughput once finished
    pub fn stats(&self) -> JobStats {
        let progress = self.progress();
        let started_at = *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let finished_at = *self
            .finished_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let duration_seconds = match (started_at, finished_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
            }
            _ => None,
        };
        let records_per_second = duration_seconds
            .filter(|secs| *secs > 0.0)
            .map(|secs| progress.completed as f64 / secs);

        JobStats {
            id: self.id,
            progress,
            started_at,
            finished_at,
            duration_seconds,
            records_per_second,
        }
    }

    /// Block until every task reached a terminal resolution or the job was
    /// cancelled, then return final statistics
    ///
    /// Waits on a completion signal rather than polling.
    pub async fn await_completion(&self) -> JobStats {
        loop {
            // Register interest before checking, so a finish that lands
            // between the check and the await still wakes us.
            let notified = self.done.notified();
            if self.state().is_terminal() {
                return self.stats();
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("total", &self.counters.total)
            .finish_non_exhaustive()
    }
}
