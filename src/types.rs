//! Core types for catalog-export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::FetchError;

/// Unique identifier for a catalog record
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Create a new RecordId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<RecordId> for i64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for an export job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub uuid::Uuid);

impl JobId {
    /// Allocate a fresh random job id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Export job state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Created but not yet submitted
    Pending,
    /// Submitted and being processed
    Running,
    /// Cancellation requested by the caller
    Cancelled,
    /// All tasks reached a terminal resolution
    Completed,
    /// Marked failed by caller policy (the engine itself never sets this)
    Failed,
}

impl JobState {
    /// Convert integer state code to JobState
    pub fn from_i32(state: i32) -> Self {
        match state {
            0 => JobState::Pending,
            1 => JobState::Running,
            2 => JobState::Cancelled,
            3 => JobState::Completed,
            4 => JobState::Failed,
            _ => JobState::Failed, // Default to Failed for unknown state
        }
    }

    /// Convert JobState to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            JobState::Pending => 0,
            JobState::Running => 1,
            JobState::Cancelled => 2,
            JobState::Completed => 3,
            JobState::Failed => 4,
        }
    }

    /// True for Cancelled, Completed, and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Cancelled | JobState::Completed | JobState::Failed
        )
    }
}

/// A single catalog record as resolved from the cache or the remote API
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Release title
    pub title: String,
    /// Artist names, joined for display
    pub artists: String,
    /// Label names, joined for display
    pub labels: String,
    /// Catalog number(s)
    pub catalog_number: String,
    /// Country of release
    pub country: String,
    /// Release year
    pub year: String,
    /// Genres, comma-joined
    pub genres: String,
    /// Styles, comma-joined
    pub styles: String,
    /// Lowest marketplace price, or "N/A"
    pub price: String,
    /// Canonical URL for the record
    pub url: String,
}

/// Final outcome of one fetch task, delivered to the task's callback
#[derive(Clone, Debug)]
pub enum TaskResolution {
    /// The record was resolved successfully
    Resolved {
        /// The resolved record
        record: CatalogRecord,
        /// True if served from the cache without a remote call
        from_cache: bool,
    },
    /// All fetch attempts failed
    Failed {
        /// The error from the final attempt
        error: FetchError,
    },
    /// The owning job was cancelled before the task could run
    Cancelled,
}

/// Per-task callback invoked exactly once with the final resolution.
///
/// Runs on the worker that resolved the task; a slow callback degrades that
/// worker's throughput but cannot corrupt engine state.
pub type TaskCallback = Arc<dyn Fn(RecordId, &TaskResolution) + Send + Sync>;

/// Snapshot of a job's progress counters
///
/// Safe to request from any task at any time; drives progress streams
/// (e.g. server-sent events) at the caller's discretion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Total number of record ids in the job
    pub total: u64,
    /// Tasks that reached a terminal resolution (success, failure, or cancelled)
    pub completed: u64,
    /// Tasks that exhausted all retries
    pub failed: u64,
    /// Tasks served from the cache
    pub cache_hits: u64,
    /// Successful remote API calls
    pub api_calls: u64,
    /// Retry attempts across all tasks
    pub retries: u64,
    /// Current job state
    pub state: JobState,
}

/// Final statistics for a finished job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobStats {
    /// Job identifier
    pub id: JobId,
    /// Final progress counters
    pub progress: JobProgress,
    /// When processing started
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock processing time in seconds
    pub duration_seconds: Option<f64>,
    /// Completed tasks per second of processing time
    pub records_per_second: Option<f64>,
}

/// Event emitted during job processing
///
/// Subscribe via [`WorkerPool::subscribe`](crate::pool::WorkerPool::subscribe).
/// Events are broadcast; a subscriber that falls too far behind receives a
/// `Lagged` error rather than stalling the workers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was submitted and its tasks enqueued
    JobStarted {
        /// Job ID
        id: JobId,
        /// Number of tasks enqueued
        total: u64,
    },

    /// A task resolved successfully
    TaskResolved {
        /// Owning job
        job_id: JobId,
        /// Resolved record id
        record_id: RecordId,
        /// True if served from the cache
        from_cache: bool,
    },

    /// A task exhausted its retries
    TaskFailed {
        /// Owning job
        job_id: JobId,
        /// Failed record id
        record_id: RecordId,
        /// Error message from the final attempt
        error: String,
    },

    /// Progress counters after a task reached a terminal resolution
    Progress {
        /// Owning job
        job_id: JobId,
        /// Updated counters
        progress: JobProgress,
    },

    /// All of a job's tasks reached a terminal resolution
    JobCompleted {
        /// Job ID
        id: JobId,
        /// Final statistics
        stats: JobStats,
    },

    /// A job was cancelled
    JobCancelled {
        /// Job ID
        id: JobId,
    },
}
