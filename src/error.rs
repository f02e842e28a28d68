//! Error types for catalog-export
//!
//! This module provides the error taxonomy for the engine:
//! - The top-level [`Error`] used by engine operations
//! - [`JobError`] for job lifecycle violations
//! - [`FetchError`] and [`CacheError`], the error surfaces of the two
//!   collaborator interfaces in [`crate::store`]

use thiserror::Error;

/// Result type alias for catalog-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for catalog-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "pool.num_workers")
        key: Option<String>,
    },

    /// Job lifecycle error
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Job lifecycle errors
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found in the registry
    #[error("job {id} not found")]
    NotFound {
        /// The job ID that was not found
        id: crate::types::JobId,
    },

    /// Cannot perform operation in the job's current state
    #[error("cannot {operation} job {id} in state {current_state}")]
    InvalidState {
        /// The job ID that is in an invalid state for the operation
        id: crate::types::JobId,
        /// The operation that was attempted (e.g., "submit", "cancel")
        operation: String,
        /// The current state that prevents the operation (e.g., "completed")
        current_state: String,
    },
}

/// Error surface of the remote fetch collaborator.
///
/// The collaborator distinguishes transient failures (rate limiting, 5xx,
/// timeouts) from permanent ones (malformed record, gone). The engine retries
/// both classes identically up to the configured retry limit — the remote
/// service does not reliably classify its failures, so no class is
/// short-circuited.
#[derive(Clone, Debug, Error)]
pub enum FetchError {
    /// Transient failure (network, rate limit, server busy)
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// Permanent failure as reported by the remote service
    #[error("permanent fetch error: {0}")]
    Permanent(String),
}

/// Error surface of the cache collaborator.
///
/// A cache miss is not an error (`Ok(None)` from `get`). Write failures are
/// logged and swallowed by the engine; read failures are treated as misses.
#[derive(Clone, Debug, Error)]
#[error("cache error: {0}")]
pub struct CacheError(pub String);

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobId;

    #[test]
    fn job_error_converts_into_error() {
        let id = JobId::new();
        let err: Error = JobError::NotFound { id }.into();

        match err {
            Error::Job(JobError::NotFound { id: found }) => assert_eq!(found, id),
            other => panic!("expected Job(NotFound), got: {:?}", other),
        }
    }

    #[test]
    fn error_messages_carry_context() {
        let id = JobId::new();
        let err = Error::Job(JobError::InvalidState {
            id,
            operation: "submit".to_string(),
            current_state: "completed".to_string(),
        });

        let msg = err.to_string();
        assert!(msg.contains("submit"), "message should name the operation");
        assert!(
            msg.contains("completed"),
            "message should name the blocking state"
        );
    }

    #[test]
    fn fetch_error_display_distinguishes_classes() {
        assert!(
            FetchError::Transient("timeout".into())
                .to_string()
                .contains("transient")
        );
        assert!(
            FetchError::Permanent("gone".into())
                .to_string()
                .contains("permanent")
        );
    }
}
