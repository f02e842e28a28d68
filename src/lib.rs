//! # catalog-export
//!
//! Batch export engine for rate-limited catalog APIs.
//!
//! ## Design Philosophy
//!
//! catalog-export is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Collaborator-driven** - The cache and the remote API are trait
//!   objects supplied by the caller; the engine owns only the coordination
//! - **Fair under load** - One token bucket admission-controls remote calls
//!   across all workers and all jobs
//! - **Observable** - Progress counters, per-task callbacks, and a
//!   broadcast event stream; no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use catalog_export::{BatchProcessor, CatalogRecord, Config, MemoryCache, RecordId};
//! use catalog_export::error::FetchError;
//! use catalog_export::store::RemoteFetcher;
//!
//! struct ApiClient;
//!
//! #[async_trait::async_trait]
//! impl RemoteFetcher for ApiClient {
//!     async fn fetch(&self, id: RecordId) -> Result<CatalogRecord, FetchError> {
//!         // Call the remote catalog API here
//!         Ok(CatalogRecord {
//!             title: format!("Record {}", id),
//!             ..CatalogRecord::default()
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let processor = BatchProcessor::new(
//!         Config::default(),
//!         Arc::new(MemoryCache::new()),
//!         Arc::new(ApiClient),
//!     )?;
//!
//!     let ids: Vec<RecordId> = (1..=100).map(RecordId::new).collect();
//!     let stats = processor.process_records(&ids, 5).await?;
//!     println!("completed {} of {}", stats.progress.completed, stats.progress.total);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Exponential backoff delays for retries
pub mod backoff;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Export job state and progress tracking
pub mod job;
/// Worker pool core (queue, workers, lifecycle)
pub mod pool;
/// High-level batch processing façade
pub mod processor;
/// Token bucket rate limiting
pub mod rate_limiter;
/// Job registry for progress polling and cancellation
pub mod registry;
/// Collaborator interfaces (cache and remote fetch)
pub mod store;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, PoolConfig, RateLimitConfig, RetryConfig};
pub use error::{CacheError, Error, FetchError, JobError, Result};
pub use job::Job;
pub use pool::WorkerPool;
pub use processor::BatchProcessor;
pub use rate_limiter::RateLimiter;
pub use registry::{AggregateStats, JobRegistry};
pub use store::{CacheStore, MemoryCache, RemoteFetcher};
pub use types::{
    CatalogRecord, Event, JobId, JobProgress, JobState, JobStats, RecordId, TaskCallback,
    TaskResolution,
};
