//! Collaborator interfaces for record resolution
//!
//! The engine consumes two capability interfaces implemented by surrounding
//! code: a [`CacheStore`] for local lookups and a [`RemoteFetcher`] for
//! rate-limited API calls. Both are object-safe async traits held as
//! `Arc<dyn ...>`, so any backend (SQLite, HTTP client, stubs) can be
//! plugged in without touching the engine.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CacheError, FetchError};
use crate::types::{CatalogRecord, RecordId};

/// Local cache of previously resolved records.
///
/// Reads are unlimited and run fully in parallel across workers; the
/// implementation must be safe for concurrent use. The on-disk schema and
/// expiry policy belong to the implementation, not the engine.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a cached record. `Ok(None)` is a miss, not an error.
    async fn get(&self, id: RecordId) -> Result<Option<CatalogRecord>, CacheError>;

    /// Store a freshly fetched record. Failures are logged by the engine and
    /// never fail the task that produced the record.
    async fn put(&self, id: RecordId, record: &CatalogRecord) -> Result<(), CacheError>;
}

/// Remote catalog API client.
///
/// Every call through this interface has already passed the shared rate
/// limiter; implementations should not add their own throttling.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch one record from the remote service.
    async fn fetch(&self, id: RecordId) -> Result<CatalogRecord, FetchError>;
}

/// In-memory [`CacheStore`] backed by a `HashMap`.
///
/// Suitable for embedding, demos, and tests. Production deployments
/// typically supply a persistent store instead.
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: RwLock<HashMap<RecordId, CatalogRecord>>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.records.read().map(|map| map.len()).unwrap_or(0)
    }

    /// True if the cache holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, id: RecordId) -> Result<Option<CatalogRecord>, CacheError> {
        let records = self
            .records
            .read()
            .map_err(|e| CacheError(format!("cache lock poisoned: {}", e)))?;
        Ok(records.get(&id).cloned())
    }

    async fn put(&self, id: RecordId, record: &CatalogRecord) -> Result<(), CacheError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| CacheError(format!("cache lock poisoned: {}", e)))?;
        records.insert(id, record.clone());
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> CatalogRecord {
        CatalogRecord {
            title: title.to_string(),
            ..CatalogRecord::default()
        }
    }

    #[tokio::test]
    async fn get_returns_none_for_missing_record() {
        let cache = MemoryCache::new();

        let result = cache.get(RecordId::new(1)).await.unwrap();
        assert!(result.is_none(), "empty cache must report a miss");
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = MemoryCache::new();
        let id = RecordId::new(42);
        let rec = record("Some Album");

        cache.put(id, &rec).await.unwrap();

        let found = cache.get(id).await.unwrap();
        assert_eq!(found, Some(rec), "stored record must be returned on get");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn put_overwrites_existing_entry() {
        let cache = MemoryCache::new();
        let id = RecordId::new(7);

        cache.put(id, &record("first")).await.unwrap();
        cache.put(id, &record("second")).await.unwrap();

        let found = cache.get(id).await.unwrap().unwrap();
        assert_eq!(found.title, "second");
        assert_eq!(cache.len(), 1, "overwrite must not grow the cache");
    }
}
