//! Shared test helpers for exercising the worker pool with stub collaborators.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::error::FetchError;
use crate::store::{MemoryCache, RemoteFetcher};
use crate::types::{CatalogRecord, RecordId};

/// A config with fast timings for tests: large rate budget, tiny backoff.
pub(crate) fn fast_config(num_workers: usize) -> Config {
    let mut config = Config::default();
    config.pool.num_workers = num_workers;
    config.rate_limit.capacity = 10_000;
    config.rate_limit.refill_rate = 10_000.0;
    config.retry.max_retries = 2;
    config.retry.base_delay = Duration::from_millis(20);
    config.retry.max_delay = Duration::from_secs(1);
    config
}

/// The record a stub fetch or a seeded cache returns for an id.
pub(crate) fn record_for(id: RecordId) -> CatalogRecord {
    CatalogRecord {
        title: format!("Record {}", id),
        artists: "Test Artist".to_string(),
        ..CatalogRecord::default()
    }
}

/// A MemoryCache pre-populated with records for the given ids.
pub(crate) async fn seeded_cache(ids: &[RecordId]) -> Arc<MemoryCache> {
    use crate::store::CacheStore;

    let cache = Arc::new(MemoryCache::new());
    for &id in ids {
        cache.put(id, &record_for(id)).await.unwrap();
    }
    cache
}

/// Scriptable RemoteFetcher stub that records every call.
pub(crate) struct StubFetcher {
    calls: AtomicU64,
    fetched: Mutex<Vec<RecordId>>,
    fail_ids: HashSet<RecordId>,
    fail_first: Mutex<HashMap<RecordId, u32>>,
    delay: Option<Duration>,
}

impl StubFetcher {
    /// A fetcher that always succeeds.
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            fetched: Mutex::new(Vec::new()),
            fail_ids: HashSet::new(),
            fail_first: Mutex::new(HashMap::new()),
            delay: None,
        }
    }

    /// Fail every fetch of the given ids, forever.
    pub(crate) fn failing_for(ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            fail_ids: ids.into_iter().collect(),
            ..Self::new()
        }
    }

    /// Fail the first `times` fetches of `id`, then succeed.
    pub(crate) fn fail_first(self, id: RecordId, times: u32) -> Self {
        self.fail_first.lock().unwrap().insert(id, times);
        self
    }

    /// Sleep this long inside every fetch (to simulate a slow remote).
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total number of fetch calls across all ids.
    pub(crate) fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of fetch calls for one id.
    pub(crate) fn calls_for(&self, id: RecordId) -> u64 {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|fetched| **fetched == id)
            .count() as u64
    }

    /// Every fetched id in call order.
    pub(crate) fn fetched_ids(&self) -> Vec<RecordId> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFetcher for StubFetcher {
    async fn fetch(&self, id: RecordId) -> Result<CatalogRecord, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(id);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_ids.contains(&id) {
            return Err(FetchError::Transient(format!("stubbed failure for {}", id)));
        }

        let mut fail_first = self.fail_first.lock().unwrap();
        if let Some(remaining) = fail_first.get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::Transient(format!(
                    "stubbed transient failure for {}",
                    id
                )));
            }
        }

        Ok(record_for(id))
    }
}
