//! Shared fixtures for end-to-end scenario tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use catalog_export::error::FetchError;
use catalog_export::{CacheStore, CatalogRecord, Config, MemoryCache, RecordId, RemoteFetcher};

/// Config tuned for tests: plenty of rate budget, short backoff.
pub fn fast_config(num_workers: usize, max_retries: u32) -> Config {
    let mut config = Config::default();
    config.pool.num_workers = num_workers;
    config.rate_limit.capacity = 10_000;
    config.rate_limit.refill_rate = 10_000.0;
    config.retry.max_retries = max_retries;
    config.retry.base_delay = Duration::from_millis(20);
    config.retry.max_delay = Duration::from_secs(1);
    config
}

/// The record every fixture resolves for an id.
pub fn record_for(id: RecordId) -> CatalogRecord {
    CatalogRecord {
        title: format!("Record {}", id),
        artists: "Fixture Artist".to_string(),
        year: "1997".to_string(),
        ..CatalogRecord::default()
    }
}

/// A MemoryCache pre-populated with records for the given ids.
pub async fn seeded_cache(ids: &[RecordId]) -> Arc<MemoryCache> {
    let cache = Arc::new(MemoryCache::new());
    for &id in ids {
        cache
            .put(id, &record_for(id))
            .await
            .expect("seeding the in-memory cache cannot fail");
    }
    cache
}

/// RemoteFetcher stub that succeeds for every id except a configured set,
/// which fails permanently.
pub struct ScriptedFetcher {
    calls: AtomicU64,
    failing: HashSet<RecordId>,
}

impl ScriptedFetcher {
    pub fn succeeding() -> Self {
        Self::failing_for([])
    }

    pub fn failing_for(ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            calls: AtomicU64::new(0),
            failing: ids.into_iter().collect(),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteFetcher for ScriptedFetcher {
    async fn fetch(&self, id: RecordId) -> Result<CatalogRecord, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(&id) {
            return Err(FetchError::Transient(format!(
                "scripted failure for record {}",
                id
            )));
        }
        Ok(record_for(id))
    }
}
