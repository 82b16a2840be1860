use moka::future::Cache as MokaCache;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tracing::debug;

use crate::error::{EvidenceError, Result};

/// Configuration for one in-process response cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub max_capacity: u64,
    /// Time-to-live for each entry
    pub time_to_live: Duration,
}

impl Default for CacheConfig {
    /// Document-level cache: 2048 entries for 10 minutes
    fn default() -> Self {
        Self {
            max_capacity: 2048,
            time_to_live: Duration::from_secs(600),
        }
    }
}

impl CacheConfig {
    /// Search results go stale faster than article records
    pub fn short_lived() -> Self {
        Self {
            max_capacity: 512,
            time_to_live: Duration::from_secs(120),
        }
    }
}

/// TTL cache backed by Moka
///
/// Besides plain `get`/`insert`, [`MemoryCache::get_or_try_insert`] coalesces
/// concurrent misses for the same key into a single in-flight computation.
#[derive(Clone)]
pub struct MemoryCache<K, V> {
    cache: MokaCache<K, V>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .build();
        Self { cache }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let result = self.cache.get(key).await;
        if result.is_some() {
            debug!("Cache hit");
        } else {
            debug!("Cache miss");
        }
        result
    }

    pub async fn insert(&self, key: K, value: V) {
        self.cache.insert(key, value).await;
        debug!("Item cached");
    }

    /// Return the cached value or run `init` to produce it.
    ///
    /// At most one `init` per key runs at a time; concurrent callers for the
    /// same key wait for it and share its outcome. Errors are not cached.
    pub async fn get_or_try_insert<F>(&self, key: K, init: F) -> Result<V>
    where
        F: Future<Output = Result<V>>,
    {
        self.cache
            .try_get_with(key, init)
            .await
            .map_err(EvidenceError::from_shared)
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        debug!("Cache cleared");
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}
