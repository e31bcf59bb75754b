//! Host cache trait and usage statistics.

use async_trait::async_trait;
use resale_core::ResaleResult;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Key/value cache supplied by the host.
///
/// Values are strings with a hard per-entry size limit. There is no native
/// support for values larger than [`HostCache::max_value_bytes`].
#[async_trait]
pub trait HostCache: Send + Sync {
    /// Largest value (in bytes) one entry may hold.
    fn max_value_bytes(&self) -> usize;

    /// Get a live value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> ResaleResult<Option<String>>;

    /// Store a value for `ttl`.
    ///
    /// Fails with `CacheError::ValueTooLarge` when `value` exceeds the limit.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> ResaleResult<()>;

    /// Delete a key. Returns true if a live entry was removed.
    async fn delete(&self, key: &str) -> ResaleResult<bool>;
}

/// Snapshot of cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads served from cache.
    pub hits: u64,
    /// Reads that found nothing usable.
    pub misses: u64,
    /// Misses caused by a chunked entry with parts missing.
    pub partial_misses: u64,
    /// Values recomputed by `get_or_rebuild`.
    pub rebuilds: u64,
    /// Logical values written.
    pub writes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub partial_misses: AtomicU64,
    pub rebuilds: AtomicU64,
    pub writes: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            partial_misses: self.partial_misses.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}
