//! In-process host cache with TTL expiry and a per-entry size limit.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use resale_core::{CacheError, ResaleResult, StorageError};

use super::traits::HostCache;

/// Default per-entry limit, matching common hosted caches.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 100_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Host cache kept in process memory.
#[derive(Debug)]
pub struct InMemoryHostCache {
    entries: RwLock<HashMap<String, Entry>>,
    max_value_bytes: usize,
}

impl Default for InMemoryHostCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VALUE_BYTES)
    }
}

impl InMemoryHostCache {
    pub fn new(max_value_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_value_bytes,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|e| e.values().filter(|v| v.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|e| {
                e.iter()
                    .filter(|(_, v)| v.expires_at > now)
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> ResaleResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = entries.len();
        entries.retain(|_, v| v.expires_at > now);
        Ok(before - entries.len())
    }
}

#[async_trait]
impl HostCache for InMemoryHostCache {
    fn max_value_bytes(&self) -> usize {
        self.max_value_bytes
    }

    async fn get(&self, key: &str) -> ResaleResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> ResaleResult<()> {
        if value.len() > self.max_value_bytes {
            return Err(CacheError::ValueTooLarge {
                key: key.to_string(),
                size: value.len(),
                limit: self.max_value_bytes,
            }
            .into());
        }
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> ResaleResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries
            .remove(key)
            .is_some_and(|e| e.expires_at > Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resale_core::ResaleError;

    #[tokio::test]
    async fn test_put_get_delete() {
        let cache = InMemoryHostCache::default();
        cache.put("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_value_rejected() {
        let cache = InMemoryHostCache::new(4);
        let err = cache
            .put("k", "12345", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResaleError::Cache(CacheError::ValueTooLarge { size: 5, limit: 4, .. })
        ));
        assert!(cache.put("k", "1234", Duration::from_secs(60)).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_entries_read_as_absent() {
        let cache = InMemoryHostCache::default();
        cache.put("k", "v", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
        assert_eq!(cache.purge_expired().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keys_lists_live_entries() {
        let cache = InMemoryHostCache::default();
        cache.put("b", "1", Duration::from_secs(60)).await.unwrap();
        cache.put("a", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cache.len(), 2);
    }
}
