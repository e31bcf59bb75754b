//! LMDB-backed host cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) as a durable host cache that
//! survives process restarts. Each value carries its own expiry:
//!
//! ```text
//! [expires_at: i64 millis, little endian][value: utf-8]
//! ```
//!
//! Expired entries read as absent and are removed lazily on the next write or
//! delete of the same key, or in bulk by [`LmdbHostCache::purge_expired`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use resale_core::{CacheError, ResaleResult};

use super::traits::HostCache;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes do not follow the entry layout.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbCacheError to ResaleError.
impl From<LmdbCacheError> for resale_core::ResaleError {
    fn from(e: LmdbCacheError) -> Self {
        resale_core::ResaleError::Cache(CacheError::Backend {
            reason: e.to_string(),
        })
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Host cache persisted in an LMDB environment.
pub struct LmdbHostCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    max_value_bytes: usize,
}

impl LmdbHostCache {
    /// Open (or create) a cache under `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the environment in megabytes
    /// * `max_value_bytes` - Per-entry value limit enforced on `put`
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        max_value_bytes: usize,
    ) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            db,
            max_value_bytes,
        })
    }

    fn encode(value: &str, ttl: Duration) -> Vec<u8> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        let mut bytes = Vec::with_capacity(8 + value.len());
        bytes.extend_from_slice(&expires_at.to_le_bytes());
        bytes.extend_from_slice(value.as_bytes());
        bytes
    }

    /// Split stored bytes into expiry and value.
    fn decode(bytes: &[u8]) -> Result<(i64, String), LmdbCacheError> {
        if bytes.len() < 8 {
            return Err(LmdbCacheError::Corrupt("entry shorter than header".into()));
        }
        let mut header = [0u8; 8];
        header.copy_from_slice(&bytes[0..8]);
        let expires_at = i64::from_le_bytes(header);
        let value = std::str::from_utf8(&bytes[8..])
            .map_err(|e| LmdbCacheError::Corrupt(e.to_string()))?
            .to_string();
        Ok((expires_at, value))
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> ResaleResult<u64> {
        let now = Utc::now().timestamp_millis();
        let expired: Vec<Vec<u8>> = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            let iter = self.db.iter(&rtxn).map_err(txn_err)?;
            let mut keys = Vec::new();
            for result in iter {
                let Ok((key, bytes)) = result else { continue };
                let dead = match Self::decode(bytes) {
                    Ok((expires_at, _)) => expires_at <= now,
                    Err(_) => true,
                };
                if dead {
                    keys.push(key.to_vec());
                }
            }
            keys
        };

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut removed = 0u64;
        for key in &expired {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }
}

#[async_trait]
impl HostCache for LmdbHostCache {
    fn max_value_bytes(&self) -> usize {
        self.max_value_bytes
    }

    async fn get(&self, key: &str) -> ResaleResult<Option<String>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
            None => Ok(None),
            Some(bytes) => match Self::decode(bytes) {
                Ok((expires_at, value)) if expires_at > Utc::now().timestamp_millis() => {
                    Ok(Some(value))
                }
                Ok(_) => Ok(None),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Unreadable LMDB cache entry treated as absent");
                    Ok(None)
                }
            },
        }
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

        let bytes = Self::encode(value, ttl);
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> ResaleResult<bool> {
        let now = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let live = match self.db.get(&wtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => matches!(Self::decode(bytes), Ok((expires_at, _)) if expires_at > now),
            None => false,
        };
        self.db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resale_core::ResaleError;
    use tempfile::TempDir;

    fn open_cache(max_value_bytes: usize) -> (TempDir, LmdbHostCache) {
        let dir = TempDir::new().unwrap();
        let cache = LmdbHostCache::open(dir.path(), 10, max_value_bytes).unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (_dir, cache) = open_cache(1024);
        cache
            .put("dashboardStats", "{\"ventas\":3}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("dashboardStats").await.unwrap(),
            Some("{\"ventas\":3}".to_string())
        );
        assert!(cache.delete("dashboardStats").await.unwrap());
        assert_eq!(cache.get("dashboardStats").await.unwrap(), None);
        assert!(!cache.delete("dashboardStats").await.unwrap());
    }

    #[tokio::test]
    async fn test_size_limit_enforced() {
        let (_dir, cache) = open_cache(8);
        let err = cache
            .put("k", "123456789", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, ResaleError::Cache(CacheError::ValueTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_absent_and_is_purged() {
        let (_dir, cache) = open_cache(1024);
        cache.put("k", "v", Duration::from_millis(5)).await.unwrap();
        cache.put("live", "v", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.get("live").await.unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_decode_rejects_short_entry() {
        assert!(LmdbHostCache::decode(&[1, 2, 3]).is_err());
    }
}
