//! Chunked cache store over a host cache.
//!
//! Values too large for one host entry are written as parts plus a manifest
//! under the same logical key. Readers never see a partial value: if any part
//! is missing or expired the whole entry is a miss.
//!
//! Cache traffic is not locked. Racing writers are last-write-wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use resale_core::{CacheConfig, CacheError, CacheRead, ConfigError, ResaleResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::chunker::{self, Chunker, Manifest, CHUNK_MARKER, MIN_HOST_ENTRY_BYTES};
use super::traits::{CacheStats, HostCache, StatsCounters};

/// Result of resolving a logical key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    Hit(String),
    Miss,
    /// Manifest present but parts missing or manifest malformed.
    Partial { expected: usize, found: usize },
}

/// Cache store with transparent chunking and bounded TTL.
pub struct CacheStore<H: HostCache + ?Sized> {
    host: Arc<H>,
    chunker: Chunker,
    config: CacheConfig,
    stats: StatsCounters,
}

impl<H: HostCache + ?Sized> CacheStore<H> {
    /// Create a store over `host`.
    ///
    /// Fails if the config is invalid, asks for entries larger than the host
    /// can hold, or the host cannot hold a manifest.
    pub fn new(host: Arc<H>, config: CacheConfig) -> ResaleResult<Self> {
        config.validate()?;
        let limit = host.max_value_bytes();
        if limit < MIN_HOST_ENTRY_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "host.max_value_bytes".to_string(),
                value: limit.to_string(),
                reason: format!(
                    "host entries must hold at least {} bytes to fit a chunk manifest",
                    MIN_HOST_ENTRY_BYTES
                ),
            }
            .into());
        }
        if config.chunk_threshold_bytes > limit {
            return Err(ConfigError::InvalidValue {
                field: "cache.chunk_threshold_bytes".to_string(),
                value: config.chunk_threshold_bytes.to_string(),
                reason: format!("exceeds host entry limit of {} bytes", limit),
            }
            .into());
        }
        if config.max_part_bytes > limit {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_part_bytes".to_string(),
                value: config.max_part_bytes.to_string(),
                reason: format!("exceeds host entry limit of {} bytes", limit),
            }
            .into());
        }
        let chunker = Chunker::new(config.max_part_bytes)?;
        Ok(Self {
            host,
            chunker,
            config,
            stats: StatsCounters::default(),
        })
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the host cache.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Usage counters so far.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    async fn lookup(&self, key: &str) -> ResaleResult<Lookup> {
        let Some(raw) = self.host.get(key).await? else {
            return Ok(Lookup::Miss);
        };

        let part_count = match chunker::parse_manifest(&raw) {
            Manifest::Simple => return Ok(Lookup::Hit(raw)),
            Manifest::Malformed => {
                return Ok(Lookup::Partial {
                    expected: 0,
                    found: 0,
                })
            }
            Manifest::Chunked(n) => n,
        };

        let mut parts = Vec::with_capacity(part_count);
        for index in 0..part_count {
            match self.host.get(&chunker::part_key(key, index)).await? {
                Some(part) => parts.push(part),
                None => {
                    return Ok(Lookup::Partial {
                        expected: part_count,
                        found: index,
                    })
                }
            }
        }
        Ok(Lookup::Hit(Chunker::join(&parts)))
    }

    /// Read the serialized value at `key`.
    ///
    /// Returns `None` on a miss, including a chunked entry with any part
    /// missing.
    pub async fn get_raw(&self, key: &str) -> ResaleResult<Option<String>> {
        match self.lookup(key).await? {
            Lookup::Hit(value) => {
                StatsCounters::bump(&self.stats.hits);
                tracing::debug!(key, bytes = value.len(), "Cache hit");
                Ok(Some(value))
            }
            Lookup::Miss => {
                StatsCounters::bump(&self.stats.misses);
                tracing::debug!(key, "Cache miss");
                Ok(None)
            }
            Lookup::Partial { expected, found } => {
                StatsCounters::bump(&self.stats.misses);
                StatsCounters::bump(&self.stats.partial_misses);
                tracing::warn!(
                    key,
                    expected_parts = expected,
                    first_missing = found,
                    "Chunked cache entry incomplete, treating as miss"
                );
                Ok(None)
            }
        }
    }

    /// Read and decode the value at `key`.
    ///
    /// A value that no longer decodes as `T` is treated as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> ResaleResult<Option<T>> {
        let Some(raw) = self.get_raw(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cached value no longer decodes, treating as miss");
                Ok(None)
            }
        }
    }

    /// Part count of whatever entry currently sits at `key` (0 if simple or absent).
    async fn existing_part_count(&self, key: &str) -> ResaleResult<usize> {
        Ok(match self.host.get(key).await? {
            Some(raw) => match chunker::parse_manifest(&raw) {
                Manifest::Chunked(n) => n,
                Manifest::Simple | Manifest::Malformed => 0,
            },
            None => 0,
        })
    }

    /// Write every part, then the manifest.
    async fn write_chunked(&self, key: &str, parts: &[String], ttl: Duration) -> ResaleResult<()> {
        for (index, part) in parts.iter().enumerate() {
            self.host
                .put(&chunker::part_key(key, index), part, ttl)
                .await?;
        }
        self.host
            .put(key, &chunker::manifest(parts.len()), ttl)
            .await
    }

    /// Delete parts `from..to` of `key`.
    async fn delete_parts(&self, key: &str, from: usize, to: usize) -> ResaleResult<usize> {
        let mut deleted = 0;
        for index in from..to {
            if self.host.delete(&chunker::part_key(key, index)).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Store an already serialized value.
    ///
    /// Values over the chunk threshold, or that would read back as a manifest,
    /// are split into parts. An older chunked manifest is deleted before any
    /// part is rewritten, parts go next and the new manifest last. If any of
    /// those writes fails the key is cleared, so readers see a miss rather
    /// than a mix of old and new parts. Parts left over from a longer previous
    /// entry are deleted afterwards.
    pub async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> ResaleResult<()> {
        let ttl = self.config.clamp_ttl(ttl);
        let old_parts = self.existing_part_count(key).await?;

        let new_parts = if value.len() <= self.config.chunk_threshold_bytes
            && !value.starts_with(CHUNK_MARKER)
        {
            self.host.put(key, value, ttl).await?;
            0
        } else {
            let parts = self.chunker.split(value);
            // Parts are rewritten in place, so the old manifest must go first.
            if old_parts > 0 {
                self.host.delete(key).await?;
            }
            if let Err(e) = self.write_chunked(key, &parts, ttl).await {
                if let Err(cleanup) = self.host.delete(key).await {
                    tracing::warn!(key, error = %cleanup, "Failed to drop entry after chunked write error");
                }
                return Err(e);
            }
            parts.len()
        };

        if old_parts > new_parts {
            let removed = self.delete_parts(key, new_parts, old_parts).await?;
            tracing::debug!(key, removed, "Removed orphaned cache parts");
        }

        StatsCounters::bump(&self.stats.writes);
        tracing::debug!(key, bytes = value.len(), parts = new_parts, ttl_secs = ttl.as_secs(), "Cache write");
        Ok(())
    }

    /// Serialize `value` as JSON and store it.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> ResaleResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.set_raw(key, &raw, ttl).await
    }

    /// Delete `key` and, if it was chunked, all of its parts.
    ///
    /// Returns true if a live entry was removed.
    pub async fn invalidate(&self, key: &str) -> ResaleResult<bool> {
        let parts = self.existing_part_count(key).await?;
        let removed = self.host.delete(key).await?;
        if parts > 0 {
            self.delete_parts(key, 0, parts).await?;
        }
        Ok(removed)
    }

    /// Serve `key` from cache, or compute, store and return it.
    ///
    /// Host cache failures are logged and treated as a miss (on read) or
    /// ignored (on write); the computed value is still returned. Errors from
    /// `compute` propagate.
    pub async fn get_or_rebuild<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> ResaleResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = ResaleResult<T>> + Send,
    {
        match self.get::<T>(key).await {
            Ok(Some(value)) => return Ok(CacheRead::from_cache(value)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, rebuilding");
            }
        }

        let value = compute().await?;
        StatsCounters::bump(&self.stats.rebuilds);

        if let Err(e) = self.set(key, &value, ttl).await {
            tracing::warn!(key, error = %e, "Cache write after rebuild failed");
        }
        Ok(CacheRead::rebuilt(value))
    }
}
