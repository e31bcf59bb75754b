//! Configuration types

use crate::{ConfigError, ResaleError, ResaleResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the chunked aggregate cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Serialized values larger than this are stored chunked.
    pub chunk_threshold_bytes: usize,
    /// Upper bound for a single part of a chunked value.
    pub max_part_bytes: usize,
    /// TTL used when a producer does not pick one.
    pub default_ttl: Duration,
    /// Every write's TTL is clamped to this.
    pub max_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: 90_000,
            max_part_bytes: 90_000,
            default_ttl: Duration::from_secs(300),
            max_ttl: Duration::from_secs(21_600),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size above which values are chunked.
    pub fn with_chunk_threshold(mut self, bytes: usize) -> Self {
        self.chunk_threshold_bytes = bytes;
        self
    }

    /// Set the maximum part size.
    pub fn with_max_part_bytes(mut self, bytes: usize) -> Self {
        self.max_part_bytes = bytes;
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the TTL ceiling.
    pub fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }

    /// Clamp a requested TTL into `[1s, max_ttl]`.
    pub fn clamp_ttl(&self, ttl: Duration) -> Duration {
        ttl.clamp(Duration::from_secs(1), self.max_ttl.max(Duration::from_secs(1)))
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `RESALE_CACHE_CHUNK_THRESHOLD`: chunking threshold in bytes (default: 90000)
    /// - `RESALE_CACHE_MAX_PART_BYTES`: maximum part size in bytes (default: 90000)
    /// - `RESALE_CACHE_DEFAULT_TTL_SECS`: default TTL in seconds (default: 300)
    /// - `RESALE_CACHE_MAX_TTL_SECS`: TTL ceiling in seconds (default: 21600)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            chunk_threshold_bytes: env_parse("RESALE_CACHE_CHUNK_THRESHOLD")
                .unwrap_or(defaults.chunk_threshold_bytes),
            max_part_bytes: env_parse("RESALE_CACHE_MAX_PART_BYTES")
                .unwrap_or(defaults.max_part_bytes),
            default_ttl: env_parse("RESALE_CACHE_DEFAULT_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            max_ttl: env_parse("RESALE_CACHE_MAX_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_ttl),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ResaleResult<()> {
        if self.chunk_threshold_bytes == 0 {
            return Err(invalid(
                "cache.chunk_threshold_bytes",
                self.chunk_threshold_bytes.to_string(),
                "chunk_threshold_bytes must be greater than 0",
            ));
        }

        if self.max_part_bytes == 0 {
            return Err(invalid(
                "cache.max_part_bytes",
                self.max_part_bytes.to_string(),
                "max_part_bytes must be greater than 0",
            ));
        }

        if self.default_ttl.is_zero() {
            return Err(invalid(
                "cache.default_ttl",
                format!("{:?}", self.default_ttl),
                "default_ttl must be positive",
            ));
        }

        if self.default_ttl > self.max_ttl {
            return Err(invalid(
                "cache.default_ttl",
                format!("{:?}", self.default_ttl),
                "default_ttl must not exceed max_ttl",
            ));
        }

        Ok(())
    }
}

/// Settings for the schema reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Name of the host lock guarding structural writes.
    pub lock_name: String,
    /// How long to wait for the lock before reporting busy.
    pub lock_wait: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            lock_name: "schema-reconcile".to_string(),
            lock_wait: Duration::from_secs(10),
        }
    }
}

impl ReconcileConfig {
    /// Set the lock wait bound.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// - `RESALE_RECONCILE_LOCK_WAIT_MS`: lock wait in milliseconds (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lock_wait: env_parse("RESALE_RECONCILE_LOCK_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_wait),
            ..defaults
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ResaleResult<()> {
        if self.lock_name.trim().is_empty() {
            return Err(ResaleError::Config(ConfigError::MissingRequired {
                field: "reconcile.lock_name".to_string(),
            }));
        }
        if self.lock_wait.is_zero() {
            return Err(invalid(
                "reconcile.lock_wait",
                format!("{:?}", self.lock_wait),
                "lock_wait must be positive",
            ));
        }
        Ok(())
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResaleConfig {
    pub cache: CacheConfig,
    pub reconcile: ReconcileConfig,
}

impl ResaleConfig {
    /// Load every section from the environment.
    pub fn from_env() -> Self {
        Self {
            cache: CacheConfig::from_env(),
            reconcile: ReconcileConfig::from_env(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> ResaleResult<()> {
        self.cache.validate()?;
        self.reconcile.validate()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn invalid(field: &str, value: String, reason: &str) -> ResaleError {
    ResaleError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

// =============================================================================
// TESTS
// =============================================================================
