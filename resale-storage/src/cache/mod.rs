//! Aggregate cache over a size-limited host cache.
//!
//! The host cache stores strings under a hard per-entry limit. This module
//! layers three things on top of it:
//!
//! - transparent chunking of oversized values ([`Chunker`], [`CacheStore`])
//! - bounded TTL and get-or-rebuild reads returning [`CacheRead<T>`]
//! - category-scoped invalidation ([`InvalidationBus`])
//!
//! # Example
//!
//! ```ignore
//! let bus = InvalidationBus::new(Arc::new(CacheStore::new(host, config)?));
//!
//! let read = bus
//!     .get_or_rebuild(InvalidationCategory::Dashboard, "dashboardStats", ttl, || async {
//!         compute_dashboard(&store)
//!     })
//!     .await?;
//!
//! // After a sale is recorded
//! bus.invalidate(InvalidationCategory::Ventas).await?;
//! ```

pub mod chunker;
pub mod invalidation;
pub mod lmdb_backend;
pub mod memory;
pub mod store;
pub mod traits;

pub use chunker::{Chunker, Manifest, CHUNK_MARKER, MIN_HOST_ENTRY_BYTES, PART_SUFFIX};
pub use invalidation::InvalidationBus;
pub use lmdb_backend::{LmdbCacheError, LmdbHostCache};
pub use memory::{InMemoryHostCache, DEFAULT_MAX_VALUE_BYTES};
pub use store::CacheStore;
pub use traits::{CacheStats, HostCache};
