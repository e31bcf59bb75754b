//! Resale Storage - Schema Reconciler and Aggregate Cache
//!
//! Keeps the tabular backing store in its declared shape and serves expensive
//! aggregates from a size-limited host cache. The store, cache and lock are
//! host collaborators behind traits; in-memory and LMDB implementations live
//! here for tests and single-process deployments.

pub mod cache;
pub mod lock;
pub mod reconciler;
pub mod store;

pub use cache::{
    CacheStats, CacheStore, Chunker, HostCache, InMemoryHostCache, InvalidationBus,
    LmdbCacheError, LmdbHostCache, Manifest, CHUNK_MARKER, DEFAULT_MAX_VALUE_BYTES,
    MIN_HOST_ENTRY_BYTES, PART_SUFFIX,
};
pub use lock::{HostLock, InMemoryHostLock};
pub use reconciler::{blank_runs, SchemaReconciler};
pub use store::{BackingStore, FixedStore, InMemoryStore, StoreConnector};
