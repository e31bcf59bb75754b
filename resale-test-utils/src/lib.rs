//! Resale Test Utilities
//!
//! Shared test infrastructure for the resale workspace:
//! - Proptest generators for headers, cells and cache payloads
//! - Fixtures for registries, drifted stores and small caches
//! - Failure-injecting store and host cache wrappers
//! - Assertions over error kinds

pub use resale_core::{
    BackfillTarget, Cell, ErrorKind, InvalidationCategory, ResaleError, ResaleResult,
    SchemaRegistry, StorageError, TableSpec,
};
pub use resale_storage::{
    BackingStore, CacheStore, HostCache, InMemoryHostCache, InMemoryHostLock, InMemoryStore,
    InvalidationBus,
};

use async_trait::async_trait;
use resale_core::CacheError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ============================================================================
// FAILURE-INJECTING MOCKS
// ============================================================================

/// Store that fails every operation touching one table.
///
/// Everything else is delegated to an [`InMemoryStore`].
#[derive(Debug)]
pub struct FailingStore {
    inner: InMemoryStore,
    broken_table: String,
}

impl FailingStore {
    pub fn new(inner: InMemoryStore, broken_table: impl Into<String>) -> Self {
        Self {
            inner,
            broken_table: broken_table.into(),
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn check(&self, table: &str) -> ResaleResult<()> {
        if table == self.broken_table {
            return Err(StorageError::Unavailable {
                reason: format!("table '{}' is unreachable", table),
            }
            .into());
        }
        Ok(())
    }
}

impl BackingStore for FailingStore {
    fn table_exists(&self, table: &str) -> ResaleResult<bool> {
        self.check(table)?;
        self.inner.table_exists(table)
    }

    fn create_table(&self, table: &str, header: &[String]) -> ResaleResult<()> {
        self.check(table)?;
        self.inner.create_table(table, header)
    }

    fn read_header(&self, table: &str) -> ResaleResult<Vec<Cell>> {
        self.check(table)?;
        self.inner.read_header(table)
    }

    fn append_columns(&self, table: &str, columns: &[String]) -> ResaleResult<()> {
        self.check(table)?;
        self.inner.append_columns(table, columns)
    }

    fn row_count(&self, table: &str) -> ResaleResult<usize> {
        self.check(table)?;
        self.inner.row_count(table)
    }

    fn read_column_range(
        &self,
        table: &str,
        column: usize,
        first_row: usize,
        len: usize,
    ) -> ResaleResult<Vec<Cell>> {
        self.check(table)?;
        self.inner.read_column_range(table, column, first_row, len)
    }

    fn write_column_range(
        &self,
        table: &str,
        column: usize,
        first_row: usize,
        values: &[Cell],
    ) -> ResaleResult<()> {
        self.check(table)?;
        self.inner.write_column_range(table, column, first_row, values)
    }

    fn read_rows(&self, table: &str) -> ResaleResult<Vec<Vec<Cell>>> {
        self.check(table)?;
        self.inner.read_rows(table)
    }

    fn append_row(&self, table: &str, row: Vec<Cell>) -> ResaleResult<()> {
        self.check(table)?;
        self.inner.append_row(table, row)
    }
}

/// Host cache whose reads or writes can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyHostCache {
    inner: InMemoryHostCache,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyHostCache {
    pub fn new(inner: InMemoryHostCache) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &InMemoryHostCache {
        &self.inner
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn backend_down() -> ResaleError {
        CacheError::Backend {
            reason: "host cache unavailable".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl HostCache for FlakyHostCache {
    fn max_value_bytes(&self) -> usize {
        self.inner.max_value_bytes()
    }

    async fn get(&self, key: &str) -> ResaleResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::backend_down());
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> ResaleResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::backend_down());
        }
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> ResaleResult<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::backend_down());
        }
        self.inner.delete(key).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for resale test data.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// A column name that survives trimming unchanged.
    pub fn arb_column_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{1,8}"
    }

    /// Distinct column names in generated order.
    pub fn arb_columns(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_column_name(), 1..=max.max(1)).prop_map(|names| {
            let mut seen = std::collections::HashSet::new();
            names
                .into_iter()
                .filter(|n| seen.insert(n.clone()))
                .collect()
        })
    }

    /// An identifier cell that is blank about half the time.
    pub fn arb_id_cell() -> impl Strategy<Value = Cell> {
        prop_oneof![
            Just(Value::Null),
            Just(Value::String(String::new())),
            Just(Value::String("   ".to_string())),
            "[a-z0-9]{6,12}".prop_map(Value::String),
        ]
    }

    /// An ordinary data cell.
    pub fn arb_cell() -> impl Strategy<Value = Cell> {
        prop_oneof![
            Just(Value::Null),
            any::<i32>().prop_map(Value::from),
            any::<bool>().prop_map(Value::Bool),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        ]
    }

    /// A cache payload of arbitrary unicode text.
    pub fn arb_payload(max_chars: usize) -> impl Strategy<Value = String> {
        prop::collection::vec(any::<char>(), 0..=max_chars).prop_map(|chars| chars.into_iter().collect())
    }

    /// A category that can own keys.
    pub fn arb_owning_category() -> impl Strategy<Value = InvalidationCategory> {
        prop::sample::select(InvalidationCategory::OWNING.to_vec())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use resale_core::CacheConfig;
    use resale_storage::MIN_HOST_ENTRY_BYTES;
    use serde_json::json;
    use std::sync::Arc;

    /// Two tables with identifier backfill on both.
    pub fn sample_registry() -> SchemaRegistry {
        let tables = vec![
            TableSpec::new("Ventas", ["Fecha", "Producto", "Monto", "ID"]),
            TableSpec::new("Libro Diario", ["Fecha", "Monto", "ID"]),
        ]
        .into_iter()
        .collect::<ResaleResult<Vec<_>>>();
        let backfill = vec![
            BackfillTarget::new("Ventas", "ID"),
            BackfillTarget::new("Libro Diario", "ID"),
        ];
        match tables.and_then(|t| SchemaRegistry::new(t, backfill)) {
            Ok(registry) => registry,
            Err(e) => panic!("sample registry must be valid: {}", e),
        }
    }

    /// `Libro Diario` missing its `ID` column, with two rows.
    pub fn drifted_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_table(
                "Libro Diario",
                vec![json!("Fecha"), json!("Monto")],
                vec![
                    vec![json!("2026-03-01"), json!(120.5)],
                    vec![json!("2026-03-02"), json!(80)],
                ],
            )
            .unwrap_or_else(|e| panic!("seeding drifted store: {}", e));
        store
    }

    /// A cache store whose threshold and part size use `limit`. The host
    /// entry limit is `limit`, raised to fit a manifest if needed.
    pub fn small_cache(limit: usize) -> (Arc<InMemoryHostCache>, Arc<CacheStore<InMemoryHostCache>>) {
        let host = Arc::new(InMemoryHostCache::new(limit.max(MIN_HOST_ENTRY_BYTES)));
        let config = CacheConfig::new()
            .with_chunk_threshold(limit)
            .with_max_part_bytes(limit);
        match CacheStore::new(Arc::clone(&host), config) {
            Ok(store) => (host, Arc::new(store)),
            Err(e) => panic!("small cache config must be valid: {}", e),
        }
    }

    /// An invalidation bus over [`small_cache`].
    pub fn small_bus(limit: usize) -> (Arc<InMemoryHostCache>, InvalidationBus<InMemoryHostCache>) {
        let (host, store) = small_cache(limit);
        (host, InvalidationBus::new(store))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over [`ResaleError`] kinds.

    use super::*;

    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &ResaleResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "wrong error kind for {:?}", e),
            Ok(v) => panic!("Expected {:?} error, got Ok({:?})", kind, v),
        }
    }

    /// Assert that a ResaleResult failed with a retryable error.
    #[track_caller]
    pub fn assert_retryable<T: std::fmt::Debug>(result: &ResaleResult<T>) {
        assert_kind(result, ErrorKind::Retryable);
    }

    /// Assert that a ResaleResult failed with a fatal error.
    #[track_caller]
    pub fn assert_fatal<T: std::fmt::Debug>(result: &ResaleResult<T>) {
        assert_kind(result, ErrorKind::Fatal);
    }

    #[track_caller]
    pub fn assert_invalid<T: std::fmt::Debug>(result: &ResaleResult<T>) {
        assert_kind(result, ErrorKind::Invalid);
    }
}

// ============================================================================
// TESTS
// ============================================================================
