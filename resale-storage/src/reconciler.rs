//! Schema reconciliation.
//!
//! Brings every registered table up to its declared shape without destructive
//! changes: missing tables are created, missing columns appended, and empty
//! identifier cells backfilled. Existing columns are never removed or
//! reordered and non-empty cells are never rewritten.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use resale_core::{
    cell_is_blank, Cell, HeaderIndex, ReconcileConfig, ReconciliationReport, ReportEntry,
    ResaleResult, SchemaRegistry, TableSpec,
};
use serde_json::Value;

use crate::lock::HostLock;
use crate::store::{BackingStore, StoreConnector};

/// Contiguous runs of blank cells, as 0-based index ranges.
pub fn blank_runs(cells: &[Cell]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, cell) in cells.iter().enumerate() {
        match (cell_is_blank(cell), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..cells.len());
    }
    runs
}

/// Reconciles the backing store against a [`SchemaRegistry`].
pub struct SchemaReconciler<L: HostLock + ?Sized> {
    registry: Arc<SchemaRegistry>,
    connector: Arc<dyn StoreConnector>,
    lock: Arc<L>,
    config: ReconcileConfig,
}

impl<L: HostLock + ?Sized> SchemaReconciler<L> {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        connector: Arc<dyn StoreConnector>,
        lock: Arc<L>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            registry,
            connector,
            lock,
            config,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Run one reconciliation pass.
    ///
    /// Fails before any write if the store cannot be obtained, and with a
    /// retryable busy error if the lock is not acquired in time. Per-table
    /// failures do not abort the pass; they are recorded in the report. The
    /// lock is released on every exit, including a panic in the store, which
    /// is resumed afterwards.
    pub async fn reconcile(&self) -> ResaleResult<ReconciliationReport> {
        let store = self.connector.connect()?;

        let lease = self
            .lock
            .try_acquire(&self.config.lock_name, self.config.lock_wait)
            .await?;
        tracing::debug!(
            lock = %self.config.lock_name,
            lease_id = %lease.lease_id(),
            "Acquired reconcile lock"
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.reconcile_tables(store.as_ref())));

        match self.lock.release(lease).await {
            Ok(data) => {
                tracing::debug!(lock = %data.lock_name, lease_id = %data.lease_id, "Released reconcile lock");
            }
            Err(e) => {
                tracing::warn!(lock = %self.config.lock_name, error = %e, "Failed to release reconcile lock");
            }
        }

        let report = match outcome {
            Ok(report) => report,
            Err(payload) => {
                tracing::error!(lock = %self.config.lock_name, "Schema reconciliation panicked");
                panic::resume_unwind(payload);
            }
        };

        tracing::info!(
            changes = report.entries().len(),
            failures = report.has_failures(),
            "Schema reconciliation finished"
        );
        Ok(report)
    }

    fn reconcile_tables(&self, store: &dyn BackingStore) -> ReconciliationReport {
        let mut report = ReconciliationReport::new();
        for spec in self.registry.tables() {
            if let Err(e) = self.reconcile_table(store, spec, &mut report) {
                tracing::warn!(table = %spec.name(), error = %e, "Failed to reconcile table");
                report.push(ReportEntry::TableFailed {
                    table: spec.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
        report
    }

    fn reconcile_table(
        &self,
        store: &dyn BackingStore,
        spec: &TableSpec,
        report: &mut ReconciliationReport,
    ) -> ResaleResult<()> {
        let name = spec.name();
        let index = self.ensure_columns(store, spec, report)?;

        for target in self.registry.backfill_for(name) {
            let count = backfill_identifiers(store, name, &index, &target.id_column)?;
            if count > 0 {
                tracing::info!(table = %name, column = %target.id_column, count, "Backfilled identifiers");
                report.push(ReportEntry::BackfilledIdentifiers {
                    table: name.to_string(),
                    count,
                });
            }
        }
        Ok(())
    }

    /// Create the table or append its missing columns. Returns the resulting
    /// header index.
    fn ensure_columns(
        &self,
        store: &dyn BackingStore,
        spec: &TableSpec,
        report: &mut ReconciliationReport,
    ) -> ResaleResult<HeaderIndex> {
        let name = spec.name();

        if !store.table_exists(name)? {
            store.create_table(name, spec.required_columns())?;
            tracing::info!(table = %name, columns = spec.required_columns().len(), "Created table");
            report.push(ReportEntry::CreatedTable {
                table: name.to_string(),
            });
            let mut index = HeaderIndex::default();
            for column in spec.required_columns() {
                index.push(column.clone());
            }
            return Ok(index);
        }

        let mut index = HeaderIndex::from_cells(&store.read_header(name)?);
        let missing: Vec<String> = index
            .missing(spec.required_columns())
            .into_iter()
            .cloned()
            .collect();
        if !missing.is_empty() {
            store.append_columns(name, &missing)?;
            tracing::info!(table = %name, columns = ?missing, "Added columns");
            for column in &missing {
                index.push(column.clone());
            }
            report.push(ReportEntry::AddedColumns {
                table: name.to_string(),
                columns: missing,
            });
        }
        Ok(index)
    }
}

/// Fill empty cells of `id_column` with fresh identifiers.
///
/// Writes only runs of blank cells. Returns how many cells were filled; a
/// table without the column is left alone.
fn backfill_identifiers(
    store: &dyn BackingStore,
    table: &str,
    index: &HeaderIndex,
    id_column: &str,
) -> ResaleResult<usize> {
    let Some(offset) = index.offset(id_column) else {
        tracing::debug!(table, column = id_column, "Identifier column absent, skipping backfill");
        return Ok(0);
    };

    let rows = store.row_count(table)?;
    if rows == 0 {
        return Ok(0);
    }

    let cells = store.read_column_range(table, offset, 1, rows)?;
    let mut filled = 0;
    for run in blank_runs(&cells) {
        let ids: Vec<Cell> = run
            .clone()
            .map(|_| Value::String(store.generate_id()))
            .collect();
        store.write_column_range(table, offset, run.start + 1, &ids)?;
        filled += ids.len();
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::InMemoryHostLock;
    use crate::store::{FixedStore, InMemoryStore};
    use resale_core::{
        cell_text, BackfillTarget, ConcurrencyError, ConfigError, ResaleError, StorageError,
    };
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    fn registry(tables: Vec<TableSpec>, backfill: Vec<BackfillTarget>) -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::new(tables, backfill).unwrap())
    }

    fn libro_diario() -> Arc<SchemaRegistry> {
        registry(
            vec![TableSpec::new("Libro Diario", ["Fecha", "Monto", "ID"]).unwrap()],
            vec![BackfillTarget::new("Libro Diario", "ID")],
        )
    }

    fn reconciler(
        registry: Arc<SchemaRegistry>,
        store: Arc<dyn BackingStore>,
    ) -> (Arc<InMemoryHostLock>, SchemaReconciler<InMemoryHostLock>) {
        let lock = Arc::new(InMemoryHostLock::new());
        let r = SchemaReconciler::new(
            registry,
            Arc::new(FixedStore::new(store)),
            Arc::clone(&lock),
            ReconcileConfig::default(),
        );
        (lock, r)
    }

    #[test]
    fn test_blank_runs() {
        let cells = vec![json!(""), json!(" "), json!("a"), Value::Null, json!("b"), json!("")];
        assert_eq!(blank_runs(&cells), vec![0..2, 3..4, 5..6]);
        assert!(blank_runs(&[json!("x")]).is_empty());
        assert!(blank_runs(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_missing_column_appended() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_table("Libro Diario", vec![json!("Fecha"), json!("Monto")], vec![])
            .unwrap();
        let (_lock, r) = reconciler(libro_diario(), store.clone());

        let report = r.reconcile().await.unwrap();

        assert_eq!(store.header_names("Libro Diario").unwrap(), vec!["Fecha", "Monto", "ID"]);
        assert_eq!(
            report.entries(),
            &[ReportEntry::AddedColumns {
                table: "Libro Diario".to_string(),
                columns: vec!["ID".to_string()],
            }]
        );
        assert!(report.descriptions()[0].contains("ID"));
    }

    #[tokio::test]
    async fn test_create_uses_declared_order() {
        let store = Arc::new(InMemoryStore::new());
        let (_lock, r) = reconciler(libro_diario(), store.clone());

        let report = r.reconcile().await.unwrap();

        assert_eq!(store.header_names("Libro Diario").unwrap(), vec!["Fecha", "Monto", "ID"]);
        assert_eq!(report.descriptions(), vec!["created table Libro Diario".to_string()]);
    }

    #[tokio::test]
    async fn test_second_pass_is_empty() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_table(
                "Libro Diario",
                vec![json!("Monto"), json!("Fecha")],
                vec![vec![json!(10), json!("2024-01-01")], vec![json!(20), json!("2024-01-02")]],
            )
            .unwrap();
        let (_lock, r) = reconciler(libro_diario(), store.clone());

        let first = r.reconcile().await.unwrap();
        assert_eq!(first.entries().len(), 2);
        let writes = store.cell_writes();

        let second = r.reconcile().await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.cell_writes(), writes);
        // Existing order kept, new column appended.
        assert_eq!(store.header_names("Libro Diario").unwrap(), vec!["Monto", "Fecha", "ID"]);
    }

    #[tokio::test]
    async fn test_backfill_keeps_existing_ids() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_table(
                "Libro Diario",
                vec![json!("Fecha"), json!("Monto"), json!("ID")],
                vec![
                    vec![json!("d1"), json!(1), json!("keep-1")],
                    vec![json!("d2"), json!(2), json!("")],
                    vec![json!("d3"), json!(3), json!("  ")],
                    vec![json!("d4"), json!(4), json!("keep-2")],
                    vec![json!("d5"), json!(5)],
                ],
            )
            .unwrap();
        let (_lock, r) = reconciler(libro_diario(), store.clone());

        let report = r.reconcile().await.unwrap();
        assert_eq!(
            report.entries(),
            &[ReportEntry::BackfilledIdentifiers {
                table: "Libro Diario".to_string(),
                count: 3,
            }]
        );

        let ids: Vec<String> = store
            .read_column_range("Libro Diario", 3, 1, 5)
            .unwrap()
            .iter()
            .map(cell_text)
            .collect();
        assert_eq!(ids[0], "keep-1");
        assert_eq!(ids[3], "keep-2");
        assert!(ids.iter().all(|id| !id.is_empty()));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 5);

        let other: Vec<Cell> = store.read_column_range("Libro Diario", 2, 1, 5).unwrap();
        assert_eq!(other, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
        assert_eq!(store.cell_writes(), 3);
    }

    #[tokio::test]
    async fn test_backfill_skipped_without_id_column_match() {
        let store = Arc::new(InMemoryStore::new());
        let reg = registry(
            vec![TableSpec::new("Tareas", ["Titulo"]).unwrap()],
            vec![BackfillTarget::new("Tareas", "ID")],
        );
        store
            .insert_table("Tareas", vec![json!("Titulo")], vec![vec![json!("x")]])
            .unwrap();
        let (_lock, r) = reconciler(reg, store);
        assert!(r.reconcile().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_store_fails_before_lock() {
        let lock = Arc::new(InMemoryHostLock::new());
        let r = SchemaReconciler::new(
            libro_diario(),
            Arc::new(FixedStore::unconfigured()),
            Arc::clone(&lock),
            ReconcileConfig::default(),
        );

        let err = r.reconcile().await.unwrap_err();
        assert_eq!(err, ResaleError::Config(ConfigError::StoreNotConfigured));
        assert!(!err.is_retryable());
        assert_eq!(lock.holder("schema-reconcile").unwrap(), None);
    }

    #[tokio::test]
    async fn test_busy_lock_is_retryable_and_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let lock = Arc::new(InMemoryHostLock::new());
        let config = ReconcileConfig::default().with_lock_wait(Duration::from_millis(20));
        let r = SchemaReconciler::new(
            libro_diario(),
            Arc::new(FixedStore::new(store.clone())),
            Arc::clone(&lock),
            config.clone(),
        );

        let held = lock
            .try_acquire(&config.lock_name, Duration::from_millis(10))
            .await
            .unwrap();
        let err = r.reconcile().await.unwrap_err();
        assert!(matches!(
            err,
            ResaleError::Concurrency(ConcurrencyError::LockTimeout { .. })
        ));
        assert!(err.is_retryable());
        assert!(store.table_names().unwrap().is_empty());

        lock.release(held).await.unwrap();
        assert!(!r.reconcile().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_released_after_pass() {
        let store = Arc::new(InMemoryStore::new());
        let (lock, r) = reconciler(libro_diario(), store);
        r.reconcile().await.unwrap();
        assert_eq!(lock.holder("schema-reconcile").unwrap(), None);
    }

    /// Delegates to an in-memory store but fails every header read of one table.
    struct BrokenHeader {
        inner: InMemoryStore,
        table: String,
    }

    impl BackingStore for BrokenHeader {
        fn table_exists(&self, table: &str) -> ResaleResult<bool> {
            self.inner.table_exists(table)
        }
        fn create_table(&self, table: &str, header: &[String]) -> ResaleResult<()> {
            self.inner.create_table(table, header)
        }
        fn read_header(&self, table: &str) -> ResaleResult<Vec<Cell>> {
            if table == self.table {
                return Err(StorageError::Unavailable {
                    reason: "sheet locked by owner".to_string(),
                }
                .into());
            }
            self.inner.read_header(table)
        }
        fn append_columns(&self, table: &str, columns: &[String]) -> ResaleResult<()> {
            self.inner.append_columns(table, columns)
        }
        fn row_count(&self, table: &str) -> ResaleResult<usize> {
            self.inner.row_count(table)
        }
        fn read_column_range(
            &self,
            table: &str,
            column: usize,
            first_row: usize,
            len: usize,
        ) -> ResaleResult<Vec<Cell>> {
            self.inner.read_column_range(table, column, first_row, len)
        }
        fn write_column_range(
            &self,
            table: &str,
            column: usize,
            first_row: usize,
            values: &[Cell],
        ) -> ResaleResult<()> {
            self.inner.write_column_range(table, column, first_row, values)
        }
        fn read_rows(&self, table: &str) -> ResaleResult<Vec<Vec<Cell>>> {
            self.inner.read_rows(table)
        }
        fn append_row(&self, table: &str, row: Vec<Cell>) -> ResaleResult<()> {
            self.inner.append_row(table, row)
        }
    }

    #[tokio::test]
    async fn test_failing_table_does_not_abort_others() {
        let inner = InMemoryStore::new();
        inner
            .insert_table("Ventas", vec![json!("Fecha")], vec![])
            .unwrap();
        let store = Arc::new(BrokenHeader {
            inner,
            table: "Ventas".to_string(),
        });
        let reg = registry(
            vec![
                TableSpec::new("Ventas", ["Fecha", "Monto"]).unwrap(),
                TableSpec::new("Gastos", ["Fecha", "Monto"]).unwrap(),
            ],
            vec![],
        );
        let (lock, r) = reconciler(reg, store.clone());

        let report = r.reconcile().await.unwrap();

        assert!(report.has_failures());
        assert_eq!(report.entries().len(), 2);
        assert!(matches!(&report.entries()[0], ReportEntry::TableFailed { table, .. } if table == "Ventas"));
        assert_eq!(
            report.entries()[1],
            ReportEntry::CreatedTable {
                table: "Gastos".to_string()
            }
        );
        assert!(store.inner.table_exists("Gastos").unwrap());
        assert_eq!(lock.holder("schema-reconcile").unwrap(), None);
    }

    /// Store that panics on first contact.
    struct PanickingStore;

    impl BackingStore for PanickingStore {
        fn table_exists(&self, _table: &str) -> ResaleResult<bool> {
            panic!("store driver crashed")
        }
        fn create_table(&self, _table: &str, _header: &[String]) -> ResaleResult<()> {
            unreachable!()
        }
        fn read_header(&self, _table: &str) -> ResaleResult<Vec<Cell>> {
            unreachable!()
        }
        fn append_columns(&self, _table: &str, _columns: &[String]) -> ResaleResult<()> {
            unreachable!()
        }
        fn row_count(&self, _table: &str) -> ResaleResult<usize> {
            unreachable!()
        }
        fn read_column_range(&self, _t: &str, _c: usize, _f: usize, _l: usize) -> ResaleResult<Vec<Cell>> {
            unreachable!()
        }
        fn write_column_range(&self, _t: &str, _c: usize, _f: usize, _v: &[Cell]) -> ResaleResult<()> {
            unreachable!()
        }
        fn read_rows(&self, _table: &str) -> ResaleResult<Vec<Vec<Cell>>> {
            unreachable!()
        }
        fn append_row(&self, _table: &str, _row: Vec<Cell>) -> ResaleResult<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_lock_released_when_store_panics() {
        let (lock, r) = reconciler(libro_diario(), Arc::new(PanickingStore));
        let r = Arc::new(r);

        let task = {
            let r = Arc::clone(&r);
            tokio::spawn(async move { r.reconcile().await })
        };
        assert!(task.await.unwrap_err().is_panic());

        assert_eq!(lock.holder("schema-reconcile").unwrap(), None);
        let lease = lock
            .try_acquire("schema-reconcile", Duration::from_millis(50))
            .await
            .unwrap();
        lock.release(lease).await.unwrap();
    }
}
