//! Backing store abstraction.
//!
//! The backing store is a set of named tables, each a header row plus data
//! rows addressed by 1-based row/column offsets. Data row 1 is the first row
//! under the header.

use resale_core::{new_record_id, Cell, ResaleResult, StorageError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Table-level operations the reconciler and domain actions rely on.
pub trait BackingStore: Send + Sync {
    /// Check whether a table exists.
    fn table_exists(&self, table: &str) -> ResaleResult<bool>;

    /// Create a table whose header row is `header`.
    fn create_table(&self, table: &str, header: &[String]) -> ResaleResult<()>;

    /// Read the header row as stored.
    fn read_header(&self, table: &str) -> ResaleResult<Vec<Cell>>;

    /// Append trailing header cells.
    fn append_columns(&self, table: &str, columns: &[String]) -> ResaleResult<()>;

    /// Number of data rows.
    fn row_count(&self, table: &str) -> ResaleResult<usize>;

    /// Read `len` cells of `column` starting at data row `first_row`.
    fn read_column_range(
        &self,
        table: &str,
        column: usize,
        first_row: usize,
        len: usize,
    ) -> ResaleResult<Vec<Cell>>;

    /// Write `values` down `column` starting at data row `first_row`.
    fn write_column_range(
        &self,
        table: &str,
        column: usize,
        first_row: usize,
        values: &[Cell],
    ) -> ResaleResult<()>;

    /// Read every data row.
    fn read_rows(&self, table: &str) -> ResaleResult<Vec<Vec<Cell>>>;

    /// Append one data row.
    fn append_row(&self, table: &str, row: Vec<Cell>) -> ResaleResult<()>;

    /// Generate a fresh unique identifier.
    fn generate_id(&self) -> String {
        new_record_id()
    }
}

/// Hands out the configured backing store.
///
/// Fails with `ConfigError::StoreNotConfigured` when the host has none.
pub trait StoreConnector: Send + Sync {
    fn connect(&self) -> ResaleResult<Arc<dyn BackingStore>>;
}

/// Connector over a store known at startup (or none at all).
#[derive(Clone, Default)]
pub struct FixedStore {
    store: Option<Arc<dyn BackingStore>>,
}

impl FixedStore {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A connector with no store behind it.
    pub fn unconfigured() -> Self {
        Self { store: None }
    }
}

impl StoreConnector for FixedStore {
    fn connect(&self) -> ResaleResult<Arc<dyn BackingStore>> {
        self.store
            .clone()
            .ok_or_else(|| resale_core::ConfigError::StoreNotConfigured.into())
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Table {
    header: Vec<Cell>,
    rows: Vec<Vec<Cell>>,
}

/// In-memory backing store.
///
/// Also counts cell writes so tests can check that nothing unrelated was
/// rewritten.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<BTreeMap<String, Table>>,
    cell_writes: AtomicU64,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with raw header and rows.
    pub fn insert_table(&self, table: &str, header: Vec<Cell>, rows: Vec<Vec<Cell>>) -> ResaleResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables.insert(table.to_string(), Table { header, rows });
        Ok(())
    }

    /// Header as trimmed text, for assertions.
    pub fn header_names(&self, table: &str) -> ResaleResult<Vec<String>> {
        Ok(self
            .read_header(table)?
            .iter()
            .map(resale_core::cell_text)
            .collect())
    }

    /// Names of all tables.
    pub fn table_names(&self) -> ResaleResult<Vec<String>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.keys().cloned().collect())
    }

    /// Total cells written through the trait since creation.
    pub fn cell_writes(&self) -> u64 {
        self.cell_writes.load(Ordering::Relaxed)
    }

    fn with_table<R>(&self, table: &str, f: impl FnOnce(&Table) -> ResaleResult<R>) -> ResaleResult<R> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let t = tables.get(table).ok_or_else(|| StorageError::TableNotFound {
            table: table.to_string(),
        })?;
        f(t)
    }

    fn with_table_mut<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table) -> ResaleResult<R>,
    ) -> ResaleResult<R> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let t = tables.get_mut(table).ok_or_else(|| StorageError::TableNotFound {
            table: table.to_string(),
        })?;
        f(t)
    }
}

fn check_column(table: &str, t: &Table, column: usize) -> ResaleResult<()> {
    if column == 0 || column > t.header.len() {
        return Err(StorageError::ColumnOutOfRange {
            table: table.to_string(),
            column,
            width: t.header.len(),
        }
        .into());
    }
    Ok(())
}

fn check_rows(table: &str, t: &Table, first_row: usize, len: usize) -> ResaleResult<()> {
    if len == 0 {
        return Ok(());
    }
    let last = first_row.saturating_add(len - 1);
    if first_row == 0 || last > t.rows.len() {
        return Err(StorageError::RowOutOfRange {
            table: table.to_string(),
            row: if first_row == 0 { 0 } else { last },
            rows: t.rows.len(),
        }
        .into());
    }
    Ok(())
}

impl BackingStore for InMemoryStore {
    fn table_exists(&self, table: &str) -> ResaleResult<bool> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.contains_key(table))
    }

    fn create_table(&self, table: &str, header: &[String]) -> ResaleResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        if tables.contains_key(table) {
            return Err(StorageError::TableExists {
                table: table.to_string(),
            }
            .into());
        }
        let header: Vec<Cell> = header.iter().cloned().map(Value::String).collect();
        self.cell_writes
            .fetch_add(header.len() as u64, Ordering::Relaxed);
        tables.insert(
            table.to_string(),
            Table {
                header,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn read_header(&self, table: &str) -> ResaleResult<Vec<Cell>> {
        self.with_table(table, |t| Ok(t.header.clone()))
    }

    fn append_columns(&self, table: &str, columns: &[String]) -> ResaleResult<()> {
        self.with_table_mut(table, |t| {
            t.header
                .extend(columns.iter().cloned().map(Value::String));
            self.cell_writes
                .fetch_add(columns.len() as u64, Ordering::Relaxed);
            Ok(())
        })
    }

    fn row_count(&self, table: &str) -> ResaleResult<usize> {
        self.with_table(table, |t| Ok(t.rows.len()))
    }

    fn read_column_range(
        &self,
        table: &str,
        column: usize,
        first_row: usize,
        len: usize,
    ) -> ResaleResult<Vec<Cell>> {
        self.with_table(table, |t| {
            check_column(table, t, column)?;
            check_rows(table, t, first_row, len)?;
            if len == 0 {
                return Ok(Vec::new());
            }
            Ok(t.rows[first_row - 1..first_row - 1 + len]
                .iter()
                .map(|row| row.get(column - 1).cloned().unwrap_or(Value::Null))
                .collect())
        })
    }

    fn write_column_range(
        &self,
        table: &str,
        column: usize,
        first_row: usize,
        values: &[Cell],
    ) -> ResaleResult<()> {
        self.with_table_mut(table, |t| {
            check_column(table, t, column)?;
            check_rows(table, t, first_row, values.len())?;
            for (offset, value) in values.iter().enumerate() {
                let row = &mut t.rows[first_row - 1 + offset];
                if row.len() < column {
                    row.resize(column, Value::Null);
                }
                row[column - 1] = value.clone();
            }
            self.cell_writes
                .fetch_add(values.len() as u64, Ordering::Relaxed);
            Ok(())
        })
    }

    fn read_rows(&self, table: &str) -> ResaleResult<Vec<Vec<Cell>>> {
        self.with_table(table, |t| Ok(t.rows.clone()))
    }

    fn append_row(&self, table: &str, row: Vec<Cell>) -> ResaleResult<()> {
        self.with_table_mut(table, |t| {
            self.cell_writes
                .fetch_add(row.len() as u64, Ordering::Relaxed);
            t.rows.push(row);
            Ok(())
        })
    }
}
