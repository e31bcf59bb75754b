//! Resale Core - Shared Types
//!
//! Pure data structures for the resale admin backing store and its aggregate
//! cache. All other crates depend on this. No I/O lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod lock;
pub mod row;
pub mod schema;

pub use config::{CacheConfig, ReconcileConfig, ResaleConfig};
pub use error::{
    ActionError, CacheError, ConcurrencyError, ConfigError, ErrorKind, ResaleError, ResaleResult,
    StorageError, ValidationError,
};
pub use lock::{Held, Lease, LeaseData, LeaseState, Released};
pub use row::{cell_is_blank, cell_text, Cell, HeaderIndex, RowView};
pub use schema::{BackfillTarget, SchemaRegistry, TableSpec};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Opaque key of one logical cached payload.
pub type CacheKey = String;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Generate the text form of a fresh row identifier.
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

// ============================================================================
// CACHE TAGS
// ============================================================================

/// Group of cache keys that expire together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationCategory {
    Dashboard,
    Ventas,
    Operaciones,
    Config,
    /// Every registered key, whatever its category.
    All,
}

impl InvalidationCategory {
    /// Every category that can own keys (excludes `All`).
    pub const OWNING: [InvalidationCategory; 4] = [
        InvalidationCategory::Dashboard,
        InvalidationCategory::Ventas,
        InvalidationCategory::Operaciones,
        InvalidationCategory::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationCategory::Dashboard => "dashboard",
            InvalidationCategory::Ventas => "ventas",
            InvalidationCategory::Operaciones => "operaciones",
            InvalidationCategory::Config => "config",
            InvalidationCategory::All => "all",
        }
    }
}

impl fmt::Display for InvalidationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidationCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dashboard" => Ok(InvalidationCategory::Dashboard),
            "ventas" => Ok(InvalidationCategory::Ventas),
            "operaciones" => Ok(InvalidationCategory::Operaciones),
            "config" => Ok(InvalidationCategory::Config),
            "all" => Ok(InvalidationCategory::All),
            _ => Err(ValidationError::InvalidValue {
                field: "category".to_string(),
                reason: format!("unknown invalidation category '{}'", s),
            }),
        }
    }
}

/// Where a `get_or_rebuild` value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Cache,
    Rebuild,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSource::Cache => "cache",
            CacheSource::Rebuild => "rebuild",
        }
    }
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value read through the cache, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRead<T> {
    pub value: T,
    pub source: CacheSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T) -> Self {
        Self {
            value,
            source: CacheSource::Cache,
        }
    }

    pub fn rebuilt(value: T) -> Self {
        Self {
            value,
            source: CacheSource::Rebuild,
        }
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == CacheSource::Cache
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

/// One change (or failure) recorded by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportEntry {
    CreatedTable { table: String },
    AddedColumns { table: String, columns: Vec<String> },
    BackfilledIdentifiers { table: String, count: usize },
    /// The table could not be reconciled; the pass moved on.
    TableFailed { table: String, reason: String },
}

impl ReportEntry {
    pub fn table(&self) -> &str {
        match self {
            ReportEntry::CreatedTable { table }
            | ReportEntry::AddedColumns { table, .. }
            | ReportEntry::BackfilledIdentifiers { table, .. }
            | ReportEntry::TableFailed { table, .. } => table,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ReportEntry::TableFailed { .. })
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportEntry::CreatedTable { table } => write!(f, "created table {}", table),
            ReportEntry::AddedColumns { table, columns } => {
                write!(f, "added columns {} to {}", columns.join(", "), table)
            }
            ReportEntry::BackfilledIdentifiers { table, count } => {
                write!(f, "backfilled {} identifiers in {}", count, table)
            }
            ReportEntry::TableFailed { table, reason } => {
                write!(f, "failed to reconcile {}: {}", table, reason)
            }
        }
    }
}

/// Ordered result of one reconcile call. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconciliationReport {
    entries: Vec<ReportEntry>,
}

impl ReconciliationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// True when the pass changed nothing and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(ReportEntry::is_failure)
    }

    /// Human-readable change descriptions in order.
    pub fn descriptions(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}
