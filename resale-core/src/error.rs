//! Error types for resale operations

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Backing store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Table already exists: {table}")]
    TableExists { table: String },

    #[error("Column {column} out of range for {table} ({width} columns)")]
    ColumnOutOfRange {
        table: String,
        column: usize,
        width: usize,
    },

    #[error("Row {row} out of range for {table} ({rows} data rows)")]
    RowOutOfRange {
        table: String,
        row: usize,
        rows: usize,
    },

    #[error("Write failed for {table}: {reason}")]
    WriteFailed { table: String, reason: String },

    #[error("Backing store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Host cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Value for {key} is {size} bytes, host limit is {limit}")]
    ValueTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },

    #[error("Cache backend failure: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Duplicate table in registry: {table}")]
    DuplicateTable { table: String },

    #[error("Duplicate column {column} in table {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("Table {table} is not registered")]
    UnknownTable { table: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No backing store configured")]
    StoreNotConfigured,

    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Contention on the host mutual-exclusion primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConcurrencyError {
    #[error("Busy: lock {lock} not acquired within {waited:?}")]
    LockTimeout { lock: String, waited: Duration },

    #[error("Lease {lease_id} is not the current holder of {lock}")]
    LeaseMismatch { lock: String, lease_id: Uuid },
}

/// Action dispatch errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Unknown action: {action}")]
    UnknownAction { action: String },

    #[error("No handler registered for action {action}")]
    MissingHandler { action: String },

    #[error("Invalid payload for {action}: {reason}")]
    InvalidPayload { action: String, reason: String },
}

/// Master error type for all resale errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResaleError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),
}

/// How a caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Structural or configuration failure. Report, do not retry.
    Fatal,
    /// Contention. Safe to retry later.
    Retryable,
    /// Caller supplied something wrong.
    Invalid,
}

impl ResaleError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResaleError::Concurrency(ConcurrencyError::LockTimeout { .. }) => ErrorKind::Retryable,
            ResaleError::Validation(_) | ResaleError::Action(_) => ErrorKind::Invalid,
            ResaleError::Storage(_)
            | ResaleError::Cache(_)
            | ResaleError::Config(_)
            | ResaleError::Concurrency(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true if the operation may succeed when retried unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }
}

/// Result type alias for resale operations.
pub type ResaleResult<T> = Result<T, ResaleError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_table_not_found() {
        let err = StorageError::TableNotFound {
            table: "Ventas".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Table not found"));
        assert!(msg.contains("Ventas"));
    }

    #[test]
    fn test_cache_error_display_value_too_large() {
        let err = CacheError::ValueTooLarge {
            key: "dashboardStats".to_string(),
            size: 250_000,
            limit: 100_000,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("dashboardStats"));
        assert!(msg.contains("250000"));
        assert!(msg.contains("100000"));
    }

    #[test]
    fn test_lock_timeout_is_busy_and_retryable() {
        let err = ResaleError::from(ConcurrencyError::LockTimeout {
            lock: "schema-reconcile".to_string(),
            waited: Duration::from_secs(10),
        });
        assert!(format!("{}", err).contains("Busy"));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Retryable);
    }

    #[test]
    fn test_config_error_is_fatal() {
        let err = ResaleError::from(ConfigError::StoreNotConfigured);
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_lease_mismatch_is_fatal() {
        let err = ResaleError::from(ConcurrencyError::LeaseMismatch {
            lock: "schema-reconcile".to_string(),
            lease_id: Uuid::nil(),
        });
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_unknown_action_is_invalid() {
        let err = ResaleError::from(ActionError::UnknownAction {
            action: "borrarTodo".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(format!("{}", err).contains("borrarTodo"));
    }

    #[test]
    fn test_resale_error_from_variants() {
        let storage = ResaleError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, ResaleError::Storage(_)));

        let cache = ResaleError::from(CacheError::Backend {
            reason: "down".to_string(),
        });
        assert!(matches!(cache, ResaleError::Cache(_)));

        let validation = ResaleError::from(ValidationError::DuplicateTable {
            table: "Ventas".to_string(),
        });
        assert!(matches!(validation, ResaleError::Validation(_)));

        let config = ResaleError::from(ConfigError::MissingRequired {
            field: "store".to_string(),
        });
        assert!(matches!(config, ResaleError::Config(_)));
    }
}
