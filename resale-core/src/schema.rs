//! Declarative table shapes.
//!
//! The registry is pure data handed over by the host application at startup.
//! It is validated once here so the reconciler can trust it.

use crate::{ResaleResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Required shape of one table.
///
/// Column order is the header order used when the table is created. It is not
/// enforced on existing tables, where missing columns are appended at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    name: String,
    required_columns: Vec<String>,
}

impl TableSpec {
    /// Build a spec, rejecting empty names and duplicate columns.
    pub fn new<N, I, C>(name: N, required_columns: I) -> ResaleResult<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "table.name".to_string(),
            }
            .into());
        }

        let required_columns: Vec<String> = required_columns.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(required_columns.len());
        for column in &required_columns {
            if column.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: format!("{}.columns", name),
                    reason: "column names must not be blank".to_string(),
                }
                .into());
            }
            if !seen.insert(column.as_str()) {
                return Err(ValidationError::DuplicateColumn {
                    table: name.clone(),
                    column: column.clone(),
                }
                .into());
            }
        }

        Ok(Self {
            name,
            required_columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Required columns in canonical order.
    pub fn required_columns(&self) -> &[String] {
        &self.required_columns
    }
}

/// A column whose empty cells get freshly generated identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackfillTarget {
    pub table: String,
    pub id_column: String,
}

impl BackfillTarget {
    pub fn new(table: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_column: id_column.into(),
        }
    }
}

/// Ordered table specs plus identifier backfill targets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    tables: Vec<TableSpec>,
    backfill: Vec<BackfillTarget>,
}

impl SchemaRegistry {
    /// Build a registry.
    ///
    /// Fails on duplicate table names and on backfill targets that name a
    /// table the registry does not know.
    pub fn new(tables: Vec<TableSpec>, backfill: Vec<BackfillTarget>) -> ResaleResult<Self> {
        let mut names = HashSet::with_capacity(tables.len());
        for spec in &tables {
            if !names.insert(spec.name()) {
                return Err(ValidationError::DuplicateTable {
                    table: spec.name().to_string(),
                }
                .into());
            }
        }

        for target in &backfill {
            if !names.contains(target.table.as_str()) {
                return Err(ValidationError::UnknownTable {
                    table: target.table.clone(),
                }
                .into());
            }
            if target.id_column.trim().is_empty() {
                return Err(ValidationError::RequiredFieldMissing {
                    field: format!("{}.id_column", target.table),
                }
                .into());
            }
        }

        Ok(Self { tables, backfill })
    }

    /// Table specs in registry order.
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name() == name)
    }

    pub fn backfill_targets(&self) -> &[BackfillTarget] {
        &self.backfill
    }

    /// Backfill targets registered for one table.
    pub fn backfill_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a BackfillTarget> + 'a {
        self.backfill.iter().filter(move |t| t.table == table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResaleError;

    #[test]
    fn test_table_spec_rejects_duplicate_columns() {
        let err = TableSpec::new("Ventas", ["Fecha", "Monto", "Fecha"]).unwrap_err();
        assert!(matches!(
            err,
            ResaleError::Validation(ValidationError::DuplicateColumn { ref column, .. }) if column == "Fecha"
        ));
    }

    #[test]
    fn test_table_spec_rejects_blank_name() {
        assert!(TableSpec::new(" ", ["ID"]).is_err());
        assert!(TableSpec::new("Ventas", ["ID", ""]).is_err());
    }

    #[test]
    fn test_column_match_is_case_sensitive() {
        // "id" and "ID" are distinct columns.
        let spec = TableSpec::new("Tareas", ["id", "ID"]).unwrap();
        assert_eq!(spec.required_columns().len(), 2);
    }

    #[test]
    fn test_registry_rejects_duplicate_tables() {
        let a = TableSpec::new("Ventas", ["ID"]).unwrap();
        let b = TableSpec::new("Ventas", ["Fecha"]).unwrap();
        assert!(matches!(
            SchemaRegistry::new(vec![a, b], vec![]),
            Err(ResaleError::Validation(ValidationError::DuplicateTable { .. }))
        ));
    }

    #[test]
    fn test_registry_rejects_unknown_backfill_table() {
        let a = TableSpec::new("Ventas", ["ID"]).unwrap();
        let result = SchemaRegistry::new(vec![a], vec![BackfillTarget::new("Gastos", "ID")]);
        assert!(matches!(
            result,
            Err(ResaleError::Validation(ValidationError::UnknownTable { .. }))
        ));
    }

    #[test]
    fn test_registry_preserves_order() {
        let registry = SchemaRegistry::new(
            vec![
                TableSpec::new("Ventas", ["ID"]).unwrap(),
                TableSpec::new("Gastos", ["ID"]).unwrap(),
                TableSpec::new("Libro Diario", ["Fecha", "Monto", "ID"]).unwrap(),
            ],
            vec![BackfillTarget::new("Ventas", "ID")],
        )
        .unwrap();

        let names: Vec<&str> = registry.tables().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["Ventas", "Gastos", "Libro Diario"]);
        assert_eq!(registry.backfill_for("Ventas").count(), 1);
        assert_eq!(registry.backfill_for("Gastos").count(), 0);
        assert!(registry.table("Libro Diario").is_some());
    }
}
