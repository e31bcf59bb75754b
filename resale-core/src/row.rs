//! Named access to positional rows.
//!
//! Tables are addressed by 1-based column offsets. [`HeaderIndex`] resolves a
//! column name to its offset once per table shape so callers never index rows
//! by hand-counted positions.

use serde_json::Value;
use std::collections::HashMap;

/// One cell of a backing table.
pub type Cell = Value;

/// Stringify a cell and trim it.
///
/// Null becomes the empty string; numbers and booleans use their display form.
pub fn cell_text(cell: &Cell) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Returns true if the cell is empty after trimming.
pub fn cell_is_blank(cell: &Cell) -> bool {
    cell_text(cell).is_empty()
}

/// Column name to 1-based offset, built from a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderIndex {
    names: Vec<String>,
    offsets: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Build from raw header cells (trimmed and stringified).
    ///
    /// If a name repeats, the leftmost column wins.
    pub fn from_cells(cells: &[Cell]) -> Self {
        let mut index = Self::default();
        for cell in cells {
            index.push(cell_text(cell));
        }
        index
    }

    /// Append a trailing column.
    pub fn push(&mut self, name: String) {
        let offset = self.names.len() + 1;
        if !name.is_empty() {
            self.offsets.entry(name.clone()).or_insert(offset);
        }
        self.names.push(name);
    }

    /// 1-based offset of a column, exact case-sensitive match.
    pub fn offset(&self, name: &str) -> Option<usize> {
        self.offsets.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.offsets.contains_key(name)
    }

    /// Number of header cells, including blank ones.
    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Required columns absent from this header, in the order given.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a String> {
        required.iter().filter(|c| !self.contains(c)).collect()
    }

    /// View a positional row through this header.
    pub fn view<'a>(&'a self, cells: &'a [Cell]) -> RowView<'a> {
        RowView { index: self, cells }
    }
}

/// A data row with named field access.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    index: &'a HeaderIndex,
    cells: &'a [Cell],
}

impl<'a> RowView<'a> {
    /// Raw cell for a column. Short rows read as absent.
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        let offset = self.index.offset(column)?;
        self.cells.get(offset - 1)
    }

    /// Trimmed text of a column, empty if absent.
    pub fn text(&self, column: &str) -> String {
        self.get(column).map(cell_text).unwrap_or_default()
    }

    /// Numeric value of a column, accepting numbers and numeric strings.
    pub fn number(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', ".").parse().ok(),
            _ => None,
        }
    }

    /// Row as a JSON object keyed by header name.
    pub fn to_object(&self) -> serde_json::Map<String, Value> {
        self.index
            .names()
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| {
                let value = self.cells.get(i).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }
}
