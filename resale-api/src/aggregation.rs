//! Dashboard and report aggregates served through the cache.
//!
//! Reads go through [`InvalidationBus::get_or_rebuild`]; writes append to the
//! backing store and then invalidate the categories they affect.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use resale_core::{
    cell_is_blank, CacheRead, Cell, HeaderIndex, InvalidationCategory, ResaleResult,
    ValidationError,
};
use resale_storage::{BackingStore, HostCache, InvalidationBus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{GASTOS, ID_COLUMN, TAREAS, VENTAS};

pub const DASHBOARD_STATS_KEY: &str = "dashboardStats";
pub const VENTAS_LIST_KEY: &str = "ventasList";
pub const OPERACIONES_KEY: &str = "operacionesResumen";

/// Task state that no longer counts as pending.
const TAREA_COMPLETADA: &str = "completada";

const VENTAS_CONTENT: &[&str] = &["Producto", "Monto"];
const GASTOS_CONTENT: &[&str] = &["Concepto", "Monto"];
const TAREAS_CONTENT: &[&str] = &["Titulo", "Estado"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub ventas_count: usize,
    pub ingresos_total: f64,
    pub gastos_total: f64,
    pub balance: f64,
    pub ticket_promedio: f64,
    pub tareas_pendientes: usize,
}

/// Expense and task breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperacionesSummary {
    pub gastos_por_categoria: BTreeMap<String, f64>,
    pub tareas_por_estado: BTreeMap<String, usize>,
}

/// Payload of a new sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSale {
    #[serde(default)]
    pub fecha: Option<String>,
    pub producto: String,
    #[serde(default)]
    pub categoria: Option<String>,
    #[serde(default)]
    pub cliente: Option<String>,
    pub monto: f64,
    #[serde(default)]
    pub metodo_pago: Option<String>,
    #[serde(default)]
    pub notas: Option<String>,
}

/// Payload of a new expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    #[serde(default)]
    pub fecha: Option<String>,
    pub concepto: String,
    #[serde(default)]
    pub categoria: Option<String>,
    pub monto: f64,
}

fn require_text(field: &str, value: &str) -> ResaleResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

fn require_amount(value: f64) -> ResaleResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "monto".to_string(),
            reason: format!("must be a positive amount, got {}", value),
        }
        .into());
    }
    Ok(())
}

impl NewSale {
    pub fn validate(&self) -> ResaleResult<()> {
        require_text("producto", &self.producto)?;
        require_amount(self.monto)
    }
}

impl NewExpense {
    pub fn validate(&self) -> ResaleResult<()> {
        require_text("concepto", &self.concepto)?;
        require_amount(self.monto)
    }
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn text_cell(value: Option<String>) -> Cell {
    value.map(Value::String).unwrap_or(Value::Null)
}

/// Header plus data rows that carry something in at least one `content`
/// column. Rows holding only a backfilled ID are skipped.
fn read_table(
    store: &dyn BackingStore,
    table: &str,
    content: &[&str],
) -> ResaleResult<(HeaderIndex, Vec<Vec<Cell>>)> {
    let header = HeaderIndex::from_cells(&store.read_header(table)?);
    let rows = store
        .read_rows(table)?
        .into_iter()
        .filter(|row| {
            let view = header.view(row);
            content
                .iter()
                .any(|column| view.get(column).is_some_and(|cell| !cell_is_blank(cell)))
        })
        .collect();
    Ok((header, rows))
}

/// Lay `fields` out in the table's current column order.
fn build_row(header: &HeaderIndex, fields: Vec<(&str, Cell)>) -> Vec<Cell> {
    let mut row = vec![Value::Null; header.width()];
    for (column, value) in fields {
        if let Some(offset) = header.offset(column) {
            row[offset - 1] = value;
        }
    }
    row
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn compute_dashboard(store: &dyn BackingStore) -> ResaleResult<DashboardStats> {
    let (ventas_header, ventas) = read_table(store, VENTAS, VENTAS_CONTENT)?;
    let ingresos: f64 = ventas
        .iter()
        .filter_map(|row| ventas_header.view(row).number("Monto"))
        .sum();

    let (gastos_header, gastos) = read_table(store, GASTOS, GASTOS_CONTENT)?;
    let gastos_total: f64 = gastos
        .iter()
        .filter_map(|row| gastos_header.view(row).number("Monto"))
        .sum();

    let (tareas_header, tareas) = read_table(store, TAREAS, TAREAS_CONTENT)?;
    let tareas_pendientes = tareas
        .iter()
        .map(|row| tareas_header.view(row))
        .filter(|t| !t.text("Titulo").is_empty())
        .filter(|t| t.text("Estado").to_lowercase() != TAREA_COMPLETADA)
        .count();

    let ventas_count = ventas.len();
    let ticket_promedio = if ventas_count == 0 {
        0.0
    } else {
        ingresos / ventas_count as f64
    };

    Ok(DashboardStats {
        ventas_count,
        ingresos_total: round2(ingresos),
        gastos_total: round2(gastos_total),
        balance: round2(ingresos - gastos_total),
        ticket_promedio: round2(ticket_promedio),
        tareas_pendientes,
    })
}

pub fn compute_ventas(store: &dyn BackingStore) -> ResaleResult<Vec<Map<String, Value>>> {
    let (header, rows) = read_table(store, VENTAS, VENTAS_CONTENT)?;
    Ok(rows.iter().map(|row| header.view(row).to_object()).collect())
}

pub fn compute_operaciones(store: &dyn BackingStore) -> ResaleResult<OperacionesSummary> {
    let mut summary = OperacionesSummary::default();

    let (gastos_header, gastos) = read_table(store, GASTOS, GASTOS_CONTENT)?;
    for row in &gastos {
        let view = gastos_header.view(row);
        let Some(monto) = view.number("Monto") else {
            continue;
        };
        let categoria = match view.text("Categoria") {
            c if c.is_empty() => "Sin categoria".to_string(),
            c => c,
        };
        *summary.gastos_por_categoria.entry(categoria).or_default() += monto;
    }
    for total in summary.gastos_por_categoria.values_mut() {
        *total = round2(*total);
    }

    let (tareas_header, tareas) = read_table(store, TAREAS, TAREAS_CONTENT)?;
    for row in &tareas {
        let estado = match tareas_header.view(row).text("Estado") {
            e if e.is_empty() => "Pendiente".to_string(),
            e => e,
        };
        *summary.tareas_por_estado.entry(estado).or_default() += 1;
    }

    Ok(summary)
}

/// Aggregation service over the backing store and cache.
pub struct DashboardService<H: HostCache + ?Sized> {
    store: Arc<dyn BackingStore>,
    bus: Arc<InvalidationBus<H>>,
    ttl: Duration,
}

impl<H: HostCache + ?Sized> DashboardService<H> {
    pub fn new(store: Arc<dyn BackingStore>, bus: Arc<InvalidationBus<H>>, ttl: Duration) -> Self {
        Self { store, bus, ttl }
    }

    pub fn bus(&self) -> &InvalidationBus<H> {
        &self.bus
    }

    pub async fn dashboard_stats(&self) -> ResaleResult<CacheRead<DashboardStats>> {
        let store = Arc::clone(&self.store);
        self.bus
            .get_or_rebuild(
                InvalidationCategory::Dashboard,
                DASHBOARD_STATS_KEY,
                self.ttl,
                move || async move { compute_dashboard(store.as_ref()) },
            )
            .await
    }

    pub async fn ventas(&self) -> ResaleResult<CacheRead<Vec<Map<String, Value>>>> {
        let store = Arc::clone(&self.store);
        self.bus
            .get_or_rebuild(
                InvalidationCategory::Ventas,
                VENTAS_LIST_KEY,
                self.ttl,
                move || async move { compute_ventas(store.as_ref()) },
            )
            .await
    }

    pub async fn operaciones(&self) -> ResaleResult<CacheRead<OperacionesSummary>> {
        let store = Arc::clone(&self.store);
        self.bus
            .get_or_rebuild(
                InvalidationCategory::Operaciones,
                OPERACIONES_KEY,
                self.ttl,
                move || async move { compute_operaciones(store.as_ref()) },
            )
            .await
    }

    /// Append a sale and invalidate what depends on it. Returns the new ID.
    pub async fn record_sale(&self, sale: NewSale) -> ResaleResult<String> {
        sale.validate()?;
        let header = HeaderIndex::from_cells(&self.store.read_header(VENTAS)?);
        let id = self.store.generate_id();

        let row = build_row(
            &header,
            vec![
                (ID_COLUMN, Value::String(id.clone())),
                ("Fecha", Value::String(sale.fecha.unwrap_or_else(today))),
                ("Producto", Value::String(sale.producto.trim().to_string())),
                ("Categoria", text_cell(sale.categoria)),
                ("Cliente", text_cell(sale.cliente)),
                ("Monto", Value::from(sale.monto)),
                ("Metodo Pago", text_cell(sale.metodo_pago)),
                ("Notas", text_cell(sale.notas)),
            ],
        );
        self.store.append_row(VENTAS, row)?;
        tracing::info!(id = %id, monto = sale.monto, "Recorded sale");

        self.bus
            .invalidate_many(&[InvalidationCategory::Ventas, InvalidationCategory::Dashboard])
            .await?;
        Ok(id)
    }

    /// Append an expense and invalidate what depends on it. Returns the new ID.
    pub async fn record_expense(&self, expense: NewExpense) -> ResaleResult<String> {
        expense.validate()?;
        let header = HeaderIndex::from_cells(&self.store.read_header(GASTOS)?);
        let id = self.store.generate_id();

        let row = build_row(
            &header,
            vec![
                (ID_COLUMN, Value::String(id.clone())),
                ("Fecha", Value::String(expense.fecha.unwrap_or_else(today))),
                ("Concepto", Value::String(expense.concepto.trim().to_string())),
                ("Categoria", text_cell(expense.categoria)),
                ("Monto", Value::from(expense.monto)),
            ],
        );
        self.store.append_row(GASTOS, row)?;
        tracing::info!(id = %id, monto = expense.monto, "Recorded expense");

        self.bus
            .invalidate_many(&[
                InvalidationCategory::Operaciones,
                InvalidationCategory::Dashboard,
            ])
            .await?;
        Ok(id)
    }
}
