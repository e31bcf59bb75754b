//! Declared shape of the admin tables.

use resale_core::{BackfillTarget, ResaleResult, SchemaRegistry, TableSpec};

pub const VENTAS: &str = "Ventas";
pub const GASTOS: &str = "Gastos";
pub const TAREAS: &str = "Tareas";
pub const LIBRO_DIARIO: &str = "Libro Diario";
pub const CONFIG: &str = "Config";

/// Identifier column shared by every backfilled table.
pub const ID_COLUMN: &str = "ID";

/// Tables in creation order with their required columns.
pub fn default_tables() -> ResaleResult<Vec<TableSpec>> {
    Ok(vec![
        TableSpec::new(
            VENTAS,
            [
                "ID", "Fecha", "Producto", "Categoria", "Cliente", "Monto", "Metodo Pago", "Notas",
            ],
        )?,
        TableSpec::new(GASTOS, ["ID", "Fecha", "Concepto", "Categoria", "Monto"])?,
        TableSpec::new(TAREAS, ["ID", "Titulo", "Estado", "Fecha Limite", "Responsable"])?,
        TableSpec::new(LIBRO_DIARIO, ["Fecha", "Concepto", "Monto", "ID"])?,
        TableSpec::new(CONFIG, ["Clave", "Valor"])?,
    ])
}

/// The registry the admin backend reconciles against.
pub fn default_registry() -> ResaleResult<SchemaRegistry> {
    let backfill = [VENTAS, GASTOS, TAREAS, LIBRO_DIARIO]
        .into_iter()
        .map(|table| BackfillTarget::new(table, ID_COLUMN))
        .collect();
    SchemaRegistry::new(default_tables()?, backfill)
}
