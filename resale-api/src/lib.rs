//! Resale API - Action Layer
//!
//! The host application around the reconciler and cache: a closed set of
//! actions dispatched through one endpoint, the aggregation service that
//! computes dashboard payloads, and the declared table schema.

pub mod actions;
pub mod aggregation;
pub mod envelope;
pub mod error;
pub mod schema;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use actions::{ActionHandler, ActionId, ActionRegistry};
pub use aggregation::{
    DashboardService, DashboardStats, NewExpense, NewSale, OperacionesSummary,
    DASHBOARD_STATS_KEY, OPERACIONES_KEY, VENTAS_LIST_KEY,
};
pub use envelope::{ActionRequest, Envelope, Status};
pub use error::{AdminError, AdminResult};
pub use schema::{default_registry, default_tables};
pub use state::{AppState, SharedBus};
pub use telemetry::{init_tracing, LogFormat};
