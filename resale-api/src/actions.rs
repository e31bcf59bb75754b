//! Action dispatch.
//!
//! Requests name an action by string. The string is parsed into the closed
//! [`ActionId`] set up front, so an unknown name fails with
//! `ActionError::UnknownAction` instead of falling through. Handlers are
//! registered in an [`ActionRegistry`] which is validated at startup against
//! that set.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use resale_core::{ActionError, InvalidationCategory, ResaleError, ResaleResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::aggregation::{NewExpense, NewSale};
use crate::envelope::{ActionRequest, Envelope};
use crate::state::AppState;

/// Every action the endpoint understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionId {
    GetDashboardStats,
    GetVentas,
    GetOperaciones,
    RegistrarVenta,
    RegistrarGasto,
    ReconcileSchema,
    InvalidateCache,
    GetCacheStats,
}

impl ActionId {
    pub const ALL: [ActionId; 8] = [
        ActionId::GetDashboardStats,
        ActionId::GetVentas,
        ActionId::GetOperaciones,
        ActionId::RegistrarVenta,
        ActionId::RegistrarGasto,
        ActionId::ReconcileSchema,
        ActionId::InvalidateCache,
        ActionId::GetCacheStats,
    ];

    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionId::GetDashboardStats => "getDashboardStats",
            ActionId::GetVentas => "getVentas",
            ActionId::GetOperaciones => "getOperaciones",
            ActionId::RegistrarVenta => "registrarVenta",
            ActionId::RegistrarGasto => "registrarGasto",
            ActionId::ReconcileSchema => "reconcileSchema",
            ActionId::InvalidateCache => "invalidateCache",
            ActionId::GetCacheStats => "getCacheStats",
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionId {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ActionError::UnknownAction {
                action: s.to_string(),
            })
    }
}

/// Handles one action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, state: &AppState, payload: Value) -> ResaleResult<Value>;
}

/// Decode a handler payload, reporting failures against `action`.
fn parse_payload<T: DeserializeOwned>(action: ActionId, payload: Value) -> ResaleResult<T> {
    serde_json::from_value(payload).map_err(|e| {
        ActionError::InvalidPayload {
            action: action.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn to_data<T: serde::Serialize>(action: ActionId, value: &T) -> ResaleResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        ActionError::InvalidPayload {
            action: action.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

// ============================================================================
// HANDLERS
// ============================================================================

struct DashboardStatsHandler;

#[async_trait]
impl ActionHandler for DashboardStatsHandler {
    async fn handle(&self, state: &AppState, _payload: Value) -> ResaleResult<Value> {
        let read = state.dashboard.dashboard_stats().await?;
        Ok(json!({ "stats": to_data(ActionId::GetDashboardStats, &read.value)?, "source": read.source }))
    }
}

struct VentasHandler;

#[async_trait]
impl ActionHandler for VentasHandler {
    async fn handle(&self, state: &AppState, _payload: Value) -> ResaleResult<Value> {
        let read = state.dashboard.ventas().await?;
        Ok(json!({ "ventas": read.value, "source": read.source }))
    }
}

struct OperacionesHandler;

#[async_trait]
impl ActionHandler for OperacionesHandler {
    async fn handle(&self, state: &AppState, _payload: Value) -> ResaleResult<Value> {
        let read = state.dashboard.operaciones().await?;
        Ok(json!({ "resumen": to_data(ActionId::GetOperaciones, &read.value)?, "source": read.source }))
    }
}

struct RegistrarVentaHandler;

#[async_trait]
impl ActionHandler for RegistrarVentaHandler {
    async fn handle(&self, state: &AppState, payload: Value) -> ResaleResult<Value> {
        let sale: NewSale = parse_payload(ActionId::RegistrarVenta, payload)?;
        let id = state.dashboard.record_sale(sale).await?;
        Ok(json!({ "id": id }))
    }
}

struct RegistrarGastoHandler;

#[async_trait]
impl ActionHandler for RegistrarGastoHandler {
    async fn handle(&self, state: &AppState, payload: Value) -> ResaleResult<Value> {
        let expense: NewExpense = parse_payload(ActionId::RegistrarGasto, payload)?;
        let id = state.dashboard.record_expense(expense).await?;
        Ok(json!({ "id": id }))
    }
}

struct ReconcileSchemaHandler;

#[async_trait]
impl ActionHandler for ReconcileSchemaHandler {
    async fn handle(&self, state: &AppState, _payload: Value) -> ResaleResult<Value> {
        let report = state.reconciler.reconcile().await?;
        Ok(json!({
            "changes": report.descriptions(),
            "hasFailures": report.has_failures(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct InvalidatePayload {
    category: String,
}

struct InvalidateCacheHandler;

#[async_trait]
impl ActionHandler for InvalidateCacheHandler {
    async fn handle(&self, state: &AppState, payload: Value) -> ResaleResult<Value> {
        let request: InvalidatePayload = parse_payload(ActionId::InvalidateCache, payload)?;
        let category: InvalidationCategory = request.category.parse()?;
        let invalidated = state.bus.invalidate(category).await?;
        Ok(json!({ "category": category, "invalidated": invalidated }))
    }
}

struct CacheStatsHandler;

#[async_trait]
impl ActionHandler for CacheStatsHandler {
    async fn handle(&self, state: &AppState, _payload: Value) -> ResaleResult<Value> {
        let stats = state.bus.store().stats();
        Ok(json!({ "stats": to_data(ActionId::GetCacheStats, &stats)?, "hitRate": stats.hit_rate() }))
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Action identifier to handler map.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<ActionId, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// An empty registry. Call [`ActionRegistry::validate`] once populated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler, already validated.
    pub fn standard() -> ResaleResult<Self> {
        let mut registry = Self::new();
        registry
            .register(ActionId::GetDashboardStats, DashboardStatsHandler)
            .register(ActionId::GetVentas, VentasHandler)
            .register(ActionId::GetOperaciones, OperacionesHandler)
            .register(ActionId::RegistrarVenta, RegistrarVentaHandler)
            .register(ActionId::RegistrarGasto, RegistrarGastoHandler)
            .register(ActionId::ReconcileSchema, ReconcileSchemaHandler)
            .register(ActionId::InvalidateCache, InvalidateCacheHandler)
            .register(ActionId::GetCacheStats, CacheStatsHandler);
        registry.validate()?;
        Ok(registry)
    }

    /// Register (or replace) the handler for `id`.
    pub fn register(&mut self, id: ActionId, handler: impl ActionHandler + 'static) -> &mut Self {
        self.handlers.insert(id, Arc::new(handler));
        self
    }

    /// Fail if any known action has no handler.
    pub fn validate(&self) -> ResaleResult<()> {
        match ActionId::ALL.iter().find(|id| !self.handlers.contains_key(*id)) {
            Some(missing) => Err(ActionError::MissingHandler {
                action: missing.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Run a request and wrap the outcome in an envelope.
    pub async fn dispatch(&self, state: &AppState, request: ActionRequest) -> Envelope {
        let action = request.action.clone();
        let result = self.run(state, request).await;
        if let Err(e) = &result {
            tracing::warn!(action = %action, error = %e, kind = ?e.kind(), "Action failed");
        }
        Envelope::from(result)
    }

    async fn run(&self, state: &AppState, request: ActionRequest) -> Result<Value, ResaleError> {
        let id: ActionId = request.action.parse()?;
        let handler = self.handlers.get(&id).ok_or_else(|| ActionError::MissingHandler {
            action: id.to_string(),
        })?;
        tracing::debug!(action = %id, "Dispatching action");
        handler.handle(state, request.payload).await
    }
}
