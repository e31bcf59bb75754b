//! End-to-end tests through the action endpoint.

use std::sync::Arc;

use resale_api::{default_registry, ActionRegistry, ActionRequest, AppState, Envelope, Status};
use resale_core::{ErrorKind, ResaleConfig};
use resale_storage::{FixedStore, InMemoryHostCache, InMemoryHostLock};
use resale_test_utils::assertions::assert_fatal;
use serde_json::{json, Value};

async fn ready_state() -> (AppState, ActionRegistry) {
    let state = AppState::in_memory(ResaleConfig::default()).unwrap();
    let actions = ActionRegistry::standard().unwrap();
    let setup = call(&state, &actions, "reconcileSchema", Value::Null).await;
    assert!(setup.is_success(), "setup failed: {:?}", setup.message);
    (state, actions)
}

async fn call(state: &AppState, actions: &ActionRegistry, action: &str, payload: Value) -> Envelope {
    actions.dispatch(state, ActionRequest::new(action, payload)).await
}

fn data(envelope: &Envelope) -> &Value {
    assert!(envelope.is_success(), "unexpected error: {:?}", envelope.message);
    envelope.data.as_ref().unwrap()
}

#[tokio::test]
async fn test_reconcile_creates_declared_tables() {
    let state = AppState::in_memory(ResaleConfig::default()).unwrap();
    let actions = ActionRegistry::standard().unwrap();

    let first = call(&state, &actions, "reconcileSchema", Value::Null).await;
    let changes = data(&first)["changes"].as_array().unwrap().clone();
    assert!(changes.contains(&json!("created table Ventas")));
    assert_eq!(data(&first)["hasFailures"], json!(false));

    let second = call(&state, &actions, "reconcileSchema", Value::Null).await;
    assert_eq!(data(&second)["changes"], json!([]));
}

#[tokio::test]
async fn test_unknown_action_returns_invalid_envelope() {
    let (state, actions) = ready_state().await;

    let envelope = call(&state, &actions, "dropTables", Value::Null).await;

    assert_eq!(envelope.status, Status::Error);
    assert_eq!(envelope.kind, Some(ErrorKind::Invalid));
    assert!(envelope.message.unwrap().contains("dropTables"));

    let wire = serde_json::to_value(call(&state, &actions, "dropTables", Value::Null).await).unwrap();
    assert_eq!(wire["status"], json!("error"));
    assert_eq!(wire["kind"], json!("invalid"));
    assert!(wire.get("data").is_none());
}

#[tokio::test]
async fn test_sale_invalidates_dashboard_stats() {
    let (state, actions) = ready_state().await;

    let first = call(&state, &actions, "getDashboardStats", Value::Null).await;
    assert_eq!(data(&first)["source"], json!("rebuild"));
    assert_eq!(data(&first)["stats"]["ventasCount"], json!(0));

    let cached = call(&state, &actions, "getDashboardStats", Value::Null).await;
    assert_eq!(data(&cached)["source"], json!("cache"));

    let sale = call(
        &state,
        &actions,
        "registrarVenta",
        json!({ "producto": "Chaqueta", "monto": 40.0, "metodoPago": "Efectivo" }),
    )
    .await;
    let id = data(&sale)["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let after = call(&state, &actions, "getDashboardStats", Value::Null).await;
    assert_eq!(data(&after)["source"], json!("rebuild"));
    assert_eq!(data(&after)["stats"]["ventasCount"], json!(1));
    assert_eq!(data(&after)["stats"]["ingresosTotal"], json!(40.0));

    let ventas = call(&state, &actions, "getVentas", Value::Null).await;
    let rows = data(&ventas)["ventas"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["ID"], json!(id));
    assert_eq!(rows[0]["Producto"], json!("Chaqueta"));
}

#[tokio::test]
async fn test_expense_leaves_ventas_cached() {
    let (state, actions) = ready_state().await;
    call(&state, &actions, "getVentas", Value::Null).await;
    call(&state, &actions, "getOperaciones", Value::Null).await;

    let expense = call(
        &state,
        &actions,
        "registrarGasto",
        json!({ "concepto": "Alquiler", "categoria": "Local", "monto": 300 }),
    )
    .await;
    assert!(expense.is_success());

    let ventas = call(&state, &actions, "getVentas", Value::Null).await;
    assert_eq!(data(&ventas)["source"], json!("cache"));

    let ops = call(&state, &actions, "getOperaciones", Value::Null).await;
    assert_eq!(data(&ops)["source"], json!("rebuild"));
    assert_eq!(data(&ops)["resumen"]["gastosPorCategoria"]["Local"], json!(300.0));
}

#[tokio::test]
async fn test_invalidate_all_forces_rebuild() {
    let (state, actions) = ready_state().await;
    call(&state, &actions, "getDashboardStats", Value::Null).await;
    call(&state, &actions, "getVentas", Value::Null).await;

    let envelope = call(&state, &actions, "invalidateCache", json!({ "category": "all" })).await;
    assert_eq!(data(&envelope)["category"], json!("all"));
    assert_eq!(data(&envelope)["invalidated"], json!(2));

    let stats = call(&state, &actions, "getDashboardStats", Value::Null).await;
    assert_eq!(data(&stats)["source"], json!("rebuild"));
    let ventas = call(&state, &actions, "getVentas", Value::Null).await;
    assert_eq!(data(&ventas)["source"], json!("rebuild"));
}

#[tokio::test]
async fn test_bad_payloads_are_invalid() {
    let (state, actions) = ready_state().await;

    let missing = call(&state, &actions, "registrarVenta", json!({ "monto": 10 })).await;
    assert_eq!(missing.kind, Some(ErrorKind::Invalid));

    let negative = call(
        &state,
        &actions,
        "registrarVenta",
        json!({ "producto": "Bolso", "monto": -5 }),
    )
    .await;
    assert_eq!(negative.kind, Some(ErrorKind::Invalid));

    let category = call(&state, &actions, "invalidateCache", json!({ "category": "inventario" })).await;
    assert_eq!(category.kind, Some(ErrorKind::Invalid));

    let ventas = call(&state, &actions, "getVentas", Value::Null).await;
    assert_eq!(data(&ventas)["ventas"], json!([]));
}

#[tokio::test]
async fn test_cache_stats_report_hits_and_rebuilds() {
    let (state, actions) = ready_state().await;
    call(&state, &actions, "getVentas", Value::Null).await;
    call(&state, &actions, "getVentas", Value::Null).await;

    let envelope = call(&state, &actions, "getCacheStats", Value::Null).await;
    let stats = &data(&envelope)["stats"];
    assert_eq!(stats["hits"], json!(1));
    assert_eq!(stats["rebuilds"], json!(1));
    assert!(data(&envelope)["hitRate"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_unconfigured_store_is_fatal() {
    let result = AppState::new(
        ResaleConfig::default(),
        Arc::new(FixedStore::unconfigured()),
        Arc::new(InMemoryHostCache::default()),
        Arc::new(InMemoryHostLock::new()),
        default_registry().unwrap(),
    );
    assert_fatal(&result.map(|_| ()));
}
