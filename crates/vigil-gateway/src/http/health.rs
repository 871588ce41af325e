use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use vigil_core::now_ms;

use crate::app::AppState;

/// GET /health: liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "dispatch": state.config.cycle.dispatch,
        "uptimeSeconds": (now_ms() - state.started_at).max(0) / 1000,
        "inFlight": state.controller.in_flight().len(),
    }))
}
