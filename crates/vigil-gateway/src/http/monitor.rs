use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use vigil_core::now_ms;
use vigil_cycle::InFlight;
use vigil_monitor::MonitorReport;

use super::{internal, ApiError};
use crate::app::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorView {
    #[serde(flatten)]
    pub report: MonitorReport,
    pub in_flight: Vec<InFlight>,
}

/// GET /monitor: active source, per-source health, drift and in-process
/// invocations.
pub async fn monitor_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MonitorView>, ApiError> {
    let events = state
        .history
        .all()
        .map_err(|e| internal("DATABASE_ERROR", e))?;
    let config = state
        .settings
        .scheduler_config()
        .map_err(|e| internal("CONFIG_ERROR", e))?;
    let jobs = state
        .jobs
        .list_jobs()
        .map_err(|e| internal("DATABASE_ERROR", e))?;
    let last_reset = state
        .history
        .last_interval_reset()
        .map_err(|e| internal("DATABASE_ERROR", e))?;

    let report = MonitorReport::build(
        &state.reconciler,
        &events,
        &config,
        &jobs,
        last_reset,
        now_ms(),
    );
    Ok(Json(MonitorView {
        report,
        in_flight: state.controller.in_flight(),
    }))
}
