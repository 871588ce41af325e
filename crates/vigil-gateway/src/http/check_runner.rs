use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{internal, ApiError};
use crate::app::AppState;
use crate::probe::ProbeReport;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRunnerQuery {
    pub cycle_id: Option<String>,
}

/// GET /check-runner?cycleId=: run one probe round and report the interval
/// that governed it.
pub async fn check_runner_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckRunnerQuery>,
) -> Result<Json<ProbeReport>, ApiError> {
    let cycle_id = query.cycle_id.unwrap_or_else(|| "adhoc".to_string());
    state
        .probes
        .run(&cycle_id)
        .await
        .map(Json)
        .map_err(|e| internal(e.code(), e))
}
