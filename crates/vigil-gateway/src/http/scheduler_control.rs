use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{bad_request, internal, ApiError};
use crate::app::AppState;

#[derive(Deserialize)]
pub struct ControlQuery {
    pub action: Option<String>,
    pub reason: Option<String>,
}

/// GET /scheduler-control?action=cancel: mark every outstanding lineage
/// stale. Repeating it is harmless.
pub async fn scheduler_control_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ControlQuery>,
) -> Result<Json<Value>, ApiError> {
    match query.action.as_deref() {
        Some("cancel") => {
            let reason = query.reason.as_deref().unwrap_or("operator request");
            let cancelled_at = state
                .controller
                .cancel_signal()
                .cancel(reason)
                .map_err(|e| internal(e.code(), e))?;
            Ok(Json(json!({
                "status": "cancelled",
                "cancelledAt": cancelled_at,
                "reason": reason,
            })))
        }
        Some(other) => Err(bad_request(format!("unknown action: {other}"))),
        None => Err(bad_request("missing action")),
    }
}
