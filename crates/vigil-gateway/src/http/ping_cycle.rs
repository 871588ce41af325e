//! Cycle entry point: GET /ping-cycle.
//!
//! | mode      | behaviour                                                      |
//! |-----------|----------------------------------------------------------------|
//! | `test`    | liveness payload only; no check, no history, no scheduling     |
//! | `cycle`   | one continuation: sleep, check, continue (needs `cycleId`, `delay`) |
//! | `initial` | default; cancels stale lineages and starts a fresh one         |
//!
//! `source` picks who the initial check is credited to. External schedulers
//! (`ci-scheduler`, `local-job`) get a single check and no chain.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use vigil_core::{now_ms, CycleKind, CycleLineage, EventSource};
use vigil_cycle::{CycleError, CycleOutcome};

use super::{api_error, bad_request, internal, ApiError};
use crate::app::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingCycleQuery {
    pub mode: Option<String>,
    pub cycle_id: Option<String>,
    pub lineage_id: Option<String>,
    pub kind: Option<String>,
    pub delay: Option<u64>,
    pub lineage_start: Option<i64>,
    pub source: Option<String>,
    pub debug: Option<bool>,
}

impl PingCycleQuery {
    /// Rebuild the lineage a dispatcher encoded into the query string.
    ///
    /// A missing `lineageStart` is treated as the epoch, so any cancellation
    /// ever issued covers it.
    pub fn lineage(&self) -> Result<CycleLineage, ApiError> {
        let (Some(cycle_id), Some(delay_ms)) = (self.cycle_id.clone(), self.delay) else {
            return Err(bad_request("mode=cycle requires cycleId and delay"));
        };
        let kind = match self.kind.as_deref() {
            None => CycleKind::Continuation,
            Some(raw) => raw.parse::<CycleKind>().map_err(bad_request)?,
        };
        Ok(CycleLineage {
            lineage_id: self.lineage_id.clone().unwrap_or_else(|| cycle_id.clone()),
            cycle_id,
            kind,
            delay_ms,
            started_at: self.lineage_start.unwrap_or(0),
        })
    }

    fn source(&self) -> Result<EventSource, ApiError> {
        match self.source.as_deref() {
            None => Ok(EventSource::SelfTrigger),
            Some(raw) => raw.parse::<EventSource>().map_err(bad_request),
        }
    }
}

/// GET /ping-cycle
pub async fn ping_cycle_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PingCycleQuery>,
) -> Result<Json<Value>, ApiError> {
    match query.mode.as_deref().unwrap_or("initial") {
        "test" => Ok(Json(json!({
            "status": "ok",
            "mode": "test",
            "timestamp": now_ms(),
        }))),
        "cycle" => {
            let lineage = query.lineage()?;
            debug!(cycle_id = %lineage.cycle_id, kind = %lineage.kind, "continuation arrived");
            let controller = Arc::clone(&state.controller);
            let debug_lineage = query.debug.unwrap_or(false).then(|| lineage.clone());
            // Detached so a dropped caller connection cannot cut the cycle short.
            let outcome = tokio::spawn(async move { controller.run_cycle(lineage).await })
                .await
                .map_err(|e| internal("INTERNAL_ERROR", e))?;
            respond(outcome, debug_lineage)
        }
        "initial" => {
            let source = query.source()?;
            let controller = Arc::clone(&state.controller);
            let outcome = tokio::spawn(async move { controller.start(source).await })
                .await
                .map_err(|e| internal("INTERNAL_ERROR", e))?;
            respond(outcome, None)
        }
        other => Err(bad_request(format!("unknown mode: {other}"))),
    }
}

fn respond(
    outcome: Result<CycleOutcome, CycleError>,
    debug_lineage: Option<CycleLineage>,
) -> Result<Json<Value>, ApiError> {
    match outcome {
        Ok(outcome) => {
            let mut body = serde_json::to_value(&outcome)
                .map_err(|e| internal("SERIALIZATION_ERROR", e))?;
            if let Some(lineage) = debug_lineage {
                body["lineage"] = json!(lineage);
            }
            Ok(Json(body))
        }
        Err(e) => {
            tracing::error!(error = %e, "cycle invocation failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.code(), e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_mode_needs_id_and_delay() {
        let query = PingCycleQuery {
            mode: Some("cycle".into()),
            cycle_id: Some("c1".into()),
            ..Default::default()
        };
        let (status, _) = query.lineage().unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn lineage_defaults() {
        let query = PingCycleQuery {
            cycle_id: Some("c1".into()),
            delay: Some(60_000),
            ..Default::default()
        };
        let lineage = query.lineage().unwrap();
        assert_eq!(lineage.lineage_id, "c1");
        assert_eq!(lineage.kind, CycleKind::Continuation);
        assert_eq!(lineage.started_at, 0);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let query = PingCycleQuery {
            cycle_id: Some("c1".into()),
            delay: Some(1),
            kind: Some("eventual".into()),
            ..Default::default()
        };
        assert!(query.lineage().is_err());
    }
}
