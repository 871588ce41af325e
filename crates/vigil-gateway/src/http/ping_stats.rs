use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vigil_core::{CheckEvent, CronSchedule};
use vigil_monitor::ReconcileInput;

use super::{internal, ApiError};
use crate::app::AppState;

#[derive(Deserialize)]
pub struct PingStatsQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingStats {
    pub last_ping: Option<i64>,
    /// Last ping plus the active source's interval.
    pub next_ping: Option<i64>,
    pub recent_history: Vec<CheckEvent>,
    pub last_interval_reset: i64,
    pub github_action: GithubAction,
    pub interval_seconds: u64,
}

#[derive(Serialize)]
pub struct GithubAction {
    pub enabled: bool,
    pub schedule: String,
}

impl From<&CronSchedule> for GithubAction {
    fn from(schedule: &CronSchedule) -> Self {
        Self {
            enabled: schedule.enabled,
            schedule: schedule.expression.clone(),
        }
    }
}

/// GET /ping-stats: read-only aggregate over history and config.
pub async fn ping_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PingStatsQuery>,
) -> Result<Json<PingStats>, ApiError> {
    let limit = query.limit.unwrap_or(state.history.limit());
    let recent_history = state
        .history
        .recent(limit)
        .map_err(|e| internal("DATABASE_ERROR", e))?;
    let last_interval_reset = state
        .history
        .last_interval_reset()
        .map_err(|e| internal("DATABASE_ERROR", e))?;
    let config = state
        .settings
        .scheduler_config()
        .map_err(|e| internal("CONFIG_ERROR", e))?;
    let jobs = state
        .jobs
        .list_jobs()
        .map_err(|e| internal("DATABASE_ERROR", e))?;

    let active = state.reconciler.active_source(&ReconcileInput {
        config: &config,
        jobs: &jobs,
    });
    let last_ping = recent_history.first().map(|e| e.timestamp);

    Ok(Json(PingStats {
        last_ping,
        next_ping: last_ping.map(|ts| ts + active.interval_seconds as i64 * 1000),
        recent_history,
        last_interval_reset,
        github_action: GithubAction::from(&config.ci_schedule),
        interval_seconds: config.interval_seconds(),
    }))
}
