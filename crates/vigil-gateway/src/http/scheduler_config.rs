//! Operator-owned scheduler config: GET/POST /scheduler-config.
//!
//! A POST that changes `refreshIntervalMs` resets the drift window, cancels
//! every outstanding lineage and starts a fresh one on the new interval.
//! The `localJobSchedule` is mirrored onto the `default` local job.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};
use vigil_core::{now_ms, EventSource, SchedulerConfig};

use super::local_jobs::job_error;
use super::{bad_request, internal, ApiError};
use crate::app::{AppState, DEFAULT_JOB_NAME};

/// Shortest interval an operator may configure.
const MIN_REFRESH_INTERVAL_MS: u64 = 1_000;

/// GET /scheduler-config
pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SchedulerConfig>, ApiError> {
    state
        .settings
        .scheduler_config()
        .map(Json)
        .map_err(|e| internal("CONFIG_ERROR", e))
}

/// POST /scheduler-config
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(config): Json<SchedulerConfig>,
) -> Result<Json<Value>, ApiError> {
    if config.refresh_interval_ms < MIN_REFRESH_INTERVAL_MS {
        return Err(bad_request(format!(
            "refreshIntervalMs must be at least {MIN_REFRESH_INTERVAL_MS}"
        )));
    }

    // an unsupported localJobSchedule is rejected here, before anything is stored
    sync_default_job(&state, &config)?;

    let previous = state
        .settings
        .put_scheduler_config(&config)
        .map_err(|e| internal("DATABASE_ERROR", e))?;

    let interval_changed =
        previous.map_or(true, |p| p.refresh_interval_ms != config.refresh_interval_ms);
    if interval_changed {
        let at = now_ms();
        state
            .history
            .mark_interval_reset(at)
            .map_err(|e| internal("DATABASE_ERROR", e))?;
        info!(
            refresh_interval_ms = config.refresh_interval_ms,
            "refresh interval changed, restarting cycle"
        );
        // start() cancels older lineages before running the new one
        let controller = Arc::clone(&state.controller);
        tokio::spawn(async move {
            if let Err(e) = controller.start(EventSource::SelfTrigger).await {
                error!(error = %e, "restart after interval change failed");
            }
        });
    }

    Ok(Json(json!({
        "config": config,
        "intervalChanged": interval_changed,
    })))
}

fn sync_default_job(state: &AppState, config: &SchedulerConfig) -> Result<(), ApiError> {
    let schedule = &config.local_job_schedule;
    if schedule.enabled {
        state
            .jobs
            .ensure_job(DEFAULT_JOB_NAME, &schedule.expression)
            .map_err(job_error)?;
        return Ok(());
    }
    let jobs = state.jobs.list_jobs().map_err(job_error)?;
    if let Some(job) = jobs
        .iter()
        .find(|j| j.name == DEFAULT_JOB_NAME && j.is_running())
    {
        state
            .jobs
            .stop_job(&job.id)
            .map_err(job_error)?;
    }
    Ok(())
}
