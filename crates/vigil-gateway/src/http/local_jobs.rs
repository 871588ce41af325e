//! Local recurring-job runner: /local-jobs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use vigil_scheduler::{LocalJob, SchedulerError};

use super::{api_error, bad_request, internal, ApiError};
use crate::app::AppState;

#[derive(Deserialize)]
pub struct NewJob {
    pub name: String,
    pub expression: String,
}

/// Map a job-store failure to its HTTP status.
pub(crate) fn job_error(err: SchedulerError) -> ApiError {
    match &err {
        SchedulerError::JobNotFound { .. } => api_error(StatusCode::NOT_FOUND, "JOB_NOT_FOUND", &err),
        SchedulerError::InvalidSchedule(_) => bad_request(&err),
        // the UNIQUE name constraint
        SchedulerError::Database(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            api_error(StatusCode::CONFLICT, "JOB_EXISTS", &err)
        }
        _ => internal("DATABASE_ERROR", &err),
    }
}

/// GET /local-jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<LocalJob>>, ApiError> {
    state.jobs.list_jobs().map(Json).map_err(job_error)
}

/// POST /local-jobs: add a running job.
pub async fn add_job(
    State(state): State<Arc<AppState>>,
    Json(job): Json<NewJob>,
) -> Result<(StatusCode, Json<LocalJob>), ApiError> {
    if job.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    let created = state
        .jobs
        .add_job(job.name.trim(), &job.expression)
        .map_err(job_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /local-jobs/{id}/start
pub async fn start_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LocalJob>, ApiError> {
    state.jobs.start_job(&id).map(Json).map_err(job_error)
}

/// POST /local-jobs/{id}/stop
pub async fn stop_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LocalJob>, ApiError> {
    state.jobs.stop_job(&id).map(Json).map_err(job_error)
}

/// DELETE /local-jobs/{id}
pub async fn remove_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.jobs.remove_job(&id).map_err(job_error)?;
    Ok(Json(json!({"removed": id})))
}
