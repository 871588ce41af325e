pub mod check_runner;
pub mod health;
pub mod local_jobs;
pub mod monitor;
pub mod ping_cycle;
pub mod ping_stats;
pub mod scheduler_config;
pub mod scheduler_control;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::error;

/// Error half of every handler: a status and an `{error, message}` body.
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, code: &str, message: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(json!({"error": code, "message": message.to_string()})),
    )
}

pub fn bad_request(message: impl std::fmt::Display) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
}

/// Log and wrap an unexpected failure as HTTP 500.
pub fn internal(code: &str, err: impl std::fmt::Display) -> ApiError {
    error!(%code, error = %err, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, code, err)
}
