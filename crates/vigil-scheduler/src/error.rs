use thiserror::Error;

/// Errors that can occur within the local-job runner.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The expression is not one the runner can execute.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// Another thread panicked while holding the connection.
    #[error("connection lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
