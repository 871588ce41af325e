use thiserror::Error;

#[derive(Debug, Error)]
pub enum VigilError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Check execution failed: {0}")]
    Check(String),

    #[error("Continuation dispatch failed: {0}")]
    Dispatch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VigilError {
    /// Short error code string sent to clients in `{error, message}` bodies.
    pub fn code(&self) -> &'static str {
        match self {
            VigilError::Config(_) => "CONFIG_ERROR",
            VigilError::Database(_) => "DATABASE_ERROR",
            VigilError::InvalidRequest(_) => "INVALID_REQUEST",
            VigilError::Check(_) => "CHECK_FAILED",
            VigilError::Dispatch(_) => "DISPATCH_FAILED",
            VigilError::Serialization(_) => "SERIALIZATION_ERROR",
            VigilError::Io(_) => "IO_ERROR",
            VigilError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, VigilError>;
