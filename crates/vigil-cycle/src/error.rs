use thiserror::Error;
use vigil_store::StoreError;

/// Errors raised while running or continuing a cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The check executor failed or returned garbage.
    #[error("check failed: {0}")]
    Check(String),

    /// The scheduler config could not be read.
    #[error("config unavailable: {0}")]
    Config(String),

    /// History or marker persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A continuation could not be handed to the dispatcher.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// A failed cycle could not even schedule its recovery; the chain is dead.
    #[error("recovery for cycle {cycle_id} could not be scheduled: {reason}")]
    RecoveryDispatch { cycle_id: String, reason: String },
}

impl CycleError {
    /// Short error code string sent to clients in `{error, message}` bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CycleError::Check(_) => "CHECK_FAILED",
            CycleError::Config(_) => "CONFIG_UNAVAILABLE",
            CycleError::Store(_) => "STORE_ERROR",
            CycleError::Dispatch(_) => "DISPATCH_FAILED",
            CycleError::RecoveryDispatch { .. } => "RECOVERY_DISPATCH_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, CycleError>;
