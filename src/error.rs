//! Error types for the continuation manager and task scheduler.

use crate::types::ContinuationId;
use thiserror::Error;

/// Scheduler-related errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown pool: {0}")]
    UnknownPool(String),

    #[error("Pool '{0}' is saturated")]
    PoolSaturated(String),

    #[error("Scheduler is shut down")]
    ShutDown,

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Registry-facing errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Continuation not found: {0}")]
    NotFound(ContinuationId),

    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    #[error("Session-bound continuations require a session id")]
    SessionRequired,

    #[error("Could not install expiration sweep: {0}")]
    SchedulingFailure(SchedulerError),

    #[error("Disposer for continuation {id} failed: {reason}")]
    DisposerFailure { id: ContinuationId, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl ApiError {
    /// True for misses the caller is expected to treat as "continuation expired".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
