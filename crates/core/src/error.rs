// Central Error Type for the Queue Client

use crate::domain::DomainError;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Caller passed a value that can never be queued (e.g. an empty id)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing or malformed broker configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database or broker object creation failed during start
    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    /// Connectivity or statement failure while talking to the broker
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Dequeue aborted through its cancellation token
    #[error("Dequeue cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for failures a caller may retry later (connectivity, timeouts)
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::QueueUnavailable(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Validation failures on ids are the caller's fault; everything else in the
// domain layer is broker configuration.
impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidWorkItemId(_) => AppError::InvalidArgument(err.to_string()),
            DomainError::InvalidBrokerAddress(_)
            | DomainError::UnknownQueueType(_)
            | DomainError::QueueNotRegistered(_) => AppError::Config(err.to_string()),
        }
    }
}
