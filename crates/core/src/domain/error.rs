// Domain Error Types

use super::QueueType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid work item id: {0}")]
    InvalidWorkItemId(String),

    #[error("Invalid broker address: {0}")]
    InvalidBrokerAddress(String),

    #[error("Unknown queue type: {0}")]
    UnknownQueueType(String),

    #[error("No broker address registered for queue type {0}")]
    QueueNotRegistered(QueueType),
}

pub type Result<T> = std::result::Result<T, DomainError>;
