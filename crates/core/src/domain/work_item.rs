// Work Item Domain Model

use super::error::{DomainError, Result};
use std::fmt;

/// Opaque, non-empty identifier of a unit of work.
///
/// The queue never interprets the value; the caller resolves it to the real
/// work item elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItemId(String);

impl WorkItemId {
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::InvalidWorkItemId(
                "work item id must not be empty".to_string(),
            ));
        }
        // PostgreSQL text cannot hold NUL
        if value.contains('\0') {
            return Err(DomainError::InvalidWorkItemId(
                "work item id must not contain NUL characters".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Outcome of a dequeue that was not cancelled and did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeued {
    /// A message arrived within the wait window
    Received(WorkItemId),
    /// The wait window elapsed with nothing available
    Empty,
}

impl Dequeued {
    pub fn is_empty(&self) -> bool {
        matches!(self, Dequeued::Empty)
    }

    pub fn into_option(self) -> Option<WorkItemId> {
        match self {
            Dequeued::Received(id) => Some(id),
            Dequeued::Empty => None,
        }
    }
}
