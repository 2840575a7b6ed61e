// Domain Layer - Queue identities and work item values

pub mod error;
pub mod queue;
pub mod work_item;

// Re-exports
pub use error::DomainError;
pub use queue::{BrokerAddress, QueueType};
pub use work_item::{Dequeued, WorkItemId};
