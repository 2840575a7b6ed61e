// Port Layer - Interfaces for external collaborators

pub mod broker_names;
pub mod migrator;
pub mod queue_provider;
pub mod work_item_handler;

// Re-exports
pub use broker_names::{BrokerNames, StaticBrokerNames};
pub use migrator::Migrator;
pub use queue_provider::QueueProvider;
pub use work_item_handler::WorkItemHandler;
