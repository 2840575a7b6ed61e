// brokerq Infrastructure - PostgreSQL Adapter
// Implements: QueueProvider, Migrator

mod config;
mod connection;
mod error;
mod executor;
mod migration;
mod queue_provider;
mod statements;

pub use config::{ProviderOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WAIT_WINDOW};
pub use connection::ConnectionFactory;
pub use executor::{SqlCommand, SqlCommandExecutor};
pub use migration::PostgresMigrator;
pub use queue_provider::PostgresQueueProvider;

// Note: sqlx::Error conversion is handled by helper functions in `error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
