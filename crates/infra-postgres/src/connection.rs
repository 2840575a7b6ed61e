// PostgreSQL Connection Setup

use crate::config::ProviderOptions;
use brokerq_core::error::{AppError, Result};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgListener, PgPool, PgPoolOptions};
use sqlx::{ConnectOptions, Connection};
use std::io;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Database used for administrative connections (CREATE DATABASE)
pub const MAINTENANCE_DATABASE: &str = "postgres";

/// Opens short-lived connections for one database.
///
/// The connection string is parsed once; every operation opens its own
/// connection and closes it before returning.
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    options: PgConnectOptions,
    connect_timeout: Duration,
}

impl ConnectionFactory {
    pub fn new(options: &ProviderOptions) -> Result<Self> {
        options.validate()?;
        let parsed = PgConnectOptions::from_str(&options.connection_string)
            .map_err(|e| AppError::Config(format!("Invalid connection string: {}", e)))?
            .application_name(&options.application_name);

        Ok(Self {
            options: parsed,
            connect_timeout: options.connect_timeout,
        })
    }

    /// Target database (falls back to the user name, like libpq)
    pub fn database_name(&self) -> String {
        self.options
            .get_database()
            .unwrap_or_else(|| self.options.get_username())
            .to_string()
    }

    /// Same server and credentials, different database
    pub fn for_database(&self, database: &str) -> Self {
        Self {
            options: self.options.clone().database(database),
            connect_timeout: self.connect_timeout,
        }
    }

    /// Open a single connection within the connect timeout
    pub async fn open(&self) -> std::result::Result<PgConnection, sqlx::Error> {
        match tokio::time::timeout(self.connect_timeout, self.options.connect()).await {
            Ok(result) => result,
            Err(_) => Err(timed_out(self.connect_timeout)),
        }
    }

    /// Open a listener backed by a dedicated single-connection pool.
    ///
    /// The pool only exists so the listener can reconnect; it never hands
    /// out more than the one connection.
    pub async fn open_listener(&self) -> std::result::Result<ListenerSession, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(self.connect_timeout)
            .connect_with(self.options.clone())
            .await?;

        match PgListener::connect_with(&pool).await {
            Ok(listener) => Ok(ListenerSession {
                pool,
                listener: Some(listener),
            }),
            Err(e) => {
                pool.close().await;
                Err(e)
            }
        }
    }
}

/// Listener plus the pool that owns its connection
pub struct ListenerSession {
    pool: PgPool,
    listener: Option<PgListener>,
}

impl ListenerSession {
    pub fn listener(&mut self) -> std::result::Result<&mut PgListener, sqlx::Error> {
        self.listener.as_mut().ok_or(sqlx::Error::PoolClosed)
    }

    /// Release the listener's connection and shut the pool down
    pub async fn close(mut self) {
        // Dropping the listener hands its connection back to the pool
        drop(self.listener.take());
        self.pool.close().await;
    }
}

/// Close a connection, logging rather than failing on errors
pub async fn close_connection(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close database connection");
    }
}

fn timed_out(after: Duration) -> sqlx::Error {
    sqlx::Error::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("connection not established within {:?}", after),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_connection_string_is_config_error() {
        let options = ProviderOptions::new("not a url at all://");
        let err = ConnectionFactory::new(&options).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_database_name_from_url() {
        let options = ProviderOptions::new("postgres://alice@localhost:5432/orders");
        let factory = ConnectionFactory::new(&options).unwrap();
        assert_eq!(factory.database_name(), "orders");
    }

    #[test]
    fn test_database_name_defaults_to_user() {
        let options = ProviderOptions::new("postgres://alice@localhost:5432");
        let factory = ConnectionFactory::new(&options).unwrap();
        assert_eq!(factory.database_name(), "alice");
    }

    #[test]
    fn test_for_database_switches_database() {
        let options = ProviderOptions::new("postgres://alice@localhost:5432/orders");
        let factory = ConnectionFactory::new(&options).unwrap();
        let admin = factory.for_database(MAINTENANCE_DATABASE);
        assert_eq!(admin.database_name(), MAINTENANCE_DATABASE);
        assert_eq!(factory.database_name(), "orders");
    }

    #[tokio::test]
    async fn test_open_unreachable_server_fails() {
        let options = ProviderOptions::new("postgres://nobody@127.0.0.1:1/none")
            .with_connect_timeout(Duration::from_secs(2));
        let factory = ConnectionFactory::new(&options).unwrap();
        assert!(factory.open().await.is_err());
    }
}
