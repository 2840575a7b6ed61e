//! Shared setup for tests that need a live PostgreSQL server

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection};

use brokerq_core::port::{BrokerNames, StaticBrokerNames};
use brokerq_infra_postgres::{PostgresQueueProvider, ProviderOptions};

pub const TEST_DATABASE_URL_VAR: &str = "BROKERQ_TEST_DATABASE_URL";

static HOST_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Connection string of the test server, or None to skip
pub fn test_database_url() -> Option<String> {
    match std::env::var(TEST_DATABASE_URL_VAR) {
        Ok(url) if !url.trim().is_empty() => Some(url),
        _ => {
            eprintln!("{} not set, skipping database test", TEST_DATABASE_URL_VAR);
            None
        }
    }
}

/// Host name no other test (or earlier run) has used, so queues start empty
pub fn unique_host(tag: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!(
        "it_{}_{}_{}_{}",
        tag,
        std::process::id(),
        nanos,
        HOST_COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

pub fn names_for(host: &str) -> Arc<dyn BrokerNames> {
    Arc::new(StaticBrokerNames::for_host(host).unwrap())
}

pub fn options(url: &str, wait_window: Duration) -> ProviderOptions {
    ProviderOptions::new(url)
        .with_migrate_database(true)
        .with_wait_window(wait_window)
}

/// Provider for a fresh host, started (schema migrated and queues provisioned)
pub async fn started_provider(url: &str, tag: &str, wait_window: Duration) -> PostgresQueueProvider {
    use brokerq_core::port::QueueProvider;

    let host = unique_host(tag);
    let provider =
        PostgresQueueProvider::with_defaults(options(url, wait_window), names_for(&host)).unwrap();
    provider.start().await.unwrap();
    provider
}

/// Same server and credentials as `url`, pointed at another database
pub fn url_for_database(url: &str, database: &str) -> String {
    let options: PgConnectOptions = url.parse().unwrap();
    options.database(database).to_url_lossy().to_string()
}

/// Drop a database a test created, connecting through `url`
pub async fn drop_database(url: &str, database: &str) {
    let mut conn = sqlx::PgConnection::connect(url).await.unwrap();
    let ddl = format!("DROP DATABASE IF EXISTS \"{}\"", database);
    sqlx::raw_sql(&ddl).execute(&mut conn).await.unwrap();
    conn.close().await.unwrap();
}
