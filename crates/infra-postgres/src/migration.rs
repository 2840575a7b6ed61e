// Broker Migrator
// Creates the database, applies versioned schema scripts and provisions one
// queue per registered broker address

use crate::connection::{close_connection, ConnectionFactory, MAINTENANCE_DATABASE};
use crate::error::{map_bootstrap_error, sqlstate};
use crate::executor::SqlCommandExecutor;
use crate::statements::{self, MIGRATIONS};
use async_trait::async_trait;
use brokerq_core::domain::BrokerAddress;
use brokerq_core::error::Result;
use brokerq_core::port::broker_names::ensure_distinct_routes;
use brokerq_core::port::{BrokerNames, Migrator};
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use std::sync::Arc;
use tracing::{debug, info};

/// SQLSTATE duplicate_database
const DUPLICATE_DATABASE: &str = "42P04";
/// SQLSTATE unique_violation, raised on pg_database_datname_index when two
/// CREATE DATABASE statements for the same name overlap
const UNIQUE_VIOLATION: &str = "23505";

pub struct PostgresMigrator {
    connections: ConnectionFactory,
    names: Arc<dyn BrokerNames>,
    executor: SqlCommandExecutor,
}

impl PostgresMigrator {
    pub fn new(
        connections: ConnectionFactory,
        names: Arc<dyn BrokerNames>,
        executor: SqlCommandExecutor,
    ) -> Self {
        Self {
            connections,
            names,
            executor,
        }
    }

    async fn create_database_on(
        &self,
        conn: &mut PgConnection,
        database: &str,
    ) -> std::result::Result<bool, sqlx::Error> {
        let existing = self
            .executor
            .create_command(&mut *conn, statements::DATABASE_EXISTS)
            .bind(database)
            .execute_scalar()
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        // CREATE DATABASE takes no binds and refuses to run inside a transaction
        let ddl = format!(
            "CREATE DATABASE {}",
            statements::quote_identifier(database)
        );
        match self.executor.run_script(&mut *conn, &ddl).await {
            Ok(_) => Ok(true),
            Err(e) if lost_create_race(sqlstate(&e).as_deref()) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn migrate_on(
        &self,
        conn: &mut PgConnection,
        queues: &[QueueDdl],
    ) -> std::result::Result<(), sqlx::Error> {
        let mut tx = conn.begin().await?;

        self.executor
            .create_command(&mut *tx, statements::MIGRATION_LOCK)
            .bind(statements::MIGRATION_LOCK_KEY)
            .execute_non_query()
            .await?;

        let has_version_table = self
            .executor
            .create_command(&mut *tx, statements::SCHEMA_VERSION_TABLE)
            .execute_scalar()
            .await?
            .is_some();

        let current_version = if has_version_table {
            let raw = self
                .executor
                .create_command(&mut *tx, statements::CURRENT_SCHEMA_VERSION)
                .execute_scalar()
                .await?;
            parse_schema_version(raw)?
        } else {
            0
        };
        info!("Current broker schema version: {}", current_version);

        for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
            info!(
                "Applying migration {:03}: {}",
                migration.version, migration.description
            );
            self.executor.run_script(&mut *tx, migration.sql).await?;
            self.executor
                .create_command(&mut *tx, statements::RECORD_SCHEMA_VERSION)
                .bind(migration.version)
                .bind(migration.description)
                .execute_non_query()
                .await?;
        }

        for queue in queues {
            let changed = self.provision(&mut *tx, queue).await?;
            debug!(
                queue_name = %queue.address.queue_name(),
                changed_rows = changed,
                "Provisioned broker objects"
            );
        }

        tx.commit().await?;
        Ok(())
    }

    /// Idempotently create the catalog rows and queue table of one address.
    ///
    /// Services already bound to another queue or contract are rebound to
    /// this address.
    async fn provision(
        &self,
        conn: &mut PgConnection,
        queue: &QueueDdl,
    ) -> std::result::Result<u64, sqlx::Error> {
        let address = &queue.address;
        let mut changed = 0;

        changed += self
            .executor
            .create_command(&mut *conn, statements::INSERT_MESSAGE_TYPE)
            .bind(address.msg_type())
            .execute_non_query()
            .await?;
        changed += self
            .executor
            .create_command(&mut *conn, statements::INSERT_CONTRACT)
            .bind(address.contract_name())
            .bind(address.msg_type())
            .execute_non_query()
            .await?;
        changed += self
            .executor
            .create_command(&mut *conn, statements::INSERT_QUEUE)
            .bind(address.queue_name())
            .execute_non_query()
            .await?;

        self.executor.run_script(&mut *conn, &queue.create_table).await?;

        // Both ends share the queue; only the target accepts the contract
        changed += self
            .executor
            .create_command(&mut *conn, statements::UPSERT_INITIATOR_SERVICE)
            .bind(address.initiator_service())
            .bind(address.queue_name())
            .execute_non_query()
            .await?;
        changed += self
            .executor
            .create_command(&mut *conn, statements::UPSERT_TARGET_SERVICE)
            .bind(address.target_service())
            .bind(address.queue_name())
            .bind(address.contract_name())
            .execute_non_query()
            .await?;

        Ok(changed)
    }
}

/// Another session created the database between our existence check and
/// our CREATE DATABASE
fn lost_create_race(code: Option<&str>) -> bool {
    matches!(code, Some(DUPLICATE_DATABASE) | Some(UNIQUE_VIOLATION))
}

fn parse_schema_version(raw: Option<String>) -> std::result::Result<i32, sqlx::Error> {
    match raw {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| sqlx::Error::Decode(Box::new(e))),
    }
}

struct QueueDdl {
    address: BrokerAddress,
    create_table: String,
}

#[async_trait]
impl Migrator for PostgresMigrator {
    async fn create_database(&self) -> Result<()> {
        let database = self.connections.database_name();
        info!(database = %database, "Ensuring database exists");

        let admin = self.connections.for_database(MAINTENANCE_DATABASE);
        let mut conn = admin.open().await.map_err(map_bootstrap_error)?;
        let result = self.create_database_on(&mut conn, &database).await;
        close_connection(conn).await;

        if result.map_err(map_bootstrap_error)? {
            info!(database = %database, "Database created");
        } else {
            debug!(database = %database, "Database already exists");
        }
        Ok(())
    }

    async fn migrate_schema(&self) -> Result<()> {
        // Validate and render DDL before connecting so bad names fail fast
        let registered = self.names.registered();
        ensure_distinct_routes(&registered)?;
        let queues = registered
            .into_iter()
            .map(|(_, address)| -> Result<QueueDdl> {
                let create_table = statements::create_queue_for(address.queue_name())?;
                Ok(QueueDdl {
                    address,
                    create_table,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(queues = queues.len(), "Migrating broker schema");

        let mut conn = self.connections.open().await.map_err(map_bootstrap_error)?;
        let result = self.migrate_on(&mut conn, &queues).await;
        close_connection(conn).await;
        result.map_err(map_bootstrap_error)?;

        info!("Broker schema up to date");
        Ok(())
    }
}
