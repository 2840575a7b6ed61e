// SQL statements used by the provider and migrator

use brokerq_core::domain::queue::validate_queue_name;
use brokerq_core::error::Result;

/// Placeholder substituted with the queue name in per-queue statements
pub const QUEUE_NAME_PLACEHOLDER: &str = "{queueName}";

/// Send one message; binds initiator, target, contract, message type, body
pub const SEND_MESSAGE: &str = include_str!("../sql/send.sql");

const RECEIVE_TEMPLATE: &str = include_str!("../sql/receive.sql");
const CREATE_QUEUE_TEMPLATE: &str = include_str!("../sql/create_queue.sql");

// Catalog provisioning (idempotent)
pub const INSERT_MESSAGE_TYPE: &str =
    "INSERT INTO brokerq.message_types (message_type) VALUES ($1) ON CONFLICT DO NOTHING";
pub const INSERT_CONTRACT: &str =
    "INSERT INTO brokerq.contracts (contract_name, message_type) VALUES ($1, $2) ON CONFLICT DO NOTHING";
pub const INSERT_QUEUE: &str =
    "INSERT INTO brokerq.queues (queue_name) VALUES ($1) ON CONFLICT DO NOTHING";
// Services follow their address: a rebound service moves to the new queue and contract
pub const UPSERT_INITIATOR_SERVICE: &str =
    "INSERT INTO brokerq.services (service_name, queue_name, contract_name) VALUES ($1, $2, NULL) \
     ON CONFLICT (service_name) DO UPDATE SET queue_name = EXCLUDED.queue_name, contract_name = EXCLUDED.contract_name \
     WHERE (services.queue_name, services.contract_name) IS DISTINCT FROM (EXCLUDED.queue_name, EXCLUDED.contract_name)";
pub const UPSERT_TARGET_SERVICE: &str =
    "INSERT INTO brokerq.services (service_name, queue_name, contract_name) VALUES ($1, $2, $3) \
     ON CONFLICT (service_name) DO UPDATE SET queue_name = EXCLUDED.queue_name, contract_name = EXCLUDED.contract_name \
     WHERE (services.queue_name, services.contract_name) IS DISTINCT FROM (EXCLUDED.queue_name, EXCLUDED.contract_name)";

// Schema versioning
pub const SCHEMA_VERSION_TABLE: &str = "SELECT to_regclass('brokerq.schema_version')::TEXT";
pub const CURRENT_SCHEMA_VERSION: &str =
    "SELECT COALESCE(MAX(version), 0)::TEXT FROM brokerq.schema_version";
pub const RECORD_SCHEMA_VERSION: &str =
    "INSERT INTO brokerq.schema_version (version, description) VALUES ($1, $2)";
/// Serializes concurrent migrators for the rest of the transaction
pub const MIGRATION_LOCK: &str = "SELECT pg_advisory_xact_lock($1)";
pub const MIGRATION_LOCK_KEY: i64 = 0x6272_6f6b_6572_71; // "brokerq"

// Database bootstrap
pub const DATABASE_EXISTS: &str = "SELECT datname::TEXT FROM pg_database WHERE datname = $1";

/// A versioned schema script
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Applied in order; never edit a released entry, append a new one
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "broker catalog",
        sql: include_str!("../migrations/001_broker_catalog.sql"),
    },
    Migration {
        version: 2,
        description: "send_message function",
        sql: include_str!("../migrations/002_send_message.sql"),
    },
];

/// Receive statement for `queue_name`
pub fn receive_for(queue_name: &str) -> Result<String> {
    render(RECEIVE_TEMPLATE, queue_name)
}

/// Queue table DDL for `queue_name`
pub fn create_queue_for(queue_name: &str) -> Result<String> {
    render(CREATE_QUEUE_TEMPLATE, queue_name)
}

// Queue names are spliced into SQL text, so only validated identifiers get through
fn render(template: &str, queue_name: &str) -> Result<String> {
    validate_queue_name(queue_name)?;
    Ok(template.replace(QUEUE_NAME_PLACEHOLDER, queue_name))
}

/// Quote an identifier for statements that cannot take binds
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
