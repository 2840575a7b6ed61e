// Queue Domain Model

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a broker identity (service, contract, message type)
pub const MAX_BROKER_NAME_LEN: usize = 256;

/// Maximum length of a physical queue name (PostgreSQL NAMEDATALEN - 1)
pub const MAX_QUEUE_NAME_LEN: usize = 63;

/// Logical queue a work item is routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    Workflow,
    Event,
    Index,
}

impl QueueType {
    pub const ALL: [QueueType; 3] = [QueueType::Workflow, QueueType::Event, QueueType::Index];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueType::Workflow => "workflow",
            QueueType::Event => "event",
            QueueType::Index => "index",
        }
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "workflow" => Ok(QueueType::Workflow),
            "event" => Ok(QueueType::Event),
            "index" => Ok(QueueType::Index),
            other => Err(DomainError::UnknownQueueType(other.to_string())),
        }
    }
}

/// Broker identities addressing one logical queue.
///
/// `queue_name` is the only field that ever ends up inside statement text
/// (table name and notification channel), so it is restricted to a plain
/// lowercase SQL identifier. The other four travel as bound parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBrokerAddress")]
pub struct BrokerAddress {
    initiator_service: String,
    target_service: String,
    contract_name: String,
    msg_type: String,
    queue_name: String,
}

impl BrokerAddress {
    pub fn new(
        initiator_service: impl Into<String>,
        target_service: impl Into<String>,
        contract_name: impl Into<String>,
        msg_type: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Result<Self> {
        let address = Self {
            initiator_service: initiator_service.into(),
            target_service: target_service.into(),
            contract_name: contract_name.into(),
            msg_type: msg_type.into(),
            queue_name: queue_name.into(),
        };
        address.validate()?;
        Ok(address)
    }

    pub fn initiator_service(&self) -> &str {
        &self.initiator_service
    }

    pub fn target_service(&self) -> &str {
        &self.target_service
    }

    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("initiator_service", &self.initiator_service),
            ("target_service", &self.target_service),
            ("contract_name", &self.contract_name),
            ("msg_type", &self.msg_type),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::InvalidBrokerAddress(format!(
                    "{} must not be empty",
                    field
                )));
            }
            if value.len() > MAX_BROKER_NAME_LEN {
                return Err(DomainError::InvalidBrokerAddress(format!(
                    "{} too long ({} > {} bytes)",
                    field,
                    value.len(),
                    MAX_BROKER_NAME_LEN
                )));
            }
        }

        if self.initiator_service == self.target_service {
            return Err(DomainError::InvalidBrokerAddress(format!(
                "initiator and target service are both '{}'",
                self.target_service
            )));
        }

        validate_queue_name(&self.queue_name)
    }
}

/// Check that a queue name is safe to splice into SQL as a bare identifier
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DomainError::InvalidBrokerAddress(
            "queue_name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(DomainError::InvalidBrokerAddress(format!(
            "queue_name '{}' too long ({} > {} bytes)",
            name,
            name.len(),
            MAX_QUEUE_NAME_LEN
        )));
    }

    let mut bytes = name.bytes();
    let first_ok = bytes
        .next()
        .map(|b| b.is_ascii_lowercase() || b == b'_')
        .unwrap_or(false);
    if !first_ok || !bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_') {
        return Err(DomainError::InvalidBrokerAddress(format!(
            "queue_name '{}' must match [a-z_][a-z0-9_]*",
            name
        )));
    }

    Ok(())
}

#[derive(Deserialize)]
struct RawBrokerAddress {
    initiator_service: String,
    target_service: String,
    contract_name: String,
    msg_type: String,
    queue_name: String,
}

impl TryFrom<RawBrokerAddress> for BrokerAddress {
    type Error = DomainError;

    fn try_from(raw: RawBrokerAddress) -> Result<Self> {
        BrokerAddress::new(
            raw.initiator_service,
            raw.target_service,
            raw.contract_name,
            raw.msg_type,
            raw.queue_name,
        )
    }
}
