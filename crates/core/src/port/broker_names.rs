// Broker Name Source Port

use crate::domain::{BrokerAddress, DomainError, QueueType};
use crate::error::Result;
use std::collections::{BTreeMap, HashMap};

/// Resolves a logical queue type to the broker identities that address it
pub trait BrokerNames: Send + Sync {
    /// Look up the address for `queue`
    ///
    /// # Errors
    /// `AppError::Config` if nothing was registered for `queue`
    fn get_by_queue(&self, queue: QueueType) -> Result<BrokerAddress>;

    /// Every registered (queue type, address) pair, used for provisioning
    fn registered(&self) -> Vec<(QueueType, BrokerAddress)>;
}

/// Fixed table of broker addresses built at startup
#[derive(Debug, Clone, Default)]
pub struct StaticBrokerNames {
    addresses: BTreeMap<QueueType, BrokerAddress>,
}

impl StaticBrokerNames {
    /// Names for the Workflow and Event queues of one host.
    ///
    /// `host` becomes part of every identity so several deployments can
    /// share a database without sharing queues.
    pub fn for_host(host: &str) -> Result<Self> {
        let mut names = Self::default();
        for queue in [QueueType::Workflow, QueueType::Event] {
            names = names.with_address(queue, default_address(host, queue)?);
        }
        Ok(names)
    }

    pub fn from_addresses(addresses: impl IntoIterator<Item = (QueueType, BrokerAddress)>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    /// Register or replace the address for one queue type
    pub fn with_address(mut self, queue: QueueType, address: BrokerAddress) -> Self {
        self.addresses.insert(queue, address);
        self
    }
}

impl BrokerNames for StaticBrokerNames {
    fn get_by_queue(&self, queue: QueueType) -> Result<BrokerAddress> {
        self.addresses
            .get(&queue)
            .cloned()
            .ok_or_else(|| DomainError::QueueNotRegistered(queue).into())
    }

    fn registered(&self) -> Vec<(QueueType, BrokerAddress)> {
        self.addresses
            .iter()
            .map(|(queue, address)| (*queue, address.clone()))
            .collect()
    }
}

/// Derive the default address of `queue` for `host`
pub fn default_address(host: &str, queue: QueueType) -> Result<BrokerAddress> {
    let host = sanitize_host(host);
    let prefix = format!("//brokerq/{}/{}", host, queue);

    let address = BrokerAddress::new(
        format!("{}/initiator", prefix),
        format!("{}/target", prefix),
        format!("{}/contract", prefix),
        format!("{}/message", prefix),
        format!("{}_{}_queue", host, queue),
    )?;
    Ok(address)
}

/// Check that no two queue types share a queue or a service.
///
/// The catalog binds every service to exactly one queue, so a shared
/// service (or shared target/contract pair) would route one type's
/// messages into another type's queue.
///
/// # Errors
/// `AppError::Config` naming the first collision found
pub fn ensure_distinct_routes(addresses: &[(QueueType, BrokerAddress)]) -> Result<()> {
    let mut queues: HashMap<&str, QueueType> = HashMap::new();
    let mut services: HashMap<&str, QueueType> = HashMap::new();

    for (queue, address) in addresses {
        if let Some(owner) = queues.insert(address.queue_name(), *queue) {
            return Err(DomainError::InvalidBrokerAddress(format!(
                "queue {} is used by both {} and {}",
                address.queue_name(),
                owner,
                queue
            ))
            .into());
        }
        for service in [address.initiator_service(), address.target_service()] {
            match services.insert(service, *queue) {
                Some(owner) if owner != *queue => {
                    return Err(DomainError::InvalidBrokerAddress(format!(
                        "service {} is used by both {} and {}",
                        service, owner, queue
                    ))
                    .into());
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn sanitize_host(host: &str) -> String {
    let cleaned: String = host
        .trim()
        .to_ascii_lowercase()
        .bytes()
        .map(|b| {
            if b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' {
                b as char
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.as_bytes().first() {
        None => "default".to_string(),
        Some(b) if b.is_ascii_digit() => format!("h{}", cleaned),
        Some(_) => cleaned,
    }
}
