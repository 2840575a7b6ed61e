// PostgreSQL Queue Provider
// Send through brokerq.send_message, receive with DELETE ... SKIP LOCKED and
// wait for pg_notify wake-ups between attempts

use crate::config::ProviderOptions;
use crate::connection::{close_connection, ConnectionFactory, ListenerSession};
use crate::error::map_queue_error;
use crate::executor::SqlCommandExecutor;
use crate::migration::PostgresMigrator;
use crate::statements;
use async_trait::async_trait;
use brokerq_core::cancellation::CancellationToken;
use brokerq_core::domain::{BrokerAddress, Dequeued, DomainError, QueueType, WorkItemId};
use brokerq_core::error::{AppError, Result};
use brokerq_core::port::broker_names::ensure_distinct_routes;
use brokerq_core::port::{BrokerNames, Migrator, QueueProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Resolved address of one queue type plus its rendered receive statement
struct Channel {
    address: BrokerAddress,
    receive_sql: String,
}

pub struct PostgresQueueProvider {
    options: ProviderOptions,
    connections: ConnectionFactory,
    channels: HashMap<QueueType, Channel>,
    migrator: Arc<dyn Migrator>,
    executor: SqlCommandExecutor,
}

impl PostgresQueueProvider {
    /// Build a provider; queue addresses are resolved here, once.
    ///
    /// Queue types without an address are skipped and fail with
    /// `AppError::Config` when used.
    pub fn new(
        options: ProviderOptions,
        names: Arc<dyn BrokerNames>,
        migrator: Arc<dyn Migrator>,
        executor: SqlCommandExecutor,
    ) -> Result<Self> {
        let connections = ConnectionFactory::new(&options)?;

        let mut resolved = Vec::new();
        for queue in QueueType::ALL {
            match names.get_by_queue(queue) {
                Ok(address) => resolved.push((queue, address)),
                Err(AppError::Config(reason)) => {
                    debug!(queue = %queue, reason = %reason, "Queue type not registered");
                }
                Err(e) => return Err(e),
            }
        }
        ensure_distinct_routes(&resolved)?;

        let mut channels = HashMap::new();
        for (queue, address) in resolved {
            let receive_sql = statements::receive_for(address.queue_name())?;
            channels.insert(
                queue,
                Channel {
                    address,
                    receive_sql,
                },
            );
        }

        Ok(Self {
            options,
            connections,
            channels,
            migrator,
            executor,
        })
    }

    /// Provider wired to the PostgreSQL migrator for the same database
    pub fn with_defaults(options: ProviderOptions, names: Arc<dyn BrokerNames>) -> Result<Self> {
        let executor = SqlCommandExecutor::new();
        let migrator = PostgresMigrator::new(
            ConnectionFactory::new(&options)?,
            Arc::clone(&names),
            executor,
        );
        Self::new(options, names, Arc::new(migrator), executor)
    }

    fn channel(&self, queue: QueueType) -> Result<&Channel> {
        self.channels
            .get(&queue)
            .ok_or_else(|| DomainError::QueueNotRegistered(queue).into())
    }

    async fn receive(
        &self,
        session: &mut ListenerSession,
        channel: &Channel,
        cancel: &CancellationToken,
    ) -> Result<Dequeued> {
        let listener = session.listener().map_err(map_queue_error)?;
        let queue_name = channel.address.queue_name();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            listened = listener.listen(queue_name) => listened.map_err(map_queue_error)?,
        }

        let deadline = Instant::now() + self.options.wait_window;
        loop {
            // Not raced against `cancel`: a receive that already removed a
            // message has to hand it to the caller
            let body = self
                .executor
                .create_command(&mut *listener, &channel.receive_sql)
                .execute_scalar()
                .await
                .map_err(map_queue_error)?;

            if let Some(body) = body {
                let id = WorkItemId::parse(body).map_err(|_| {
                    AppError::Internal(format!("empty message body on queue {}", queue_name))
                })?;
                return Ok(Dequeued::Received(id));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Dequeued::Empty);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                notified = tokio::time::timeout(deadline - now, listener.recv()) => {
                    // Either a send committed or the window ran out; one more receive settles it
                    if let Ok(Err(e)) = notified {
                        return Err(map_queue_error(e));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl QueueProvider for PostgresQueueProvider {
    fn is_dequeue_blocking(&self) -> bool {
        true
    }

    async fn start(&self) -> Result<()> {
        info!(
            create_database = self.options.can_create_database,
            migrate_database = self.options.can_migrate_database,
            queues = self.channels.len(),
            "Starting queue provider"
        );

        if self.options.can_create_database {
            self.migrator.create_database().await?;
        }
        if self.options.can_migrate_database {
            self.migrator.migrate_schema().await?;
        }

        info!("Queue provider started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        debug!("Queue provider stopped (no held resources)");
        Ok(())
    }

    async fn enqueue(&self, id: &str, queue: QueueType) -> Result<()> {
        let id = WorkItemId::parse(id)?;
        let address = &self.channel(queue)?.address;

        let mut conn = self.connections.open().await.map_err(map_queue_error)?;
        let sent = self
            .executor
            .create_command(&mut conn, statements::SEND_MESSAGE)
            .bind(address.initiator_service())
            .bind(address.target_service())
            .bind(address.contract_name())
            .bind(address.msg_type())
            .bind(id.as_str())
            .execute_non_query()
            .await;
        close_connection(conn).await;

        sent.map_err(map_queue_error)?;
        debug!(queue = %queue, work_item_id = %id, "Work item enqueued");
        Ok(())
    }

    async fn dequeue(&self, queue: QueueType, cancel: &CancellationToken) -> Result<Dequeued> {
        let channel = self.channel(queue)?;
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            session = self.connections.open_listener() => session.map_err(map_queue_error)?,
        };

        let result = self.receive(&mut session, channel, cancel).await;
        session.close().await;

        if let Ok(Dequeued::Received(id)) = &result {
            debug!(queue = %queue, work_item_id = %id, "Work item dequeued");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerq_core::cancellation_channel;
    use brokerq_core::port::broker_names::default_address;
    use brokerq_core::port::migrator::mocks::RecordingMigrator;
    use brokerq_core::port::StaticBrokerNames;
    use std::time::Duration;
    use tokio_test::assert_ok;

    // Nothing listens on port 1: any attempted I/O fails fast with QueueUnavailable
    const UNREACHABLE: &str = "postgres://nobody@127.0.0.1:1/none";

    fn provider_with(options: ProviderOptions, migrator: Arc<RecordingMigrator>) -> PostgresQueueProvider {
        let names = Arc::new(StaticBrokerNames::for_host("unit").unwrap());
        PostgresQueueProvider::new(options, names, migrator, SqlCommandExecutor::new()).unwrap()
    }

    fn unreachable_provider() -> PostgresQueueProvider {
        let options =
            ProviderOptions::new(UNREACHABLE).with_connect_timeout(Duration::from_secs(2));
        provider_with(options, Arc::new(RecordingMigrator::new()))
    }

    #[test]
    fn test_dequeue_is_blocking() {
        assert!(unreachable_provider().is_dequeue_blocking());
    }

    #[test]
    fn test_bad_connection_string_is_config_error() {
        let names = Arc::new(StaticBrokerNames::for_host("unit").unwrap());
        let result = PostgresQueueProvider::new(
            ProviderOptions::new("::::"),
            names,
            Arc::new(RecordingMigrator::new()),
            SqlCommandExecutor::new(),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_queue_types_sharing_a_queue_are_config_error() {
        let workflow = default_address("unit", QueueType::Workflow).unwrap();
        let event = BrokerAddress::new(
            "//brokerq/unit/event/initiator",
            "//brokerq/unit/event/target",
            "//brokerq/unit/event/contract",
            "//brokerq/unit/event/message",
            workflow.queue_name(),
        )
        .unwrap();
        let names = StaticBrokerNames::from_addresses([
            (QueueType::Workflow, workflow),
            (QueueType::Event, event),
        ]);

        let result = PostgresQueueProvider::new(
            ProviderOptions::new(UNREACHABLE),
            Arc::new(names),
            Arc::new(RecordingMigrator::new()),
            SqlCommandExecutor::new(),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_queue_types_sharing_a_target_are_config_error() {
        let workflow = default_address("unit", QueueType::Workflow).unwrap();
        let event = BrokerAddress::new(
            "//brokerq/unit/event/initiator",
            workflow.target_service(),
            workflow.contract_name(),
            "//brokerq/unit/event/message",
            "unit_event_queue",
        )
        .unwrap();
        let names = StaticBrokerNames::from_addresses([
            (QueueType::Workflow, workflow),
            (QueueType::Event, event),
        ]);

        let result = PostgresQueueProvider::new(
            ProviderOptions::new(UNREACHABLE),
            Arc::new(names),
            Arc::new(RecordingMigrator::new()),
            SqlCommandExecutor::new(),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_without_flags_skips_migrator() {
        let migrator = Arc::new(RecordingMigrator::new());
        let provider = provider_with(ProviderOptions::new(UNREACHABLE), migrator.clone());

        assert_ok!(provider.start().await);

        assert_eq!(migrator.create_calls(), 0);
        assert_eq!(migrator.migrate_calls(), 0);
    }

    #[tokio::test]
    async fn test_start_runs_migrator_every_time() {
        let migrator = Arc::new(RecordingMigrator::new());
        let options = ProviderOptions::new(UNREACHABLE)
            .with_create_database(true)
            .with_migrate_database(true);
        let provider = provider_with(options, migrator.clone());

        assert_ok!(provider.start().await);
        assert_eq!(migrator.create_calls(), 1);
        assert_eq!(migrator.migrate_calls(), 1);

        assert_ok!(provider.start().await);
        assert_eq!(migrator.create_calls(), 2);
        assert_eq!(migrator.migrate_calls(), 2);
    }

    #[tokio::test]
    async fn test_start_propagates_migrator_failure() {
        let migrator = Arc::new(RecordingMigrator::failing("no permission"));
        let options = ProviderOptions::new(UNREACHABLE).with_migrate_database(true);
        let provider = provider_with(options, migrator.clone());

        let err = provider.start().await.unwrap_err();
        assert!(matches!(err, AppError::Bootstrap(_)));
        assert_eq!(migrator.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_empty_id_rejected_before_io() {
        let err = unreachable_provider()
            .enqueue("", QueueType::Workflow)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_enqueue_nul_id_rejected_before_io() {
        let err = unreachable_provider()
            .enqueue("ab\0c", QueueType::Workflow)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)), "got {:?}", err);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unregistered_queue_is_config_error() {
        let provider = unreachable_provider();

        let err = provider.enqueue("abc", QueueType::Index).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "got {:?}", err);

        let err = provider
            .dequeue(QueueType::Index, &CancellationToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_cancelled_dequeue_returns_without_connecting() {
        let (source, token) = cancellation_channel();
        source.cancel();

        let err = unreachable_provider()
            .dequeue(QueueType::Event, &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_enqueue_unreachable_is_queue_unavailable() {
        let err = unreachable_provider()
            .enqueue("abc", QueueType::Workflow)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_dequeue_unreachable_is_queue_unavailable() {
        let err = unreachable_provider()
            .dequeue(QueueType::Workflow, &CancellationToken::never())
            .await
            .unwrap_err();
        assert!(err.is_transient(), "got {:?}", err);
    }
}
