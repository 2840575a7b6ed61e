//! brokerq daemon - Main Entry Point
//! Bootstraps the broker and runs one consumer per configured queue type

mod handler;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use brokerq_core::application::QueueConsumer;
use brokerq_core::domain::QueueType;
use brokerq_core::port::broker_names::default_address;
use brokerq_core::port::{BrokerNames, QueueProvider, StaticBrokerNames};
use brokerq_core::{cancellation_channel, VERSION};
use brokerq_infra_postgres::{PostgresQueueProvider, ProviderOptions};
use handler::LoggingHandler;

const DEFAULT_HOST_NAME: &str = "default";
const DEFAULT_QUEUES: &str = "workflow,event";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("BROKERQ_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("brokerq=info"))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("brokerq daemon v{} starting...", VERSION);

    // 2. Load configuration
    let options = ProviderOptions::from_env().context("Invalid provider options")?;
    let host = std::env::var("BROKERQ_HOST_NAME").unwrap_or_else(|_| DEFAULT_HOST_NAME.to_string());
    let queues = parse_queues(
        &std::env::var("BROKERQ_QUEUES").unwrap_or_else(|_| DEFAULT_QUEUES.to_string()),
    )?;

    info!(host = %host, options = ?options, queues = ?queues, "Configuration loaded");

    // 3. Setup dependencies (DI wiring)
    let mut names = StaticBrokerNames::for_host(&host).context("Invalid host name")?;
    for &queue in &queues {
        // Queue types outside the host defaults (Index) get addresses on request
        if names.get_by_queue(queue).is_err() {
            names = names.with_address(queue, default_address(&host, queue)?);
        }
    }
    let names = Arc::new(names);
    let provider: Arc<dyn QueueProvider> = Arc::new(
        PostgresQueueProvider::with_defaults(options, names)
            .context("Queue provider construction failed")?,
    );
    let handler = Arc::new(LoggingHandler);

    // 4. Bootstrap broker objects
    provider.start().await.context("Queue provider start failed")?;

    // 5. Start one consumer per queue type
    let (shutdown_source, shutdown_token) = cancellation_channel();
    let mut consumer_handles = Vec::with_capacity(queues.len());
    for queue in queues {
        let consumer = QueueConsumer::new(queue, Arc::clone(&provider), handler.clone());
        let token = shutdown_token.clone();
        consumer_handles.push(tokio::spawn(async move {
            if let Err(e) = consumer.run(token).await {
                error!(queue = %queue, error = ?e, "Consumer failed");
            }
        }));
    }

    info!("System ready. Waiting for work items...");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    shutdown_source.cancel();
    for handle in consumer_handles {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            error!("Consumer did not stop within {:?}", SHUTDOWN_GRACE);
        }
    }
    provider.stop().await.context("Queue provider stop failed")?;

    info!("Shutdown complete.");

    Ok(())
}

/// Parse a comma separated list of queue types ("workflow,event")
fn parse_queues(raw: &str) -> Result<Vec<QueueType>> {
    let mut queues = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let queue: QueueType = part
            .parse()
            .with_context(|| format!("Invalid queue type in BROKERQ_QUEUES: '{}'", part))?;
        if !queues.contains(&queue) {
            queues.push(queue);
        }
    }
    anyhow::ensure!(!queues.is_empty(), "BROKERQ_QUEUES names no queue types");
    Ok(queues)
}
