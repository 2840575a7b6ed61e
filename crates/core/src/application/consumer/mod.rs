// Queue Consumer - Dequeue loop run by the host for one queue type

pub mod constants;

use constants::*;

use crate::cancellation::CancellationToken;
use crate::domain::{Dequeued, QueueType};
use crate::error::{AppError, Result};
use crate::port::{QueueProvider, WorkItemHandler};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Pulls ids from one queue type and hands them to a handler
pub struct QueueConsumer {
    queue: QueueType,
    provider: Arc<dyn QueueProvider>,
    handler: Arc<dyn WorkItemHandler>,
}

impl QueueConsumer {
    pub fn new(
        queue: QueueType,
        provider: Arc<dyn QueueProvider>,
        handler: Arc<dyn WorkItemHandler>,
    ) -> Self {
        Self {
            queue,
            provider,
            handler,
        }
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    /// Run the consumer loop until `shutdown` fires.
    ///
    /// The shutdown token is also passed to every dequeue, so a consumer
    /// blocked inside the provider's wait window stops promptly.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(queue = %self.queue, "Consumer started");
        loop {
            if shutdown.is_cancelled() {
                info!(queue = %self.queue, "Consumer shutting down");
                break;
            }
            match self.process_next(&shutdown).await {
                Ok(true) => {}
                Ok(false) => {
                    // Blocking providers already waited; polling ones need a pause
                    if !self.provider.is_dequeue_blocking() {
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP_DURATION) => {},
                            _ = shutdown.cancelled() => {
                                info!(queue = %self.queue, "Consumer interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(AppError::Cancelled) => {
                    info!(queue = %self.queue, "Consumer interrupted during dequeue");
                    break;
                }
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.cancelled() => {
                            info!(queue = %self.queue, "Consumer interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(queue = %self.queue, "Consumer stopped");
        Ok(())
    }

    /// Dequeue and handle at most one id (returns true if one was handled)
    pub async fn process_next(&self, shutdown: &CancellationToken) -> Result<bool> {
        let id = match self.provider.dequeue(self.queue, shutdown).await? {
            Dequeued::Received(id) => id,
            Dequeued::Empty => return Ok(false),
        };

        debug!(queue = %self.queue, work_item_id = %id, "Dispatching work item");

        // A panicking handler must not take the consumer down with it
        let handler = Arc::clone(&self.handler);
        let queue = self.queue;
        let logged_id = id.clone();
        let outcome = tokio::task::spawn(async move { handler.handle(queue, id).await }).await;

        match outcome {
            Ok(Ok(())) => {
                debug!(queue = %self.queue, work_item_id = %logged_id, "Work item handled");
            }
            Ok(Err(e)) => {
                error!(queue = %self.queue, work_item_id = %logged_id, error = %e, "Handler failed");
            }
            Err(join_err) => {
                error!(
                    queue = %self.queue,
                    work_item_id = %logged_id,
                    panicked = join_err.is_panic(),
                    "Handler task aborted"
                );
            }
        }
        Ok(true)
    }
}
