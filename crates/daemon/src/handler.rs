// Work item handler used by the daemon

use async_trait::async_trait;
use brokerq_core::domain::{QueueType, WorkItemId};
use brokerq_core::port::WorkItemHandler;
use brokerq_core::Result;
use tracing::info;

/// Logs every received id; the workflow host plugs its own handler in here
pub struct LoggingHandler;

#[async_trait]
impl WorkItemHandler for LoggingHandler {
    async fn handle(&self, queue: QueueType, id: WorkItemId) -> Result<()> {
        info!(queue = %queue, work_item_id = %id, "Work item received");
        Ok(())
    }
}
