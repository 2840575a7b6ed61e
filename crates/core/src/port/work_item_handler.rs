// Work Item Handler Port
// Implemented by the hosting engine: turns a dequeued id into real work.

use crate::domain::{QueueType, WorkItemId};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait WorkItemHandler: Send + Sync {
    /// Process one dequeued id. Errors are logged by the consumer loop and
    /// do not stop it; the id has already left the queue.
    async fn handle(&self, queue: QueueType, id: WorkItemId) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Handler that remembers every id it was given
    #[derive(Default)]
    pub struct RecordingHandler {
        seen: Mutex<Vec<(QueueType, WorkItemId)>>,
        fail: bool,
    }

    impl RecordingHandler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Records ids but reports every one as failed
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn seen(&self) -> Vec<(QueueType, WorkItemId)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkItemHandler for RecordingHandler {
        async fn handle(&self, queue: QueueType, id: WorkItemId) -> Result<()> {
            let failed_id = id.to_string();
            self.seen.lock().unwrap().push((queue, id));
            if self.fail {
                return Err(AppError::Internal(format!("handler rejected {}", failed_id)));
            }
            Ok(())
        }
    }
}
