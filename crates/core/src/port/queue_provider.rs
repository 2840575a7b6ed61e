// Queue Provider Port (Interface)

use crate::cancellation::CancellationToken;
use crate::domain::{Dequeued, QueueType};
use crate::error::Result;
use async_trait::async_trait;

/// Durable work queue consumed by the workflow host.
///
/// Lifecycle: `start` once (bootstrap), then `enqueue`/`dequeue` from any
/// number of concurrent callers. Calling them before a successful `start` is
/// a caller contract violation and is not checked.
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// True when `dequeue` already waits for messages, so callers need no
    /// polling delay of their own between calls
    fn is_dequeue_blocking(&self) -> bool;

    /// Run bootstrap (database creation / migration) as configured
    async fn start(&self) -> Result<()>;

    /// Release provider resources (none are held across calls)
    async fn stop(&self) -> Result<()>;

    /// Append `id` to `queue`
    ///
    /// # Errors
    /// - `AppError::InvalidArgument` if `id` is empty (no I/O happens)
    /// - `AppError::Config` if `queue` has no broker address
    /// - `AppError::QueueUnavailable` on connection or statement failure
    async fn enqueue(&self, id: &str, queue: QueueType) -> Result<()>;

    /// Take the next id from `queue`, waiting up to the provider's wait window
    ///
    /// # Errors
    /// - `AppError::Cancelled` if `cancel` fired before a message arrived
    /// - `AppError::Config` if `queue` has no broker address
    /// - `AppError::QueueUnavailable` on connection or statement failure
    async fn dequeue(&self, queue: QueueType, cancel: &CancellationToken) -> Result<Dequeued>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::WorkItemId;
    use crate::error::AppError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    /// In-process queue with the same blocking/cancellation contract as the
    /// database-backed provider
    pub struct InMemoryQueueProvider {
        queues: Mutex<HashMap<QueueType, VecDeque<WorkItemId>>>,
        arrivals: Notify,
        wait_window: Duration,
        blocking: bool,
        start_calls: AtomicUsize,
        dequeue_calls: AtomicUsize,
        pending_failures: AtomicUsize,
    }

    impl InMemoryQueueProvider {
        pub fn new(wait_window: Duration) -> Self {
            Self {
                queues: Mutex::new(HashMap::new()),
                arrivals: Notify::new(),
                wait_window,
                blocking: true,
                start_calls: AtomicUsize::new(0),
                dequeue_calls: AtomicUsize::new(0),
                pending_failures: AtomicUsize::new(0),
            }
        }

        /// Provider whose dequeue returns immediately when empty
        pub fn non_blocking() -> Self {
            Self {
                blocking: false,
                ..Self::new(Duration::ZERO)
            }
        }

        /// Make the next `count` dequeue calls fail with QueueUnavailable
        pub fn fail_next_dequeues(&self, count: usize) {
            self.pending_failures.store(count, Ordering::SeqCst);
        }

        pub fn start_calls(&self) -> usize {
            self.start_calls.load(Ordering::SeqCst)
        }

        pub fn dequeue_calls(&self) -> usize {
            self.dequeue_calls.load(Ordering::SeqCst)
        }

        pub fn pending(&self, queue: QueueType) -> usize {
            self.queues
                .lock()
                .unwrap()
                .get(&queue)
                .map(VecDeque::len)
                .unwrap_or(0)
        }

        fn pop(&self, queue: QueueType) -> Option<WorkItemId> {
            self.queues
                .lock()
                .unwrap()
                .get_mut(&queue)
                .and_then(VecDeque::pop_front)
        }

        fn take_failure(&self) -> bool {
            self.pending_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl QueueProvider for InMemoryQueueProvider {
        fn is_dequeue_blocking(&self) -> bool {
            self.blocking
        }

        async fn start(&self) -> Result<()> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn enqueue(&self, id: &str, queue: QueueType) -> Result<()> {
            let id = WorkItemId::parse(id)?;
            self.queues
                .lock()
                .unwrap()
                .entry(queue)
                .or_default()
                .push_back(id);
            self.arrivals.notify_waiters();
            Ok(())
        }

        async fn dequeue(&self, queue: QueueType, cancel: &CancellationToken) -> Result<Dequeued> {
            self.dequeue_calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            if self.take_failure() {
                return Err(AppError::QueueUnavailable("injected failure".to_string()));
            }

            let deadline = Instant::now() + self.wait_window;
            loop {
                // Register interest before checking so an enqueue in between is not missed
                let notified = self.arrivals.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(id) = self.pop(queue) {
                    return Ok(Dequeued::Received(id));
                }
                if !self.blocking {
                    return Ok(Dequeued::Empty);
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    _ = &mut notified => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        return Ok(self.pop(queue).map_or(Dequeued::Empty, Dequeued::Received));
                    }
                }
            }
        }
    }
}
