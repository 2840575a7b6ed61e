// Bootstrap Migrator Port

use crate::error::Result;
use async_trait::async_trait;

/// Creates the database and broker objects the queue needs.
///
/// Both operations must be idempotent: they run on every process start.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Create the target database if it does not exist
    async fn create_database(&self) -> Result<()>;

    /// Create message types, contracts, services and queues for every
    /// registered broker address
    async fn migrate_schema(&self) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Migrator that counts calls and optionally fails
    #[derive(Default)]
    pub struct RecordingMigrator {
        create_calls: AtomicUsize,
        migrate_calls: AtomicUsize,
        fail_with: Option<String>,
    }

    impl RecordingMigrator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                fail_with: Some(message.into()),
                ..Self::default()
            }
        }

        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        pub fn migrate_calls(&self) -> usize {
            self.migrate_calls.load(Ordering::SeqCst)
        }

        fn outcome(&self) -> Result<()> {
            match &self.fail_with {
                Some(msg) => Err(AppError::Bootstrap(msg.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Migrator for RecordingMigrator {
        async fn create_database(&self) -> Result<()> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.outcome()
        }

        async fn migrate_schema(&self) -> Result<()> {
            self.migrate_calls.fetch_add(1, Ordering::SeqCst);
            self.outcome()
        }
    }
}
