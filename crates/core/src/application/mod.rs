// Application Layer - Host-side use of the queue

pub mod consumer;

// Re-exports
pub use consumer::QueueConsumer;
