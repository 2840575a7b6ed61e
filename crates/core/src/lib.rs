// brokerq Core - Domain Types & Ports
// NO infrastructure dependencies (Hexagonal Architecture)

pub mod application;
pub mod cancellation;
pub mod domain;
pub mod error;
pub mod port;

pub use cancellation::{cancellation_channel, CancellationSource, CancellationToken};
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
