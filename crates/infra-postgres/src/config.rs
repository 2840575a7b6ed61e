// Provider Options

use brokerq_core::error::{AppError, Result};
use std::time::Duration;

/// Default time a dequeue waits for a message before reporting empty
pub const DEFAULT_WAIT_WINDOW: Duration = Duration::from_secs(1);

/// Default limit on establishing a database connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reported to the server as `application_name`
pub const DEFAULT_APPLICATION_NAME: &str = "brokerq";

/// Upper bound for the wait window; longer waits belong in the caller's loop
pub const MAX_WAIT_WINDOW: Duration = Duration::from_secs(60);

/// Construction options for the PostgreSQL queue provider.
///
/// Immutable for the lifetime of a provider.
#[derive(Clone)]
pub struct ProviderOptions {
    pub connection_string: String,
    pub can_create_database: bool,
    pub can_migrate_database: bool,
    pub wait_window: Duration,
    pub connect_timeout: Duration,
    pub application_name: String,
}

impl ProviderOptions {
    /// Options with bootstrap disabled and default timings
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            can_create_database: false,
            can_migrate_database: false,
            wait_window: DEFAULT_WAIT_WINDOW,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        }
    }

    pub fn with_create_database(mut self, enabled: bool) -> Self {
        self.can_create_database = enabled;
        self
    }

    pub fn with_migrate_database(mut self, enabled: bool) -> Self {
        self.can_migrate_database = enabled;
        self
    }

    pub fn with_wait_window(mut self, wait_window: Duration) -> Self {
        self.wait_window = wait_window;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Load options from `BROKERQ_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load options through an arbitrary key lookup (environment, test map, ...)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let connection_string = lookup("BROKERQ_DATABASE_URL").ok_or_else(|| {
            AppError::Config("BROKERQ_DATABASE_URL environment variable is required".to_string())
        })?;

        let mut options = Self::new(connection_string)
            .with_create_database(parse_flag(&lookup, "BROKERQ_CREATE_DATABASE", false)?)
            .with_migrate_database(parse_flag(&lookup, "BROKERQ_MIGRATE_DATABASE", true)?);

        if let Some(ms) = parse_millis(&lookup, "BROKERQ_WAIT_WINDOW_MS")? {
            options.wait_window = ms;
        }
        if let Some(ms) = parse_millis(&lookup, "BROKERQ_CONNECT_TIMEOUT_MS")? {
            options.connect_timeout = ms;
        }
        if let Some(name) = lookup("BROKERQ_APPLICATION_NAME") {
            options.application_name = name;
        }

        options.validate()?;
        Ok(options)
    }

    /// Reject option combinations no provider can work with
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(AppError::Config(
                "connection string must not be empty".to_string(),
            ));
        }
        if self.wait_window.is_zero() || self.wait_window > MAX_WAIT_WINDOW {
            return Err(AppError::Config(format!(
                "wait window must be between 1ms and {}s, got {:?}",
                MAX_WAIT_WINDOW.as_secs(),
                self.wait_window
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(AppError::Config(
                "connect timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// Connection strings carry credentials; keep them out of logs
impl std::fmt::Debug for ProviderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderOptions")
            .field("connection_string", &"<redacted>")
            .field("can_create_database", &self.can_create_database)
            .field("can_migrate_database", &self.can_migrate_database)
            .field("wait_window", &self.wait_window)
            .field("connect_timeout", &self.connect_timeout)
            .field("application_name", &self.application_name)
            .finish()
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(AppError::Config(format!(
                "{} must be a boolean, got '{}'",
                key, other
            ))),
        },
    }
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| {
                    AppError::Config(format!("{} must be a number of milliseconds, got '{}'", key, raw))
                })
        })
        .transpose()
}
