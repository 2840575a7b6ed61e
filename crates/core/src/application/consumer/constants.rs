// Consumer constants (No magic values)
use std::time::Duration;

/// Sleep after an empty dequeue, only for providers that do not block (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep after a provider error before the next dequeue (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);
