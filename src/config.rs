//! Session timing configuration.

use std::env;
use std::time::Duration;
use tracing::warn;

/// Default interval between status queries (3 seconds)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default expiry window in seconds (3 minutes)
pub const DEFAULT_EXPIRY_SECS: u32 = 180;

/// Environment variable for the poll interval, in milliseconds
pub const ENV_POLL_INTERVAL_MS: &str = "PAY_POLL_INTERVAL_MS";

/// Environment variable for the expiry window, in seconds
pub const ENV_EXPIRY_SECS: &str = "PAY_EXPIRY_SECS";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Timing of a payment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    poll_interval: Duration,
    expiry_secs: u32,
}

impl SessionConfig {
    /// Read overrides from `PAY_POLL_INTERVAL_MS` and `PAY_EXPIRY_SECS`,
    /// falling back to the defaults for missing or unparsable values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = read_env::<u64>(ENV_POLL_INTERVAL_MS) {
            config = config.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(secs) = read_env::<u32>(ENV_EXPIRY_SECS) {
            config = config.with_expiry_secs(secs);
        }

        config
    }

    /// Zero is clamped to 1ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_expiry_secs(mut self, secs: u32) -> Self {
        self.expiry_secs = secs;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn expiry_secs(&self) -> u32 {
        self.expiry_secs
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            expiry_secs: DEFAULT_EXPIRY_SECS,
        }
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}
