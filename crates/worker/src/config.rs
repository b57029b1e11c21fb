use std::str::FromStr;
use std::time::Duration;

use taskcast_core::error::CoreError;

use crate::pool::{DEFAULT_POOL_SIZE, MAX_POOL_SIZE};

/// Default retention of terminal records: 24 hours.
const DEFAULT_RETENTION_HOURS: u64 = 24;

/// Default cleanup cadence: hourly.
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Task queue configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Number of work units that may execute at once.
    pub pool_size: usize,
    /// Minimum age past completion before a terminal record is evicted.
    pub retention: Duration,
    /// How often the cleanup loop runs.
    pub cleanup_interval: Duration,
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `TASK_POOL_SIZE`             | `4`     |
    /// | `TASK_RETENTION_HOURS`       | `24`    |
    /// | `TASK_CLEANUP_INTERVAL_SECS` | `3600`  |
    pub fn from_env() -> Result<Self, CoreError> {
        let pool_size: usize = env_or("TASK_POOL_SIZE", DEFAULT_POOL_SIZE)?;
        let retention_hours: u64 = env_or("TASK_RETENTION_HOURS", DEFAULT_RETENTION_HOURS)?;
        let cleanup_interval_secs: u64 =
            env_or("TASK_CLEANUP_INTERVAL_SECS", DEFAULT_CLEANUP_INTERVAL_SECS)?;

        let retention_secs = retention_hours.checked_mul(3600).ok_or_else(|| {
            CoreError::Validation(format!(
                "TASK_RETENTION_HOURS is too large: {retention_hours}"
            ))
        })?;

        let config = Self {
            pool_size,
            retention: Duration::from_secs(retention_secs),
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.pool_size == 0 {
            return Err(CoreError::Validation(
                "TASK_POOL_SIZE must be at least 1".to_string(),
            ));
        }
        if self.pool_size > MAX_POOL_SIZE {
            return Err(CoreError::Validation(format!(
                "TASK_POOL_SIZE must be at most {MAX_POOL_SIZE}"
            )));
        }
        if self.cleanup_interval.is_zero() {
            return Err(CoreError::Validation(
                "TASK_CLEANUP_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            retention: Duration::from_secs(DEFAULT_RETENTION_HOURS * 3600),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

/// Parse environment variable `key`, or return `default` when it is unset.
///
/// A set but unparsable value is a validation error, never silently replaced
/// by the default.
pub fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}
