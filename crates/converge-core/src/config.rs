//! Configuration structures for convergence waits.
//!
//! A provider typically exposes per-operation timeouts to its users and keeps the
//! polling cadence as an internal default. [`ConvergenceConfig`] holds both,
//! deserializes from JSON, validates ranges, and produces the
//! [`ConvergenceSpec`] for each operation.

use crate::error::{Error, Result};
use crate::retry::DEFAULT_CONFLICT_RETRIES;
use crate::spec::{ConvergenceSpec, Direction};
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Default create timeout in seconds
pub const DEFAULT_CREATE_TIMEOUT_SECS: u64 = 30 * 60;

/// Default update timeout in seconds
pub const DEFAULT_UPDATE_TIMEOUT_SECS: u64 = 30 * 60;

/// Default delete timeout in seconds
pub const DEFAULT_DELETE_TIMEOUT_SECS: u64 = 20 * 60;

/// Default delay before the first probe in seconds
pub const DEFAULT_INITIAL_DELAY_SECS: u64 = 10;

/// Default interval between probes in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default minimum interval between probes in seconds
pub const DEFAULT_MIN_POLL_INTERVAL_SECS: u64 = 3;

/// Top-level configuration for convergence behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ConvergenceConfig {
    /// Per-operation deadlines
    #[validate(nested)]
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Polling cadence
    #[validate(nested)]
    #[serde(default)]
    pub polling: PollingConfig,

    /// Retries allowed when an initiator hits lock contention
    #[validate(range(max = 20))]
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,
}

const fn default_conflict_retries() -> u32 {
    DEFAULT_CONFLICT_RETRIES
}

impl ConvergenceConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeouts: TimeoutsConfig::new(),
            polling: PollingConfig::new(),
            conflict_retries: default_conflict_retries(),
        }
    }

    /// Parse and validate a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the JSON does not match or a value is
    /// out of range.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the per-operation timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: TimeoutsConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the polling cadence.
    #[must_use]
    pub const fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Set the number of conflict retries.
    #[must_use]
    pub const fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Build the spec for one operation from this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the configuration fails validation, or
    /// [`Error::InvalidSpec`] if the status sets break the spec's invariants.
    pub fn spec_for<S: Status>(
        &self,
        direction: Direction,
        pending: impl IntoIterator<Item = S>,
        target: impl IntoIterator<Item = S>,
    ) -> Result<ConvergenceSpec<S>> {
        self.validate()?;

        let spec = ConvergenceSpec::new(direction, pending, target)
            .with_timeout(self.timeouts.timeout_for(direction))
            .with_initial_delay(self.polling.initial_delay())
            .with_poll_interval(self.polling.poll_interval())
            .with_min_poll_interval(self.polling.min_poll_interval());
        spec.validate()?;

        Ok(spec)
    }
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-operation deadlines, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TimeoutsConfig {
    /// Create timeout
    #[validate(range(min = 1, max = 86400))]
    #[serde(default = "default_create_secs")]
    pub create_secs: u64,

    /// Update timeout
    #[validate(range(min = 1, max = 86400))]
    #[serde(default = "default_update_secs")]
    pub update_secs: u64,

    /// Delete timeout
    #[validate(range(min = 1, max = 86400))]
    #[serde(default = "default_delete_secs")]
    pub delete_secs: u64,
}

const fn default_create_secs() -> u64 {
    DEFAULT_CREATE_TIMEOUT_SECS
}

const fn default_update_secs() -> u64 {
    DEFAULT_UPDATE_TIMEOUT_SECS
}

const fn default_delete_secs() -> u64 {
    DEFAULT_DELETE_TIMEOUT_SECS
}

impl TimeoutsConfig {
    /// Create timeouts with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            create_secs: default_create_secs(),
            update_secs: default_update_secs(),
            delete_secs: default_delete_secs(),
        }
    }

    /// Set the create timeout in seconds.
    #[must_use]
    pub const fn with_create(mut self, seconds: u64) -> Self {
        self.create_secs = seconds;
        self
    }

    /// Set the update timeout in seconds.
    #[must_use]
    pub const fn with_update(mut self, seconds: u64) -> Self {
        self.update_secs = seconds;
        self
    }

    /// Set the delete timeout in seconds.
    #[must_use]
    pub const fn with_delete(mut self, seconds: u64) -> Self {
        self.delete_secs = seconds;
        self
    }

    /// Get the timeout for a direction as a Duration.
    #[must_use]
    pub const fn timeout_for(&self, direction: Direction) -> Duration {
        let secs = match direction {
            Direction::Create => self.create_secs,
            Direction::Update => self.update_secs,
            Direction::Delete => self.delete_secs,
        };
        Duration::from_secs(secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Polling cadence, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PollingConfig {
    /// Delay before the first probe
    #[validate(range(max = 600))]
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    /// Interval between probes
    #[validate(range(min = 1, max = 600))]
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Lower bound on the interval between probes
    #[validate(range(max = 600))]
    #[serde(default = "default_min_poll_interval_secs")]
    pub min_poll_interval_secs: u64,
}

const fn default_initial_delay_secs() -> u64 {
    DEFAULT_INITIAL_DELAY_SECS
}

const fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

const fn default_min_poll_interval_secs() -> u64 {
    DEFAULT_MIN_POLL_INTERVAL_SECS
}

impl PollingConfig {
    /// Create a polling configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            min_poll_interval_secs: default_min_poll_interval_secs(),
        }
    }

    /// Set the initial delay in seconds.
    #[must_use]
    pub const fn with_initial_delay(mut self, seconds: u64) -> Self {
        self.initial_delay_secs = seconds;
        self
    }

    /// Set the poll interval in seconds.
    #[must_use]
    pub const fn with_poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval_secs = seconds;
        self
    }

    /// Set the minimum poll interval in seconds.
    #[must_use]
    pub const fn with_min_poll_interval(mut self, seconds: u64) -> Self {
        self.min_poll_interval_secs = seconds;
        self
    }

    /// Get the initial delay as a Duration.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Get the minimum poll interval as a Duration.
    #[must_use]
    pub const fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(self.min_poll_interval_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::new()
    }
}
