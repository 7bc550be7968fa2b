//! Scheduler configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{SchedulerError, SchedulerResult};

/// Default time shutdown waits for the worker before detaching it.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default worker thread name.
pub const DEFAULT_THREAD_NAME: &str = "cadence-scheduler";

/// Configuration for an [`IntervalScheduler`](crate::IntervalScheduler).
///
/// Missing fields take their defaults when deserialized, so the struct can be
/// embedded in an application's own configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long shutdown waits for the worker to exit before detaching it.
    pub shutdown_timeout: Duration,
    /// Name given to the worker thread.
    pub thread_name: String,
    /// Worker stack size in bytes (`None` uses the platform default).
    pub stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            stack_size: None,
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.shutdown_timeout.is_zero() {
            return Err(SchedulerError::invalid_configuration(
                "shutdown_timeout must be greater than 0",
            ));
        }
        if self.thread_name.is_empty() {
            return Err(SchedulerError::invalid_configuration(
                "thread_name must not be empty",
            ));
        }
        if self.thread_name.contains('\0') {
            return Err(SchedulerError::invalid_configuration(
                "thread_name must not contain NUL bytes",
            ));
        }
        if self.stack_size == Some(0) {
            return Err(SchedulerError::invalid_configuration(
                "stack_size must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

/// Builder for `SchedulerConfig`.
#[derive(Debug, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Set the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Set the worker thread name.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> SchedulerResult<SchedulerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
