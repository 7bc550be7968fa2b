//! Error types for the scheduler crate.
//!
//! Every fallible operation returns a [`SchedulerResult`]. Failures are
//! detected before any mutation, so an `Err` always leaves the scheduler
//! exactly as it was.

use std::time::Duration;

use thiserror::Error;

use crate::task::TaskId;

/// Errors that can occur while operating an [`IntervalScheduler`](crate::IntervalScheduler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The background worker thread could not be spawned.
    #[error("Failed to spawn scheduler worker: {0}")]
    SpawnFailed(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Interval is zero or larger than [`MAX_INTERVAL`](crate::MAX_INTERVAL).
    #[error("Invalid task interval: {0:?}")]
    InvalidInterval(Duration),

    /// The task is no longer registered with the scheduler.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// The handle was issued by a different scheduler.
    #[error("Task {0} belongs to another scheduler")]
    ForeignTask(TaskId),

    /// The worker thread has exited (a callback panicked).
    #[error("Scheduler worker is no longer running")]
    WorkerStopped,
}

impl SchedulerError {
    /// Create a spawn failure error.
    #[must_use]
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed(reason.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Create an invalid interval error.
    #[must_use]
    pub fn invalid_interval(interval: Duration) -> Self {
        Self::InvalidInterval(interval)
    }

    /// Create a task not found error.
    #[must_use]
    pub fn task_not_found(id: TaskId) -> Self {
        Self::TaskNotFound(id)
    }
}

/// A specialized `Result` type for scheduler operations.
pub type SchedulerResult<T = ()> = Result<T, SchedulerError>;
