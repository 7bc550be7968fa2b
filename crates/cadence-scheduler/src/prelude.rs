//! Prelude module for common scheduler types.
//!
//! ```rust
//! use cadence_scheduler::prelude::*;
//! ```

pub use crate::config::SchedulerConfig;
pub use crate::error::{SchedulerError, SchedulerResult};
pub use crate::lateness::{LatenessMetrics, LatenessSummary};
pub use crate::scheduler::{IntervalScheduler, MAX_INTERVAL, SchedulerStats, ShutdownOutcome};
pub use crate::task::{TaskCallback, TaskHandle, TaskId, TaskInfo};
