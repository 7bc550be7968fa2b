//! Interval task scheduler with a single background worker.
//!
//! An [`IntervalScheduler`] owns a set of periodic tasks and one worker thread
//! that fires them. Tasks can be added, removed and rescheduled from any thread
//! while the worker runs, including from inside a task's own callback.
//!
//! - **Drift-free periods**: a task's due instant advances by exactly its
//!   interval on every firing, so slow callbacks never shift the schedule
//! - **Ordered firing**: due tasks fire one at a time in due-instant order,
//!   ties broken by insertion order
//! - **Idle when empty**: with no tasks the worker blocks until one is added
//! - **Bounded shutdown**: the worker is joined within a configurable timeout
//!   and detached if a callback keeps it busy longer
//!
//! # Locking
//!
//! All shared state sits behind one mutex. The worker never holds it while
//! sleeping or while a callback runs; callers hold it only for the queue
//! update itself.
//!
//! # Example
//!
//! ```no_run
//! use cadence_scheduler::IntervalScheduler;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::time::Duration;
//!
//! let scheduler = IntervalScheduler::start()?;
//! let ticks = Arc::new(AtomicU64::new(0));
//!
//! let counter = Arc::clone(&ticks);
//! let task = scheduler.add_task(Duration::from_millis(100), move || {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! })?;
//!
//! std::thread::sleep(Duration::from_millis(550));
//! scheduler.remove_task(task)?;
//! scheduler.shutdown();
//! # Ok::<(), cadence_scheduler::SchedulerError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(missing_docs, missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod lateness;
pub mod queue;
pub mod scheduler;
pub mod task;

pub mod prelude;

pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use error::{SchedulerError, SchedulerResult};
pub use lateness::{LatenessMetrics, LatenessSummary};
pub use queue::{DueTask, TimerQueue};
pub use scheduler::{IntervalScheduler, MAX_INTERVAL, SchedulerStats, ShutdownOutcome};
pub use task::{TaskCallback, TaskHandle, TaskId, TaskInfo};
