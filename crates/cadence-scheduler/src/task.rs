//! Task callbacks and the handles that identify registered tasks.

use std::fmt;
use std::time::Duration;

/// Unit of work invoked by the scheduler worker every time a task is due.
///
/// Implemented for every `Fn() + Send + Sync` closure, so most callers never
/// name this trait directly. State the callback needs is captured by the
/// closure (or held by the implementing type).
///
/// The scheduler does not observe failures: a callback that needs retries or
/// error reporting does it itself. A panic unwinds the worker thread and stops
/// all further firings.
pub trait TaskCallback: Send + Sync {
    /// Run one occurrence of the task.
    fn invoke(&self);
}

impl<F> TaskCallback for F
where
    F: Fn() + Send + Sync,
{
    #[inline]
    fn invoke(&self) {
        self()
    }
}

/// Identifier of a task, unique within one scheduler and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Handle to a task registered with an [`IntervalScheduler`](crate::IntervalScheduler).
///
/// The handle is neither `Clone` nor `Copy`: removing a task consumes it, so
/// a removed task cannot be referenced again through the same handle.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    scheduler_id: u64,
    id: TaskId,
}

impl TaskHandle {
    pub(crate) fn new(scheduler_id: u64, id: TaskId) -> Self {
        Self { scheduler_id, id }
    }

    /// Id of the task this handle refers to.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn scheduler_id(&self) -> u64 {
        self.scheduler_id
    }
}

/// Snapshot of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    /// Task id.
    pub id: TaskId,
    /// Period between consecutive firings.
    pub interval: Duration,
    /// Time left until the task is next due (zero when overdue).
    pub next_fire_in: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_closure_is_task_callback() {
        let counter = Arc::new(AtomicU32::new(0));
        let captured = Arc::clone(&counter);
        let callback: Arc<dyn TaskCallback> = Arc::new(move || {
            captured.fetch_add(1, Ordering::SeqCst);
        });

        callback.invoke();
        callback.invoke();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_custom_callback_type() {
        struct Ping(AtomicU32);

        impl TaskCallback for Ping {
            fn invoke(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let ping = Ping(AtomicU32::new(0));
        ping.invoke();
        assert_eq!(ping.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId::from_raw(42).to_string(), "task#42");
        assert_eq!(TaskId::from_raw(42).get(), 42);
    }

    #[test]
    fn test_handle_exposes_id() {
        let handle = TaskHandle::new(3, TaskId::from_raw(9));
        assert_eq!(handle.id(), TaskId::from_raw(9));
        assert_eq!(handle.scheduler_id(), 3);
    }
}
