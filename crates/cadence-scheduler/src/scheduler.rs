//! Interval scheduler: a sorted task queue serviced by one background worker.
//!
//! Callers add, remove and reschedule tasks from any thread. Each mutation
//! takes the state lock, updates the queue and signals the worker so it can
//! recompute how long to sleep. The worker fires at most one due task per
//! pass, always with the lock released, so callbacks may call back into the
//! scheduler that runs them.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::lateness::{LatenessMetrics, LatenessSummary};
use crate::queue::TimerQueue;
use crate::task::{TaskCallback, TaskHandle, TaskId, TaskInfo};

/// Longest interval a task may be registered with (ten years).
pub const MAX_INTERVAL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

type SharedCallback = Arc<dyn TaskCallback>;

/// How the worker thread ended during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker exited within the timeout and was joined.
    Joined,
    /// The worker did not exit within the timeout (a callback was still
    /// running) and was detached. It exits on its own once that callback
    /// returns; no further callbacks are started.
    Detached,
    /// The worker had already been unwound by a panicking callback.
    WorkerPanicked,
}

/// Point-in-time counters for a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks currently registered.
    pub pending_tasks: usize,
    /// Callbacks dispatched since start.
    pub fired: u64,
    /// Times the worker returned from its blocking wait.
    pub wakeups: u64,
    /// Whether shutdown has not yet begun.
    pub running: bool,
    /// Whether the worker thread is still in its loop.
    pub worker_alive: bool,
}

struct State {
    queue: TimerQueue<SharedCallback>,
    running: bool,
    worker_exited: bool,
    in_flight: Option<TaskId>,
    fired: u64,
    wakeups: u64,
    lateness: LatenessMetrics,
}

struct Shared {
    state: Mutex<State>,
    /// Worker wake-up: queue changed or shutdown started.
    wake: Condvar,
    /// A callback returned.
    callback_done: Condvar,
    /// The worker left its loop.
    exited: Condvar,
}

/// Runs callbacks at fixed intervals on a dedicated worker thread.
///
/// Each task is first due one interval after it is added and then every
/// interval after that. Due instants advance by exactly one interval per
/// firing, so slow callbacks delay individual firings without shifting the
/// schedule; a firing that falls behind is serviced immediately on the next
/// pass.
///
/// # Thread Safety
///
/// `IntervalScheduler` is `Send + Sync`; share it behind an `Arc` to mutate
/// tasks from several threads. Callbacks run without the internal lock held
/// and may add, remove or reschedule tasks on the same scheduler, including
/// their own.
///
/// # Shutdown
///
/// [`shutdown`](Self::shutdown) (or dropping the scheduler) stops the worker,
/// waiting at most [`SchedulerConfig::shutdown_timeout`] for an in-flight
/// callback to return. Tasks still registered are dropped without firing.
///
/// # Example
///
/// ```no_run
/// use cadence_scheduler::IntervalScheduler;
/// use std::time::Duration;
///
/// let scheduler = IntervalScheduler::start()?;
/// let poll = scheduler.add_task(Duration::from_millis(100), || {
///     // poll a device
/// })?;
///
/// scheduler.reschedule_task(&poll, Duration::from_millis(50))?;
/// scheduler.remove_task(poll)?;
/// scheduler.shutdown();
/// # Ok::<(), cadence_scheduler::SchedulerError>(())
/// ```
pub struct IntervalScheduler {
    id: u64,
    config: SchedulerConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    worker_thread: ThreadId,
    next_task_id: AtomicU64,
}

impl IntervalScheduler {
    /// Start a scheduler with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::SpawnFailed` if the worker thread cannot be
    /// created.
    pub fn start() -> SchedulerResult<Self> {
        Self::with_config(SchedulerConfig::default())
    }

    /// Start a scheduler with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfiguration` if `config` does not
    /// validate and `SchedulerError::SpawnFailed` if the worker thread cannot
    /// be created. Nothing is left running on failure.
    pub fn with_config(config: SchedulerConfig) -> SchedulerResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: TimerQueue::new(),
                running: true,
                worker_exited: false,
                in_flight: None,
                fired: 0,
                wakeups: 0,
                lateness: LatenessMetrics::new(),
            }),
            wake: Condvar::new(),
            callback_done: Condvar::new(),
            exited: Condvar::new(),
        });

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(bytes) = config.stack_size {
            builder = builder.stack_size(bytes);
        }

        let worker_shared = Arc::clone(&shared);
        let worker = builder
            .spawn(move || run_worker(&worker_shared))
            .map_err(|e| SchedulerError::spawn_failed(e.to_string()))?;

        let id = NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed);
        debug!(scheduler = id, thread = %config.thread_name, "scheduler started");

        Ok(Self {
            id,
            worker_thread: worker.thread().id(),
            worker: Some(worker),
            config,
            shared,
            next_task_id: AtomicU64::new(1),
        })
    }

    /// Register a task that fires every `interval`, first one interval from now.
    ///
    /// The worker is woken so it can account for the new task immediately;
    /// with a very short interval the task may fire before this returns.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidInterval` if `interval` is zero or above
    ///   [`MAX_INTERVAL`]
    /// - `SchedulerError::WorkerStopped` if the worker has died
    pub fn add_task<C>(&self, interval: Duration, callback: C) -> SchedulerResult<TaskHandle>
    where
        C: TaskCallback + 'static,
    {
        validate_interval(interval)?;

        let callback: SharedCallback = Arc::new(callback);
        let id = TaskId::from_raw(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let due = Instant::now()
            .checked_add(interval)
            .ok_or(SchedulerError::InvalidInterval(interval))?;

        {
            let mut state = self.shared.state.lock();
            if state.worker_exited {
                return Err(SchedulerError::WorkerStopped);
            }
            state.queue.insert(id, interval, due, callback);
        }
        self.shared.wake.notify_one();

        trace!(scheduler = self.id, task = %id, ?interval, "task added");
        Ok(TaskHandle::new(self.id, id))
    }

    /// [`add_task`](Self::add_task) with the interval in milliseconds.
    ///
    /// # Errors
    ///
    /// Same as [`add_task`](Self::add_task).
    pub fn add_task_ms<C>(&self, interval_ms: u64, callback: C) -> SchedulerResult<TaskHandle>
    where
        C: TaskCallback + 'static,
    {
        self.add_task(Duration::from_millis(interval_ms), callback)
    }

    /// Unregister a task.
    ///
    /// Removing a task that is no longer registered is a no-op. If the
    /// task's callback is running right now it still runs to completion, but
    /// the task never fires again; use
    /// [`remove_task_and_wait`](Self::remove_task_and_wait) to also wait for
    /// that callback.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::ForeignTask` if the handle was issued by
    /// another scheduler.
    pub fn remove_task(&self, handle: TaskHandle) -> SchedulerResult<()> {
        let id = self.owned_id(&handle)?;

        let removed = {
            let mut state = self.shared.state.lock();
            state.lateness.forget(id);
            state.queue.remove(id)
        };
        self.shared.wake.notify_one();

        if removed.is_some() {
            trace!(scheduler = self.id, task = %id, "task removed");
        } else {
            trace!(scheduler = self.id, task = %id, "task already gone, nothing to remove");
        }
        Ok(())
    }

    /// Unregister a task and wait until its callback is no longer running.
    ///
    /// When called from inside a callback (on the worker thread) this does
    /// not wait, since the running callback is the caller itself.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::ForeignTask` if the handle was issued by
    /// another scheduler.
    pub fn remove_task_and_wait(&self, handle: TaskHandle) -> SchedulerResult<()> {
        let id = self.owned_id(&handle)?;
        let on_worker = thread::current().id() == self.worker_thread;

        let removed = {
            let mut state = self.shared.state.lock();
            let removed = state.queue.remove(id);
            state.lateness.forget(id);
            self.shared.wake.notify_one();
            if !on_worker {
                self.shared.callback_done.wait_while(&mut state, |state| {
                    state.in_flight == Some(id) && !state.worker_exited
                });
            }
            removed
        };

        if on_worker {
            trace!(
                scheduler = self.id,
                task = %id,
                found = removed.is_some(),
                "task removed from its own callback, not waiting"
            );
        } else {
            trace!(
                scheduler = self.id,
                task = %id,
                found = removed.is_some(),
                "task removed after in-flight callback settled"
            );
        }
        Ok(())
    }

    /// Change a task's interval and restart its phase.
    ///
    /// The task is next due `interval` from now, regardless of when it last
    /// fired or was due.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidInterval` if `interval` is zero or above
    ///   [`MAX_INTERVAL`]
    /// - `SchedulerError::ForeignTask` if the handle was issued by another
    ///   scheduler
    /// - `SchedulerError::TaskNotFound` if the task is no longer registered
    /// - `SchedulerError::WorkerStopped` if the worker has died
    pub fn reschedule_task(&self, handle: &TaskHandle, interval: Duration) -> SchedulerResult<()> {
        let id = self.owned_id(handle)?;
        validate_interval(interval)?;

        {
            let mut state = self.shared.state.lock();
            if state.worker_exited {
                return Err(SchedulerError::WorkerStopped);
            }
            let due = Instant::now()
                .checked_add(interval)
                .ok_or(SchedulerError::InvalidInterval(interval))?;
            if !state.queue.reschedule(id, interval, due) {
                return Err(SchedulerError::task_not_found(id));
            }
        }
        self.shared.wake.notify_one();

        trace!(scheduler = self.id, task = %id, ?interval, "task rescheduled");
        Ok(())
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Whether the task is still registered.
    #[must_use]
    pub fn contains_task(&self, handle: &TaskHandle) -> bool {
        handle.scheduler_id() == self.id && self.shared.state.lock().queue.contains(handle.id())
    }

    /// Snapshot of a registered task, or `None` if it is gone or foreign.
    #[must_use]
    pub fn task_info(&self, handle: &TaskHandle) -> Option<TaskInfo> {
        if handle.scheduler_id() != self.id {
            return None;
        }
        let (interval, due) = self.shared.state.lock().queue.get(handle.id())?;
        Some(TaskInfo {
            id: handle.id(),
            interval,
            next_fire_in: due.saturating_duration_since(Instant::now()),
        })
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats {
            pending_tasks: state.queue.len(),
            fired: state.fired,
            wakeups: state.wakeups,
            running: state.running,
            worker_alive: !state.worker_exited,
        }
    }

    /// Copy of the firing lateness metrics.
    ///
    /// Per-task summaries cover registered tasks only; the overall summary
    /// also counts firings of tasks removed since.
    #[must_use]
    pub fn lateness(&self) -> LatenessMetrics {
        self.shared.state.lock().lateness.clone()
    }

    /// Lateness summary of one task, or `None` if it has not fired yet, was
    /// removed or belongs to another scheduler.
    #[must_use]
    pub fn task_lateness(&self, handle: &TaskHandle) -> Option<LatenessSummary> {
        if handle.scheduler_id() != self.id {
            return None;
        }
        self.shared.state.lock().lateness.task(handle.id())
    }

    /// Whether the worker thread is still in its loop.
    #[must_use]
    pub fn is_worker_alive(&self) -> bool {
        !self.shared.state.lock().worker_exited
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Stop the worker and drop every remaining task without firing it.
    ///
    /// Waits at most [`SchedulerConfig::shutdown_timeout`] for the worker.
    /// A worker still busy in a callback after that is detached rather than
    /// joined; this is reported through the returned outcome, not as an
    /// error.
    pub fn shutdown(mut self) -> ShutdownOutcome {
        self.stop()
    }

    fn stop(&mut self) -> ShutdownOutcome {
        let Some(worker) = self.worker.take() else {
            return ShutdownOutcome::Joined;
        };

        debug!(scheduler = self.id, "shutting down scheduler worker");
        self.shared.state.lock().running = false;
        self.shared.wake.notify_all();

        let outcome = if thread::current().id() == self.worker_thread {
            warn!(
                scheduler = self.id,
                "scheduler shut down from its own worker thread, detaching worker"
            );
            drop(worker);
            ShutdownOutcome::Detached
        } else if self.wait_for_exit() {
            match worker.join() {
                Ok(()) => {
                    debug!(scheduler = self.id, "scheduler worker joined");
                    ShutdownOutcome::Joined
                }
                Err(_) => {
                    error!(scheduler = self.id, "scheduler worker panicked");
                    ShutdownOutcome::WorkerPanicked
                }
            }
        } else {
            warn!(
                scheduler = self.id,
                timeout = ?self.config.shutdown_timeout,
                "scheduler worker did not exit in time, detaching it"
            );
            drop(worker);
            ShutdownOutcome::Detached
        };

        let pending = self.shared.state.lock().queue.drain();
        debug!(
            scheduler = self.id,
            dropped = pending.len(),
            "released pending tasks"
        );
        drop(pending);

        outcome
    }

    fn wait_for_exit(&self) -> bool {
        let mut state = self.shared.state.lock();
        if !state.worker_exited
            && self
                .shared
                .exited
                .wait_while_for(
                    &mut state,
                    |state| !state.worker_exited,
                    self.config.shutdown_timeout,
                )
                .timed_out()
        {
            trace!(scheduler = self.id, "shutdown wait timed out");
        }
        state.worker_exited
    }

    fn owned_id(&self, handle: &TaskHandle) -> SchedulerResult<TaskId> {
        if handle.scheduler_id() == self.id {
            Ok(handle.id())
        } else {
            Err(SchedulerError::ForeignTask(handle.id()))
        }
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let outcome = self.stop();
            trace!(scheduler = self.id, ?outcome, "scheduler dropped");
        }
    }
}

impl fmt::Debug for IntervalScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalScheduler")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("worker_thread", &self.worker_thread)
            .finish_non_exhaustive()
    }
}

fn validate_interval(interval: Duration) -> SchedulerResult<()> {
    if interval.is_zero() || interval > MAX_INTERVAL {
        return Err(SchedulerError::invalid_interval(interval));
    }
    Ok(())
}

/// Marks the worker as exited when its loop ends, including by unwinding.
struct ExitSignal<'a>(&'a Shared);

impl Drop for ExitSignal<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("task callback panicked, scheduler worker stopped");
        }
        {
            let mut state = self.0.state.lock();
            state.worker_exited = true;
            state.in_flight = None;
        }
        self.0.exited.notify_all();
        self.0.callback_done.notify_all();
    }
}

fn run_worker(shared: &Shared) {
    let _exit = ExitSignal(shared);
    let mut state = shared.state.lock();
    trace!("scheduler worker started");

    while state.running {
        let now = Instant::now();
        if let Some(due) = state.queue.pop_due(now) {
            let lateness = now.saturating_duration_since(due.scheduled);
            if state.lateness.record(due.id, lateness, due.interval) {
                trace!(task = %due.id, ?lateness, "task fired a whole interval late");
            }
            state.fired = state.fired.saturating_add(1);
            state.in_flight = Some(due.id);

            // The callback (and the last reference to it, if the task was
            // removed meanwhile) is released before the lock is retaken.
            let callback = due.payload;
            MutexGuard::unlocked(&mut state, move || callback.invoke());

            state.in_flight = None;
            shared.callback_done.notify_all();
            continue;
        }

        let timed_out = match state.queue.next_deadline() {
            Some(deadline) => shared.wake.wait_until(&mut state, deadline).timed_out(),
            None => {
                shared.wake.wait(&mut state);
                false
            }
        };
        state.wakeups = state.wakeups.saturating_add(1);
        trace!(timed_out, "scheduler worker woke");
    }

    trace!("scheduler worker stopping");
}
