//! End-to-end timing tests for the interval scheduler.
//!
//! Bounds are generous enough for loaded CI machines while still telling a
//! drifting or stalled schedule apart from a healthy one.

use cadence_scheduler::{IntervalScheduler, ShutdownOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn poll_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn test_counter_task_end_to_end() -> TestResult {
    let scheduler = IntervalScheduler::start()?;
    let counter = Arc::new(AtomicU64::new(0));

    let ticks = Arc::clone(&counter);
    let task = scheduler.add_task(Duration::from_millis(100), move || {
        ticks.fetch_add(1, Ordering::SeqCst);
    })?;

    thread::sleep(Duration::from_millis(550));
    let fired = counter.load(Ordering::SeqCst);
    // Five due instants fall inside the window; allow one boundary tick.
    assert!((4..=6).contains(&fired), "fired {fired} times");

    scheduler.remove_task(task)?;
    let after_remove = counter.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(300));
    assert_eq!(counter.load(Ordering::SeqCst), after_remove);

    assert_eq!(scheduler.shutdown(), ShutdownOutcome::Joined);
    Ok(())
}

#[test]
fn test_ms_convenience_matches_duration() -> TestResult {
    let scheduler = IntervalScheduler::start()?;
    let handle = scheduler.add_task_ms(250, || {})?;

    let info = scheduler
        .task_info(&handle)
        .ok_or("task should be registered")?;
    assert_eq!(info.interval, Duration::from_millis(250));
    Ok(())
}

#[test]
fn test_slow_callback_does_not_shift_schedule() -> TestResult {
    const INTERVAL: Duration = Duration::from_millis(50);
    const FIRINGS: usize = 8;

    let scheduler = IntervalScheduler::start()?;
    let fire_times = Arc::new(Mutex::new(Vec::with_capacity(FIRINGS)));

    let times = Arc::clone(&fire_times);
    let added_at = Instant::now();
    let _task = scheduler.add_task(INTERVAL, move || {
        times.lock().push(Instant::now());
        // A schedule re-based on callback completion would slip this much per period.
        thread::sleep(Duration::from_millis(15));
    })?;

    let done = poll_until(INTERVAL * 20, || fire_times.lock().len() >= FIRINGS);
    assert!(done, "expected {FIRINGS} firings");

    let times = fire_times.lock().clone();
    for (k, fired_at) in times.iter().take(FIRINGS).enumerate() {
        let expected = added_at + INTERVAL * (k as u32 + 1);
        let behind = fired_at.saturating_duration_since(expected);
        assert!(
            behind < Duration::from_millis(35),
            "firing {k} was {behind:?} behind its due instant"
        );
        assert!(
            *fired_at + Duration::from_millis(5) >= expected,
            "firing {k} came early"
        );
    }
    Ok(())
}

#[test]
fn test_reschedule_restarts_phase() -> TestResult {
    let scheduler = IntervalScheduler::start()?;
    let first_fire = Arc::new(Mutex::new(None::<Instant>));

    let slot = Arc::clone(&first_fire);
    let task = scheduler.add_task(Duration::from_millis(400), move || {
        let mut slot = slot.lock();
        if slot.is_none() {
            *slot = Some(Instant::now());
        }
    })?;

    thread::sleep(Duration::from_millis(300));
    let rescheduled_at = Instant::now();
    scheduler.reschedule_task(&task, Duration::from_millis(200))?;

    // Keeping the old phase would make the task due 100ms before the call.
    let fired = poll_until(Duration::from_secs(2), || first_fire.lock().is_some());
    assert!(fired, "rescheduled task never fired");

    let fired_at = (*first_fire.lock()).ok_or("missing fire instant")?;
    let delay = fired_at.saturating_duration_since(rescheduled_at);
    assert!(delay >= Duration::from_millis(190), "fired after {delay:?}");
    assert!(delay < Duration::from_millis(350), "fired after {delay:?}");

    let info = scheduler
        .task_info(&task)
        .ok_or("task should be registered")?;
    assert_eq!(info.interval, Duration::from_millis(200));
    Ok(())
}

#[test]
fn test_empty_scheduler_idles_until_task_added() -> TestResult {
    let scheduler = IntervalScheduler::start()?;

    thread::sleep(Duration::from_millis(200));
    let idle = scheduler.stats();
    assert_eq!(idle.wakeups, 0, "worker woke with no tasks registered");
    assert_eq!(idle.fired, 0);

    let fired = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&fired);
    let added_at = Instant::now();
    let _task = scheduler.add_task(Duration::from_millis(30), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })?;

    assert!(
        poll_until(Duration::from_millis(100), || scheduler.stats().wakeups >= 1),
        "worker did not wake promptly for the new task"
    );
    assert!(
        poll_until(Duration::from_millis(500), || fired.load(Ordering::SeqCst) >= 1),
        "task never fired"
    );
    assert!(added_at.elapsed() >= Duration::from_millis(30));
    Ok(())
}

#[test]
fn test_due_tasks_fire_in_due_order() -> TestResult {
    let scheduler = IntervalScheduler::start()?;
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for interval_ms in [30u64, 20, 10] {
        let order = Arc::clone(&order);
        handles.push(scheduler.add_task_ms(interval_ms, move || {
            let mut order = order.lock();
            if !order.contains(&interval_ms) {
                order.push(interval_ms);
            }
        })?);
    }

    assert!(poll_until(Duration::from_secs(1), || order.lock().len() == 3));
    assert_eq!(*order.lock(), vec![10, 20, 30]);

    for handle in handles {
        scheduler.remove_task(handle)?;
    }
    assert_eq!(scheduler.task_count(), 0);
    Ok(())
}

#[test]
fn test_overdue_firings_are_caught_up() -> TestResult {
    let scheduler = IntervalScheduler::start()?;
    let counter = Arc::new(AtomicU64::new(0));

    let calls = Arc::clone(&counter);
    let task = scheduler.add_task(Duration::from_millis(20), move || {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            // Stall long enough for several periods to become overdue.
            thread::sleep(Duration::from_millis(90));
        }
    })?;

    assert!(poll_until(Duration::from_secs(1), || counter
        .load(Ordering::SeqCst)
        >= 6));

    let overall = scheduler.lateness().overall();
    assert!(overall.firings >= 6);
    assert!(overall.overruns >= 1, "stall should register as an overrun");
    assert!(overall.max >= Duration::from_millis(20));

    let own = scheduler
        .task_lateness(&task)
        .ok_or("task should have a lateness summary")?;
    assert!(own.overruns >= 1);
    assert!(own.max >= Duration::from_millis(20));
    Ok(())
}

#[test]
fn test_stats_track_firings() -> TestResult {
    let scheduler = IntervalScheduler::start()?;
    let fast = scheduler.add_task_ms(5, || {})?;
    let slow = scheduler.add_task_ms(60_000, || {})?;

    assert!(poll_until(Duration::from_secs(1), || scheduler.stats().fired >= 5));

    let stats = scheduler.stats();
    assert_eq!(stats.pending_tasks, 2);
    assert!(stats.running);
    assert!(stats.worker_alive);
    assert!(stats.wakeups >= 1);
    assert!(scheduler.lateness().overall().firings >= 5);
    assert!(scheduler.task_lateness(&slow).is_none(), "slow task has not fired");
    let fast_lateness = scheduler
        .task_lateness(&fast)
        .ok_or("fast task should have a lateness summary")?;
    assert!(fast_lateness.firings >= 1);
    Ok(())
}
