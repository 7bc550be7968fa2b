//! Ordered task container used by the scheduler worker.
//!
//! Tasks are kept ordered by their next due instant. Ties are broken by an
//! insertion sequence number taken on every (re)insertion, so a task inserted
//! later goes after tasks already due at the same instant.
//!
//! The container holds no clock of its own: every operation that depends on
//! time takes the instant explicitly, which keeps it deterministic under test.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::task::TaskId;

type OrderKey = (Instant, u64);

#[derive(Debug)]
struct Entry<T> {
    interval: Duration,
    due: Instant,
    seq: u64,
    payload: T,
}

/// A task taken off the head of the queue because it was due.
#[derive(Debug, Clone)]
pub struct DueTask<T> {
    /// Id of the task that fired.
    pub id: TaskId,
    /// Instant the task was due at.
    pub scheduled: Instant,
    /// Interval the task was advanced by.
    pub interval: Duration,
    /// Clone of the task payload.
    pub payload: T,
}

/// Tasks ordered by next due instant with O(log n) insert, unlink and
/// extract-min.
#[derive(Debug)]
pub struct TimerQueue<T> {
    order: BTreeMap<OrderKey, TaskId>,
    entries: HashMap<TaskId, Entry<T>>,
    next_seq: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            order: BTreeMap::new(),
            entries: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is queued.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Interval and due instant of `id`.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<(Duration, Instant)> {
        self.entries
            .get(&id)
            .map(|entry| (entry.interval, entry.due))
    }

    /// Insert a task at its sorted position.
    ///
    /// An existing task with the same id is replaced.
    pub fn insert(&mut self, id: TaskId, interval: Duration, due: Instant, payload: T) {
        self.remove(id);
        let seq = self.take_seq();
        self.order.insert((due, seq), id);
        self.entries.insert(
            id,
            Entry {
                interval,
                due,
                seq,
                payload,
            },
        );
    }

    /// Unlink a task. Returns `None` when it is not queued.
    pub fn remove(&mut self, id: TaskId) -> Option<T> {
        let entry = self.entries.remove(&id)?;
        self.order.remove(&(entry.due, entry.seq));
        Some(entry.payload)
    }

    /// Change the interval of a task and move it to `due`.
    ///
    /// Returns `false` when the task is not queued.
    pub fn reschedule(&mut self, id: TaskId, interval: Duration, due: Instant) -> bool {
        let seq = self.take_seq();
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        self.order.remove(&(entry.due, entry.seq));
        entry.interval = interval;
        entry.due = due;
        entry.seq = seq;
        self.order.insert((due, seq), id);
        true
    }

    /// Id and due instant of the task that fires next.
    #[must_use]
    pub fn peek(&self) -> Option<(TaskId, Instant)> {
        self.order
            .first_key_value()
            .map(|(&(due, _), &id)| (id, due))
    }

    /// Due instant of the task that fires next.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.order.first_key_value().map(|(&(due, _), _)| due)
    }

    /// Queued tasks in firing order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, Instant)> + '_ {
        self.order.iter().map(|(&(due, _), &id)| (id, due))
    }

    /// Empty the queue, returning every payload without firing it.
    pub fn drain(&mut self) -> Vec<T> {
        self.order.clear();
        self.entries.drain().map(|(_, entry)| entry.payload).collect()
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }
}

impl<T: Clone> TimerQueue<T> {
    /// Take the head task if it is due at `now`.
    ///
    /// The task is advanced by exactly one interval from the instant it was
    /// due (not from `now`) and reinserted, so the schedule keeps its phase
    /// however late the worker gets to it. A task whose next due instant
    /// cannot be represented is unlinked instead.
    pub fn pop_due(&mut self, now: Instant) -> Option<DueTask<T>> {
        let (id, key) = loop {
            let (&key, &id) = self.order.first_key_value()?;
            if key.0 > now {
                return None;
            }
            if self.entries.contains_key(&id) {
                break (id, key);
            }
            // Order key without an entry: unlink it and look at the next head.
            tracing::warn!(task = %id, "stale queue key without a task, discarding");
            self.order.remove(&key);
        };

        let seq = self.take_seq();
        let entry = self.entries.get_mut(&id)?;
        self.order.remove(&key);
        let scheduled = entry.due;
        let interval = entry.interval;
        let payload = entry.payload.clone();

        match scheduled.checked_add(interval) {
            Some(next) => {
                entry.due = next;
                entry.seq = seq;
                self.order.insert((next, seq), id);
            }
            None => {
                tracing::warn!(task = %id, ?interval, "next due instant overflows the clock, dropping task");
                self.entries.remove(&id);
            }
        }

        Some(DueTask {
            id,
            scheduled,
            interval,
            payload,
        })
    }
}
