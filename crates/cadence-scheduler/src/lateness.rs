//! Firing lateness, overall and per task.
//!
//! Lateness is how long after a task's due instant the worker dispatched its
//! callback. A firing late by a whole interval or more is an overrun: at least
//! one period of that task was lost to a slow callback or a busy system.

use std::collections::HashMap;
use std::time::Duration;

use crate::task::TaskId;

/// Lateness summary over a series of firings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatenessSummary {
    /// Firings recorded.
    pub firings: u64,
    /// Firings late by at least one full interval.
    pub overruns: u64,
    /// Largest lateness seen.
    pub max: Duration,
    /// Lateness of the most recent firing.
    pub last: Duration,
    total: Duration,
}

impl LatenessSummary {
    fn record(&mut self, lateness: Duration, overrun: bool) {
        self.firings = self.firings.saturating_add(1);
        if overrun {
            self.overruns = self.overruns.saturating_add(1);
        }
        self.max = self.max.max(lateness);
        self.last = lateness;
        self.total = self.total.saturating_add(lateness);
    }

    /// Mean lateness, zero before the first firing.
    #[must_use]
    pub fn mean(&self) -> Duration {
        if self.firings == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.firings);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Fraction of firings that overran (0.0 to 1.0).
    #[must_use]
    pub fn overrun_rate(&self) -> f64 {
        if self.firings == 0 {
            0.0
        } else {
            self.overruns as f64 / self.firings as f64
        }
    }
}

/// Lateness of every callback dispatch, kept overall and for each task that
/// is still registered.
#[derive(Debug, Clone, Default)]
pub struct LatenessMetrics {
    overall: LatenessSummary,
    per_task: HashMap<TaskId, LatenessSummary>,
}

impl LatenessMetrics {
    /// Create empty metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatch of `id` that happened `lateness` after it was due.
    ///
    /// Returns whether the firing counted as an overrun of `interval`.
    pub fn record(&mut self, id: TaskId, lateness: Duration, interval: Duration) -> bool {
        let overrun = lateness >= interval;
        self.overall.record(lateness, overrun);
        self.per_task.entry(id).or_default().record(lateness, overrun);
        overrun
    }

    /// Summary across all tasks, including ones since removed.
    #[must_use]
    pub fn overall(&self) -> LatenessSummary {
        self.overall
    }

    /// Summary for one task, or `None` if it has not fired or was forgotten.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<LatenessSummary> {
        self.per_task.get(&id).copied()
    }

    /// The task with the largest lateness seen, if any has fired.
    ///
    /// Ties go to the lower task id so the answer is stable.
    #[must_use]
    pub fn worst_task(&self) -> Option<(TaskId, LatenessSummary)> {
        self.per_task
            .iter()
            .max_by(|(a_id, a), (b_id, b)| a.max.cmp(&b.max).then_with(|| b_id.cmp(a_id)))
            .map(|(&id, &summary)| (id, summary))
    }

    /// Number of tasks with a summary.
    #[must_use]
    pub fn tracked_tasks(&self) -> usize {
        self.per_task.len()
    }

    /// Drop the summary of a task that is no longer registered.
    ///
    /// The overall summary keeps its firings.
    pub fn forget(&mut self, id: TaskId) -> Option<LatenessSummary> {
        self.per_task.remove(&id)
    }

    /// Clear everything.
    pub fn reset(&mut self) {
        self.overall = LatenessSummary::default();
        self.per_task.clear();
    }
}
