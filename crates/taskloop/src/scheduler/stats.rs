//! Scheduler counters

use crate::scheduler::task::TaskStatus;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Total tasks accepted by `schedule`
    pub scheduled: u64,

    /// Tasks that produced a value
    pub completed: u64,

    /// Tasks whose work or callback failed
    pub failed: u64,

    /// Tasks cancelled before or while running
    pub cancelled: u64,

    /// Tasks abandoned at their deadline
    pub timed_out: u64,

    /// Tasks without an outcome yet
    pub active: usize,

    /// Submissions not yet picked up by the loop
    pub pending: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
}

impl Counters {
    pub(crate) fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_terminal(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Queued => return,
            TaskStatus::Completed => &self.completed,
            TaskStatus::Failed => &self.failed,
            TaskStatus::Cancelled => &self.cancelled,
            TaskStatus::Timeout => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, active: usize, pending: usize) -> SchedulerStats {
        SchedulerStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            active,
            pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = Counters::default();
        counters.record_scheduled();
        counters.record_scheduled();
        counters.record_terminal(TaskStatus::Completed);
        counters.record_terminal(TaskStatus::Timeout);
        counters.record_terminal(TaskStatus::Queued);

        let stats = counters.snapshot(0, 3);
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending, 3);
    }
}
