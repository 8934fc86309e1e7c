//! Result table: task id → current outcome
//!
//! Producers insert `Queued` entries and perform consuming reads; the loop
//! writes each terminal outcome exactly once. Terminal writes notify a
//! condvar so blocking readers never spin.

use crate::error::SchedulerError;
use crate::scheduler::task::{TaskId, TaskOutcome, TaskStatus};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};

/// Shared map of task outcomes
pub struct ResultTable<T> {
    entries: Mutex<FxHashMap<TaskId, TaskOutcome<T>>>,
    /// Signalled on every terminal write
    settled: Condvar,
}

impl<T> ResultTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            settled: Condvar::new(),
        }
    }

    /// Register a freshly submitted task
    pub fn insert_queued(&self, id: TaskId) {
        self.entries.lock().insert(id, TaskOutcome::Queued);
    }

    /// Record a terminal outcome.
    ///
    /// Only a `Queued` entry is updated; returns false when the entry is
    /// already terminal or no longer exists.
    pub fn finish(&self, id: TaskId, outcome: TaskOutcome<T>) -> bool {
        self.finish_with(id, outcome, |_| {})
    }

    /// [`finish`](Self::finish), running `on_write` under the table lock
    /// before any waiter wakes. Nothing sees the outcome before `on_write`.
    pub(crate) fn finish_with(
        &self,
        id: TaskId,
        outcome: TaskOutcome<T>,
        on_write: impl FnOnce(TaskStatus),
    ) -> bool {
        debug_assert!(outcome.is_terminal());
        let mut entries = self.entries.lock();
        match entries.get_mut(&id) {
            Some(entry) if !entry.is_terminal() => {
                let status = outcome.status();
                *entry = outcome;
                on_write(status);
                self.settled.notify_all();
                true
            }
            _ => false,
        }
    }

    /// Current status without consuming anything
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.entries.lock().get(&id).map(TaskOutcome::status)
    }

    /// Non-blocking read. Terminal entries are removed by the read.
    pub fn take(&self, id: TaskId) -> Result<TaskOutcome<T>, SchedulerError> {
        let mut entries = self.entries.lock();
        match entries.get(&id) {
            None => Err(SchedulerError::TaskMissing(id)),
            Some(TaskOutcome::Queued) => Ok(TaskOutcome::Queued),
            Some(_) => entries.remove(&id).ok_or(SchedulerError::TaskMissing(id)),
        }
    }

    /// Block until the entry is terminal, then consume it.
    ///
    /// With a `limit`, returns `Queued` if it elapses first. A limit too far
    /// in the future to represent waits without one.
    pub fn wait(
        &self,
        id: TaskId,
        limit: Option<Duration>,
    ) -> Result<TaskOutcome<T>, SchedulerError> {
        let deadline = limit.and_then(|limit| Instant::now().checked_add(limit));
        let mut entries = self.entries.lock();
        loop {
            match entries.get(&id) {
                None => return Err(SchedulerError::TaskMissing(id)),
                Some(TaskOutcome::Queued) => {}
                Some(_) => {
                    return entries.remove(&id).ok_or(SchedulerError::TaskMissing(id));
                }
            }

            match deadline {
                Some(deadline) => {
                    if self.settled.wait_until(&mut entries, deadline).timed_out()
                        && matches!(entries.get(&id), Some(TaskOutcome::Queued))
                    {
                        return Ok(TaskOutcome::Queued);
                    }
                }
                None => self.settled.wait(&mut entries),
            }
        }
    }

    /// Drop an entry regardless of state (used to roll back a failed submission)
    pub(crate) fn remove(&self, id: TaskId) -> Option<TaskOutcome<T>> {
        self.entries.lock().remove(&id)
    }

    /// Number of entries still waiting for an outcome
    pub fn queued_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|outcome| !outcome.is_terminal())
            .count()
    }

    /// Number of entries, terminal or not
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T> Default for ResultTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
