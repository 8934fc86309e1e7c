//! Task identity, lifecycle state and outcome types

use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Error type produced by work and callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Work as stored on the way to the loop
pub(crate) type BoxWork<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send + 'static>>;

/// Post-completion hook, run on the loop thread with the produced value
pub type Callback<T> = Box<dyn FnOnce(&T) -> Result<(), BoxError> + Send + 'static>;

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TaskId)
    }
}

/// Lifecycle state of a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Submitted, no outcome yet
    Queued,
    /// Work produced a value
    Completed,
    /// Work (or its callback) raised or panicked
    Failed,
    /// Cancelled before or while running
    Cancelled,
    /// Deadline elapsed before the work finished
    Timeout,
}

impl TaskStatus {
    /// True for every state except `Queued`
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Queued)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task ended in `Failed`
#[derive(Debug, Error)]
pub enum TaskFailure {
    /// The work returned an error
    #[error("{0}")]
    Work(BoxError),

    /// The work panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The work succeeded but its callback failed; the value is discarded
    #[error("callback failed: {0}")]
    Callback(BoxError),
}

/// Current outcome of a Task: the `(status, value)` pair of a result entry
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Queued,
    Completed(T),
    Failed(TaskFailure),
    Cancelled,
    Timeout,
}

impl<T> TaskOutcome<T> {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Queued => TaskStatus::Queued,
            TaskOutcome::Completed(_) => TaskStatus::Completed,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
            TaskOutcome::Cancelled => TaskStatus::Cancelled,
            TaskOutcome::Timeout => TaskStatus::Timeout,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Borrow the produced value (Completed only)
    pub fn value(&self) -> Option<&T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Take the produced value (Completed only)
    pub fn into_value(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the captured failure (Failed only)
    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result of [`schedule`](crate::TaskScheduler::schedule)
#[derive(Debug)]
pub enum ScheduleReply<T> {
    /// Non-blocking submission; poll the id later
    Pending(TaskId),
    /// Blocking submission; the consumed terminal outcome
    Finished(TaskId, TaskOutcome<T>),
}

impl<T> ScheduleReply<T> {
    pub fn id(&self) -> TaskId {
        match self {
            ScheduleReply::Pending(id) | ScheduleReply::Finished(id, _) => *id,
        }
    }

    pub fn into_outcome(self) -> Option<TaskOutcome<T>> {
        match self {
            ScheduleReply::Pending(_) => None,
            ScheduleReply::Finished(_, outcome) => Some(outcome),
        }
    }
}

/// Timeout choice for one submission
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub(crate) enum TimeoutSetting {
    /// Use `SchedulerConfig::default_timeout_ms`
    #[default]
    Inherit,
    Never,
    After(Duration),
}

impl TimeoutSetting {
    pub(crate) fn resolve(self, default: Option<Duration>) -> Option<Duration> {
        match self {
            TimeoutSetting::Inherit => default,
            TimeoutSetting::Never => None,
            TimeoutSetting::After(limit) => Some(limit),
        }
    }
}

/// Options for [`schedule`](crate::TaskScheduler::schedule)
pub struct ScheduleOptions<T> {
    pub(crate) block: bool,
    pub(crate) callback: Option<Callback<T>>,
    pub(crate) timeout: TimeoutSetting,
}

impl<T> Default for ScheduleOptions<T> {
    fn default() -> Self {
        Self {
            block: false,
            callback: None,
            timeout: TimeoutSetting::Inherit,
        }
    }
}

impl<T> ScheduleOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the terminal outcome instead of returning the id
    pub fn blocking(mut self) -> Self {
        self.block = true;
        self
    }

    /// Abandon the work if it runs longer than `limit` after starting
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = TimeoutSetting::After(limit);
        self
    }

    /// Wait indefinitely, even if the config sets a default timeout
    pub fn no_timeout(mut self) -> Self {
        self.timeout = TimeoutSetting::Never;
        self
    }

    /// Run `callback` on the loop thread with the value on success
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&T) -> Result<(), BoxError> + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl<T> fmt::Debug for ScheduleOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleOptions")
            .field("block", &self.block)
            .field("callback", &self.callback.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Options for [`cancel`](crate::TaskScheduler::cancel)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CancelOptions {
    /// Wait until the loop has applied (or rejected) the cancellation
    pub block: bool,
    /// Report cancelling a finished task as `InvalidState`
    pub raise_exception: bool,
}

impl Default for CancelOptions {
    fn default() -> Self {
        Self {
            block: true,
            raise_exception: true,
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_task_id_parse_display() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::Timeout.is_terminal());
        assert_eq!(TaskStatus::Timeout.to_string(), "TIMEOUT");
    }

    #[test]
    fn test_outcome_accessors() {
        let done: TaskOutcome<i32> = TaskOutcome::Completed(7);
        assert_eq!(done.status(), TaskStatus::Completed);
        assert_eq!(done.value(), Some(&7));
        assert_eq!(done.into_value(), Some(7));

        let failed: TaskOutcome<i32> = TaskOutcome::Failed(TaskFailure::Work("boom".into()));
        assert_eq!(failed.status(), TaskStatus::Failed);
        assert_eq!(failed.failure().unwrap().to_string(), "boom");
        assert!(failed.into_value().is_none());
    }

    #[test]
    fn test_timeout_setting_resolve() {
        let default = Some(Duration::from_secs(5));
        assert_eq!(TimeoutSetting::Inherit.resolve(default), default);
        assert_eq!(TimeoutSetting::Never.resolve(default), None);
        assert_eq!(
            TimeoutSetting::After(Duration::from_millis(10)).resolve(default),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_cancel_options_default() {
        let options = CancelOptions::default();
        assert!(options.block);
        assert!(options.raise_exception);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(3u8)), "unknown panic payload");
    }
}
