//! Scheduler API errors
//!
//! Only misuse of the API surfaces here. Failures of individual tasks are
//! recorded in their outcome as a [`TaskFailure`](crate::TaskFailure).

use crate::scheduler::TaskId;
use thiserror::Error;

/// Errors returned by [`TaskScheduler`](crate::TaskScheduler) operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The event loop has not been started yet
    #[error("Scheduler not initialized: start() must run before this operation")]
    NotInitialized,

    /// The event loop is already running
    #[error("Scheduler already started")]
    AlreadyStarted,

    /// A blocking call was made from the loop thread, which would deadlock it
    #[error("Blocking call on the event loop thread would deadlock")]
    BlockingOnLoop,

    /// The event loop has exited and accepts no more commands
    #[error("Scheduler stopped")]
    Stopped,

    /// No entry exists for the id (never scheduled or already consumed)
    #[error("Task missing: {0}")]
    TaskMissing(TaskId),

    /// The task already reached a terminal state
    #[error("Invalid state: cannot cancel a finished task ({0})")]
    InvalidState(TaskId),

    /// The loop runtime or its thread could not be created
    #[error("Failed to create event loop: {0}")]
    Runtime(#[from] std::io::Error),
}
