//! Taskloop: a single event-loop task scheduler
//!
//! One loop thread owns every running task. Any number of producer threads
//! submit work, poll or wait for outcomes, and request cancellation through
//! a [`TaskScheduler`] shared by `Arc`.
//!
//! ```ignore
//! let scheduler = Arc::new(TaskScheduler::<u32>::new(SchedulerConfig::default()));
//! let loop_thread = scheduler.start_in_background()?;
//! let id = scheduler.submit(|| async { Ok::<_, BoxError>(42) })?;
//! let outcome = scheduler.wait_result(id, None)?;
//! loop_thread.shutdown()?;
//! ```

pub mod config;
pub mod error;
pub mod scheduler;

pub use config::{ConfigError, SchedulerConfig};
pub use error::SchedulerError;
pub use scheduler::{
    BoxError, Callback, CancelOptions, LoopThread, ResultTable, ScheduleOptions, ScheduleReply,
    SchedulerStats, TaskFailure, TaskId, TaskOutcome, TaskScheduler, TaskStatus,
};
