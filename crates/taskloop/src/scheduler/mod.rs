//! Task Scheduler: single event loop, many producers
//!
//! One loop thread (a current-thread tokio runtime driving a `LocalSet`)
//! starts, awaits and cancels every task. Producer threads submit work and
//! cancellation requests over a command channel, and read outcomes from a
//! shared result table.

mod handles;
mod reactor;
mod results;
#[allow(clippy::module_inception)]
mod scheduler;
mod stats;
mod task;

pub use results::ResultTable;
pub use scheduler::{LoopThread, TaskScheduler};
pub use stats::SchedulerStats;
pub use task::{
    BoxError, Callback, CancelOptions, ScheduleOptions, ScheduleReply, TaskFailure, TaskId,
    TaskOutcome, TaskStatus,
};
