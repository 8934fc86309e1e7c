//! Event loop: the single thread that starts, awaits and cancels tasks
//!
//! Producer threads talk to the loop only through [`Command`]s on one
//! unbounded channel. Commands are handled in arrival order, so a task's
//! `Submit` is always seen before any `Cancel` for it. Each submission is
//! spawned as its own local task, supervised by a second local task that
//! applies the deadline, runs the callback and records the outcome.

use crate::error::SchedulerError;
use crate::scheduler::handles::TaskHandleTable;
use crate::scheduler::scheduler::Shared;
use crate::scheduler::task::{
    panic_message, BoxError, BoxWork, Callback, TaskFailure, TaskId, TaskOutcome, TaskStatus,
};
use crossbeam::channel::Sender;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

// ============================================================================
// Channel message types
// ============================================================================

/// Work handed from a producer thread to the loop
pub(crate) struct Submission<T> {
    pub(crate) id: TaskId,
    pub(crate) work: BoxWork<T>,
    pub(crate) callback: Option<Callback<T>>,
    pub(crate) timeout: Option<Duration>,
}

/// Requests from producer threads
pub(crate) enum Command<T> {
    Submit(Submission<T>),
    Cancel {
        id: TaskId,
        /// Present when the caller waits for the verdict
        ack: Option<Sender<Result<(), SchedulerError>>>,
    },
    Stop,
}

// ============================================================================
// Reactor
// ============================================================================

/// Loop-side state; created and dropped on the loop thread
pub(crate) struct Reactor<T> {
    shared: Arc<Shared<T>>,
    handles: Rc<TaskHandleTable>,
}

impl<T: Send + 'static> Reactor<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self {
            shared,
            handles: Rc::new(TaskHandleTable::new()),
        }
    }

    /// Dispatch commands until `Stop` arrives. Must run inside a `LocalSet`.
    pub(crate) async fn run(self, mut commands: UnboundedReceiver<Command<T>>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Submit(submission) => {
                    self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                    self.dispatch(submission);
                }
                Command::Cancel { id, ack } => {
                    let verdict = self.cancel(id);
                    if let Some(ack) = ack {
                        let _ = ack.send(verdict);
                    }
                }
                Command::Stop => break,
            }
        }

        self.shutdown(commands);
    }

    // ========================================================================
    // Reactor helpers
    // ========================================================================

    /// Start one submission as an independent task and supervise it.
    fn dispatch(&self, submission: Submission<T>) {
        let Submission {
            id,
            work,
            callback,
            timeout,
        } = submission;

        // Cancelled while it sat in the channel: never start it
        if self.shared.results.status(id) != Some(TaskStatus::Queued) {
            debug!(task_id = %id, "skipping submission that is no longer queued");
            return;
        }

        let running = task::spawn_local(work);
        self.handles.insert(id, running.abort_handle());
        debug!(task_id = %id, ?timeout, in_flight = self.handles.len(), "task started");

        let shared = Arc::clone(&self.shared);
        let handles = Rc::clone(&self.handles);
        task::spawn_local(async move {
            let outcome = supervise(running, callback, timeout).await;
            handles.remove(id);
            // None: aborted by a cancel request, which already recorded the outcome
            if let Some(outcome) = outcome {
                shared.settle(id, outcome);
            }
        });
    }

    /// Apply a cancel request on the loop thread.
    fn cancel(&self, id: TaskId) -> Result<(), SchedulerError> {
        if let Some(handle) = self.handles.remove(id) {
            handle.abort();
            self.shared.settle(id, TaskOutcome::Cancelled);
            debug!(task_id = %id, "running task cancelled");
            return Ok(());
        }

        match self.shared.results.status(id) {
            None => Err(SchedulerError::TaskMissing(id)),
            Some(status) if status.is_terminal() => Err(SchedulerError::InvalidState(id)),
            Some(_) => {
                self.shared.settle(id, TaskOutcome::Cancelled);
                debug!(task_id = %id, "queued task cancelled before start");
                Ok(())
            }
        }
    }

    /// Cancel everything in flight and refuse whatever is still in the channel.
    fn shutdown(self, mut commands: UnboundedReceiver<Command<T>>) {
        let active = self.handles.drain();
        let active_count = active.len();
        for (id, handle) in active {
            handle.abort();
            self.shared.settle(id, TaskOutcome::Cancelled);
        }

        commands.close();
        let mut refused = 0usize;
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Submit(submission) => {
                    self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                    self.shared.settle(submission.id, TaskOutcome::Cancelled);
                    refused += 1;
                }
                Command::Cancel { ack, .. } => {
                    if let Some(ack) = ack {
                        let _ = ack.send(Err(SchedulerError::Stopped));
                    }
                }
                Command::Stop => {}
            }
        }

        if refused > 0 {
            warn!(refused, "event loop stopped before starting queued submissions");
        }
        info!(cancelled = active_count, "event loop stopped");
    }
}

/// Await one task under its deadline and turn the result into an outcome.
///
/// Returns `None` when the task was aborted from outside.
async fn supervise<T>(
    mut running: JoinHandle<Result<T, BoxError>>,
    callback: Option<Callback<T>>,
    timeout: Option<Duration>,
) -> Option<TaskOutcome<T>> {
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut running).await {
            Ok(joined) => joined,
            Err(_) => {
                running.abort();
                return Some(TaskOutcome::Timeout);
            }
        },
        None => running.await,
    };

    match joined {
        Ok(Ok(value)) => Some(match callback {
            Some(callback) => match run_callback(callback, &value) {
                Ok(()) => TaskOutcome::Completed(value),
                Err(failure) => TaskOutcome::Failed(failure),
            },
            None => TaskOutcome::Completed(value),
        }),
        Ok(Err(error)) => Some(TaskOutcome::Failed(TaskFailure::Work(error))),
        Err(join_error) if join_error.is_cancelled() => None,
        Err(join_error) => Some(TaskOutcome::Failed(TaskFailure::Panicked(panic_message(
            join_error.into_panic(),
        )))),
    }
}

/// Run a callback, containing both its error and its panic.
fn run_callback<T>(callback: Callback<T>, value: &T) -> Result<(), TaskFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(TaskFailure::Callback(error)),
        Err(payload) => Err(TaskFailure::Callback(panic_message(payload).into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::TaskFailure;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        task::LocalSet::new().block_on(&runtime, future)
    }

    #[test]
    fn test_supervise_completed() {
        let outcome = block_on(async {
            let running = task::spawn_local(async { Ok::<_, BoxError>(42) });
            supervise(running, None, Some(Duration::from_secs(1))).await
        });
        assert_eq!(outcome.unwrap().into_value(), Some(42));
    }

    #[test]
    fn test_supervise_timeout_aborts_work() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let outcome = block_on(async move {
            let running = task::spawn_local(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            });
            let outcome = supervise(running, None, Some(Duration::from_millis(20))).await;
            tokio::time::sleep(Duration::from_millis(600)).await;
            outcome
        });
        assert!(matches!(outcome, Some(TaskOutcome::Timeout)));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_supervise_work_error() {
        let outcome = block_on(async {
            let running = task::spawn_local(async { Err::<i32, BoxError>("boom".into()) });
            supervise(running, None, None).await
        });
        match outcome {
            Some(TaskOutcome::Failed(TaskFailure::Work(error))) => {
                assert_eq!(error.to_string(), "boom")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_supervise_panic_contained() {
        let outcome = block_on(async {
            let running = task::spawn_local(async {
                if true {
                    panic!("kaboom");
                }
                Ok::<i32, BoxError>(1)
            });
            supervise(running, None, None).await
        });
        match outcome {
            Some(TaskOutcome::Failed(TaskFailure::Panicked(msg))) => assert_eq!(msg, "kaboom"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_supervise_abort_yields_none() {
        let outcome = block_on(async {
            let running = task::spawn_local(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<i32, BoxError>(1)
            });
            running.abort();
            supervise(running, None, None).await
        });
        assert!(outcome.is_none());
    }

    #[test]
    fn test_callback_error_downgrades_to_failed() {
        let outcome = block_on(async {
            let running = task::spawn_local(async { Ok::<_, BoxError>(5) });
            let callback: Callback<i32> = Box::new(|_| Err("callback boom".into()));
            supervise(running, Some(callback), None).await
        });
        match outcome {
            Some(TaskOutcome::Failed(TaskFailure::Callback(error))) => {
                assert_eq!(error.to_string(), "callback boom")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_callback_panic_downgrades_to_failed() {
        let callback: Callback<i32> = Box::new(|_| panic!("callback panic"));
        match run_callback(callback, &1) {
            Err(TaskFailure::Callback(error)) => assert_eq!(error.to_string(), "callback panic"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_callback_sees_value() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let callback: Callback<i32> = Box::new(move |value| {
            *sink.lock() = Some(*value);
            Ok(())
        });
        assert!(run_callback(callback, &9).is_ok());
        assert_eq!(*seen.lock(), Some(9));
    }
}
