//! Main task scheduler: the producer-facing API over the event loop

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::scheduler::reactor::{Command, Reactor, Submission};
use crate::scheduler::results::ResultTable;
use crate::scheduler::stats::{Counters, SchedulerStats};
use crate::scheduler::task::{
    BoxError, BoxWork, CancelOptions, ScheduleOptions, ScheduleReply, TaskId, TaskOutcome,
};
use crossbeam::channel;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::LocalSet;
use tracing::{debug, info, warn};

const LOOP_IDLE: u8 = 0;
const LOOP_RUNNING: u8 = 1;
const LOOP_STOPPED: u8 = 2;

/// State shared between producer threads and the loop
pub(crate) struct Shared<T> {
    pub(crate) results: ResultTable<T>,
    pub(crate) counters: Counters,
    /// Submissions sent but not yet received by the loop
    pub(crate) pending: AtomicUsize,
}

impl<T> Shared<T> {
    /// Record a terminal outcome (write-once) and count it.
    ///
    /// The count is taken before waiters wake, so `stats()` never lags a
    /// consumed outcome.
    pub(crate) fn settle(&self, id: TaskId, outcome: TaskOutcome<T>) -> bool {
        let status = outcome.status();
        let written = self.results.finish_with(id, outcome, |status| {
            self.counters.record_terminal(status);
        });
        if written {
            debug!(task_id = %id, %status, "task settled");
        }
        written
    }
}

/// Single-loop task scheduler.
///
/// Construct once, share by `Arc`, and run the loop with [`start`](Self::start)
/// on a dedicated thread (or use [`start_in_background`](Self::start_in_background)).
pub struct TaskScheduler<T> {
    config: SchedulerConfig,
    shared: Arc<Shared<T>>,
    commands: UnboundedSender<Command<T>>,
    /// Taken by the first `start()`
    receiver: Mutex<Option<UnboundedReceiver<Command<T>>>>,
    state: AtomicU8,
    /// Thread running the loop; blocking calls from it are refused
    loop_thread: Mutex<Option<ThreadId>>,
}

impl<T: Send + 'static> TaskScheduler<T> {
    /// Create a scheduler. The loop does not run until `start()`.
    pub fn new(config: SchedulerConfig) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        Self {
            config,
            shared: Arc::new(Shared {
                results: ResultTable::new(),
                counters: Counters::default(),
                pending: AtomicUsize::new(0),
            }),
            commands,
            receiver: Mutex::new(Some(receiver)),
            state: AtomicU8::new(LOOP_IDLE),
            loop_thread: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run the event loop on the calling thread until `stop()`.
    ///
    /// Only the first call runs the loop; later calls return immediately.
    pub fn start(&self) -> Result<(), SchedulerError> {
        self.run_loop(None)
    }

    /// Spawn a named thread running the loop and wait until it accepts work.
    pub fn start_in_background(self: &Arc<Self>) -> Result<LoopThread<T>, SchedulerError> {
        if self.state.load(Ordering::Acquire) != LOOP_IDLE {
            return Err(SchedulerError::AlreadyStarted);
        }

        let (ready_tx, ready_rx) = channel::bounded(1);
        let scheduler = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || scheduler.run_loop(Some(ready_tx)))?;

        match ready_rx.recv() {
            Ok(()) => Ok(LoopThread {
                scheduler: Arc::clone(self),
                handle: Some(handle),
            }),
            // The thread exited without running the loop
            Err(_) => match handle.join() {
                Ok(Err(e)) => Err(e),
                Ok(Ok(())) => Err(SchedulerError::AlreadyStarted),
                Err(_) => Err(SchedulerError::Runtime(std::io::Error::other(
                    "event loop thread panicked during startup",
                ))),
            },
        }
    }

    fn run_loop(&self, ready: Option<channel::Sender<()>>) -> Result<(), SchedulerError> {
        let Some(receiver) = self.receiver.lock().take() else {
            warn!("event loop already started");
            return Ok(());
        };

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                *self.receiver.lock() = Some(receiver);
                return Err(SchedulerError::Runtime(e));
            }
        };

        *self.loop_thread.lock() = Some(thread::current().id());
        self.state.store(LOOP_RUNNING, Ordering::Release);
        info!(thread = ?thread::current().name(), "event loop started");
        if let Some(ready) = ready {
            let _ = ready.send(());
        }

        let reactor = Reactor::new(Arc::clone(&self.shared));
        LocalSet::new().block_on(&runtime, reactor.run(receiver));

        self.state.store(LOOP_STOPPED, Ordering::Release);
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), SchedulerError> {
        match self.state.load(Ordering::Acquire) {
            LOOP_IDLE => Err(SchedulerError::NotInitialized),
            LOOP_STOPPED => Err(SchedulerError::Stopped),
            _ => Ok(()),
        }
    }

    /// Refuse a blocking call made from work or a callback on the loop thread
    fn ensure_off_loop(&self) -> Result<(), SchedulerError> {
        if *self.loop_thread.lock() == Some(thread::current().id()) {
            return Err(SchedulerError::BlockingOnLoop);
        }
        Ok(())
    }

    /// Submit work from any thread.
    ///
    /// `work` is invoked on the loop thread when the task starts. Without
    /// `blocking()` the id is returned at once; with it, the call waits for
    /// the terminal outcome and consumes it. A blocking submission from the
    /// loop thread fails with `BlockingOnLoop`.
    pub fn schedule<F, Fut, E>(
        &self,
        work: F,
        options: ScheduleOptions<T>,
    ) -> Result<ScheduleReply<T>, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.ensure_running()?;
        if options.block {
            self.ensure_off_loop()?;
        }

        let ScheduleOptions {
            block,
            callback,
            timeout,
        } = options;
        let id = TaskId::new();
        let work: BoxWork<T> = Box::pin(async move { work().await.map_err(Into::into) });
        let submission = Submission {
            id,
            work,
            callback,
            timeout: timeout.resolve(self.config.default_timeout()),
        };

        self.shared.results.insert_queued(id);
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if self.commands.send(Command::Submit(submission)).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            self.shared.results.remove(id);
            return Err(SchedulerError::Stopped);
        }
        self.shared.counters.record_scheduled();
        debug!(task_id = %id, block, "task scheduled");

        if !block {
            return Ok(ScheduleReply::Pending(id));
        }
        let outcome = self.shared.results.wait(id, None)?;
        Ok(ScheduleReply::Finished(id, outcome))
    }

    /// Non-blocking submit with default options
    pub fn submit<F, Fut, E>(&self, work: F) -> Result<TaskId, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.schedule(work, ScheduleOptions::new()).map(|reply| reply.id())
    }

    /// Submit and wait for the terminal outcome. Not callable from the loop thread.
    pub fn run<F, Fut, E>(&self, work: F) -> Result<TaskOutcome<T>, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let reply = self.schedule(work, ScheduleOptions::new().blocking())?;
        let id = reply.id();
        reply.into_outcome().ok_or(SchedulerError::TaskMissing(id))
    }

    /// Non-blocking peek. A terminal outcome is removed by this read.
    pub fn check_result(&self, id: TaskId) -> Result<TaskOutcome<T>, SchedulerError> {
        self.shared.results.take(id)
    }

    /// Block until the task is terminal (or `limit` elapses) and consume it.
    ///
    /// Fails with `BlockingOnLoop` when called from the loop thread, where
    /// waiting would stall the task it waits for.
    pub fn wait_result(
        &self,
        id: TaskId,
        limit: Option<Duration>,
    ) -> Result<TaskOutcome<T>, SchedulerError> {
        self.ensure_off_loop()?;
        self.shared.results.wait(id, limit)
    }

    /// Request cooperative cancellation of a task.
    ///
    /// With `block`, fails with `BlockingOnLoop` when called from the loop thread.
    pub fn cancel(&self, id: TaskId, options: CancelOptions) -> Result<(), SchedulerError> {
        if options.block {
            self.ensure_off_loop()?;
        }

        match self.shared.results.status(id) {
            None => return Err(SchedulerError::TaskMissing(id)),
            Some(status) if status.is_terminal() => {
                return Self::reject_finished(id, options);
            }
            Some(_) => {}
        }

        let (ack_tx, ack_rx) = if options.block {
            let (tx, rx) = channel::bounded(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        self.commands
            .send(Command::Cancel { id, ack: ack_tx })
            .map_err(|_| SchedulerError::Stopped)?;

        let Some(ack_rx) = ack_rx else {
            return Ok(());
        };
        match ack_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(SchedulerError::InvalidState(_))) => Self::reject_finished(id, options),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SchedulerError::Stopped),
        }
    }

    fn reject_finished(id: TaskId, options: CancelOptions) -> Result<(), SchedulerError> {
        if options.raise_exception {
            Err(SchedulerError::InvalidState(id))
        } else {
            Ok(())
        }
    }

    /// Cancel all active tasks and stop the loop.
    ///
    /// Returns how many submissions were still waiting in the queue.
    pub fn stop(&self) -> Result<usize, SchedulerError> {
        self.ensure_running()?;

        let pending = self.shared.pending.load(Ordering::Acquire);
        if pending > 0 && self.config.log_queue_warnings {
            warn!(pending, "stopping event loop with unconsumed submissions in the queue");
        }

        self.commands
            .send(Command::Stop)
            .map_err(|_| SchedulerError::Stopped)?;
        Ok(pending)
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == LOOP_RUNNING
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.counters.snapshot(
            self.shared.results.queued_count(),
            self.shared.pending.load(Ordering::Acquire),
        )
    }
}

/// Guard for a loop started with [`TaskScheduler::start_in_background`].
///
/// Dropping it stops the loop and joins the thread.
pub struct LoopThread<T: Send + 'static> {
    scheduler: Arc<TaskScheduler<T>>,
    handle: Option<JoinHandle<Result<(), SchedulerError>>>,
}

impl<T: Send + 'static> LoopThread<T> {
    pub fn scheduler(&self) -> &Arc<TaskScheduler<T>> {
        &self.scheduler
    }

    /// Stop the loop and wait (bounded by `join_timeout_ms`) for the thread.
    ///
    /// Returns the number of submissions still queued at stop time.
    pub fn shutdown(mut self) -> Result<usize, SchedulerError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<usize, SchedulerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(0);
        };

        let stopped = self.scheduler.stop();
        join_with_timeout(handle, self.scheduler.config.join_timeout());
        match stopped {
            Err(SchedulerError::Stopped) => Ok(0),
            other => other,
        }
    }
}

impl<T: Send + 'static> Drop for LoopThread<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            debug!(error = %e, "event loop shutdown on drop failed");
        }
    }
}

/// Join a thread with timeout, detach if stuck.
fn join_with_timeout(handle: JoinHandle<Result<(), SchedulerError>>, timeout: Duration) {
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "event loop exited with an error"),
                Err(_) => warn!("event loop thread panicked"),
            }
            return;
        }
        if start.elapsed() > timeout {
            warn!(?timeout, "event loop thread did not exit in time; detaching");
            drop(handle);
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
