//! Shared helpers for scheduler integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::time::Duration;
use taskloop::{BoxError, LoopThread, SchedulerConfig, TaskScheduler};
use tracing_subscriber::EnvFilter;

pub type BoxedWork<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;

static INIT_LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per test binary (honors RUST_LOG)
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}

/// A scheduler with its loop running on a background thread
pub fn start_scheduler<T: Send + 'static>() -> (Arc<TaskScheduler<T>>, LoopThread<T>) {
    start_scheduler_with(SchedulerConfig::default())
}

pub fn start_scheduler_with<T: Send + 'static>(
    config: SchedulerConfig,
) -> (Arc<TaskScheduler<T>>, LoopThread<T>) {
    init_test_logging();
    let scheduler = Arc::new(TaskScheduler::new(config));
    let loop_thread = scheduler
        .start_in_background()
        .expect("failed to start event loop");
    (scheduler, loop_thread)
}

/// Work that sleeps and then yields `value`
pub fn sleep_then<T: Send + 'static>(
    delay: Duration,
    value: T,
) -> impl FnOnce() -> BoxedWork<T> + Send + 'static {
    move || {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        })
    }
}

/// Formatted log output collected in memory
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with warnings emitted on this thread recorded
pub fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, CapturedLogs) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs)
}
