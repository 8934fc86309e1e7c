//! `taskloop run`: Drive a synthetic workload through the scheduler.

use crate::output::StyledOutput;
use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taskloop::{
    BoxError, CancelOptions, ScheduleOptions, SchedulerError, SchedulerStats, TaskId,
    TaskScheduler, TaskStatus,
};
use termcolor::ColorChoice;
use tracing::info;

/// What to submit
#[derive(Debug, Clone)]
pub struct Workload {
    pub config: Option<PathBuf>,
    pub tasks: usize,
    pub sleep_ms: u64,
    pub timeout_ms: Option<u64>,
    pub fail_every: Option<usize>,
    pub cancel_every: Option<usize>,
    pub threads: usize,
}

/// Per-producer copy of the workload shape
#[derive(Debug, Clone, Copy)]
struct Plan {
    tasks: usize,
    threads: usize,
    sleep: Duration,
    timeout: Option<Duration>,
    fail_every: Option<usize>,
    cancel_every: Option<usize>,
}

impl From<&Workload> for Plan {
    fn from(workload: &Workload) -> Self {
        Self {
            tasks: workload.tasks,
            threads: workload.threads,
            sleep: Duration::from_millis(workload.sleep_ms),
            timeout: workload.timeout_ms.map(Duration::from_millis),
            fail_every: workload.fail_every,
            cancel_every: workload.cancel_every,
        }
    }
}

/// Outcome counts for one run
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timed_out: usize,
    pub elapsed_ms: u64,
    pub stats: SchedulerStats,
}

impl RunReport {
    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
            TaskStatus::Timeout => self.timed_out += 1,
            TaskStatus::Queued => {}
        }
    }
}

pub fn execute(workload: Workload, json: bool, color: ColorChoice) -> anyhow::Result<()> {
    let report = run_workload(&workload)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, color);
    }
    Ok(())
}

/// Submit the workload from `threads` producers and wait for every outcome.
pub fn run_workload(workload: &Workload) -> anyhow::Result<RunReport> {
    anyhow::ensure!(workload.threads > 0, "--threads must be at least 1");

    let config = super::load_config(workload.config.as_deref())?;
    let scheduler = Arc::new(TaskScheduler::<usize>::new(config));
    let loop_thread = scheduler
        .start_in_background()
        .context("starting event loop")?;
    let started = Instant::now();
    let plan = Plan::from(workload);

    let producers: Vec<_> = (0..plan.threads)
        .map(|producer| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || submit_share(&scheduler, &plan, producer))
        })
        .collect();

    let mut ids = Vec::with_capacity(plan.tasks);
    for producer in producers {
        let submitted = producer
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
        ids.extend(submitted);
    }

    let mut report = RunReport {
        tasks: ids.len(),
        ..RunReport::default()
    };
    for id in ids {
        report.record(scheduler.wait_result(id, None)?.status());
    }
    report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    report.stats = scheduler.stats();

    let pending = loop_thread.shutdown()?;
    info!(pending, tasks = report.tasks, "workload finished");
    Ok(report)
}

/// Submit every `threads`-th task starting at `producer`
fn submit_share(
    scheduler: &TaskScheduler<usize>,
    plan: &Plan,
    producer: usize,
) -> Result<Vec<TaskId>, SchedulerError> {
    let mut ids = Vec::new();
    for index in (producer..plan.tasks).step_by(plan.threads) {
        let sleep = plan.sleep;
        let fail = every(plan.fail_every, index);

        let mut options = ScheduleOptions::new();
        if let Some(limit) = plan.timeout {
            options = options.timeout(limit);
        }

        let id = scheduler
            .schedule(
                move || async move {
                    tokio::time::sleep(sleep).await;
                    if fail {
                        return Err(BoxError::from(format!("task {} failed on purpose", index)));
                    }
                    Ok(index)
                },
                options,
            )?
            .id();

        if every(plan.cancel_every, index) {
            let quiet = CancelOptions {
                block: false,
                raise_exception: false,
            };
            scheduler.cancel(id, quiet)?;
        }
        ids.push(id);
    }
    Ok(ids)
}

/// True for the k-th, 2k-th, ... task (1-based)
fn every(k: Option<usize>, index: usize) -> bool {
    matches!(k, Some(k) if k > 0 && (index + 1) % k == 0)
}

fn print_report(report: &RunReport, color: ColorChoice) {
    let mut out = StyledOutput::new(color);
    out.header(&format!(
        "{} tasks in {} ms",
        report.tasks, report.elapsed_ms
    ));
    out.status_line(TaskStatus::Completed, report.completed);
    out.status_line(TaskStatus::Failed, report.failed);
    out.status_line(TaskStatus::Cancelled, report.cancelled);
    out.status_line(TaskStatus::Timeout, report.timed_out);
    out.dim(&format!(
        "scheduled={} active={} pending={}",
        report.stats.scheduled, report.stats.active, report.stats.pending
    ));
}
