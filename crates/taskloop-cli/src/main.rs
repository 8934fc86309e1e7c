//! Taskloop CLI
//!
//! Drives synthetic workloads through the scheduler and prints what
//! happened to every task.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskloop")]
#[command(about = "Single event-loop task scheduler", long_about = None)]
#[command(version)]
struct Cli {
    /// Colorize output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload and report task outcomes
    Run {
        /// Scheduler config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of tasks to submit
        #[arg(short = 'n', long, default_value_t = 100)]
        tasks: usize,
        /// How long each task sleeps
        #[arg(long, default_value_t = 10)]
        sleep_ms: u64,
        /// Per-task timeout (overrides the config default)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Make every K-th task fail
        #[arg(long)]
        fail_every: Option<usize>,
        /// Cancel every K-th task right after submitting it
        #[arg(long)]
        cancel_every: Option<usize>,
        /// Producer threads (defaults to the number of CPUs)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective scheduler configuration as TOML
    Config {
        /// Scheduler config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let color = output::resolve_color_choice(cli.color.as_deref());

    match cli.command {
        Commands::Run {
            config,
            tasks,
            sleep_ms,
            timeout_ms,
            fail_every,
            cancel_every,
            threads,
            json,
        } => commands::run::execute(
            commands::run::Workload {
                config,
                tasks,
                sleep_ms,
                timeout_ms,
                fail_every,
                cancel_every,
                threads: threads.unwrap_or_else(num_cpus::get),
            },
            json,
            color,
        ),

        Commands::Config { config } => commands::config::execute(config),
    }
}
