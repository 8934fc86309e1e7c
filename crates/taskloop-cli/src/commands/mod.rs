//! CLI command implementations

pub mod config;
pub mod run;

use anyhow::Context;
use std::path::Path;
use taskloop::SchedulerConfig;

/// Load the config file if one was given, otherwise the defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("loading scheduler config from {}", path.display())),
        None => Ok(SchedulerConfig::default()),
    }
}
