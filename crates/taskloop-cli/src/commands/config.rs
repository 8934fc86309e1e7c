//! `taskloop config`: Print the effective configuration.

use std::path::PathBuf;

pub fn execute(config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = super::load_config(config.as_deref())?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
