use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use winewarden_core::config::{Config, ConfigPaths};

pub mod policy;
pub mod replay;
pub mod report;
pub mod trust;

pub(crate) fn load_config(config_path: Option<PathBuf>, paths: &ConfigPaths) -> Result<(Config, PathBuf)> {
    let config_path = config_path.unwrap_or_else(|| paths.config_path.clone());
    let config = Config::load(&config_path).with_context(|| {
        format!(
            "load config at {} (run `winewarden init` if missing)",
            config_path.display()
        )
    })?;
    Ok((config, config_path))
}

/// Relative paths on the command line are taken from the working directory.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolve current directory")?;
    Ok(cwd.join(path))
}
