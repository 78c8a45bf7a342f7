//! Path resolution for config and database files.

use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::config::{default_config_path, read_config, CliConfig};
use crate::constants::CONFIG_ENV;
use crate::errors::CliError;

/// Resolve the config file path, checking VAULTDB_CONFIG first.
pub fn resolve_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var(CONFIG_ENV) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    default_config_path()
}

/// Load the config file; a missing file means "all defaults".
pub fn load_config(path: &Path) -> anyhow::Result<CliConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(CliConfig::default());
    }
    read_config(path)
}

/// Resolve the database path from CLI args, then config.
pub fn resolve_database_path(cli: &Cli, config: &CliConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = cli.database.as_deref().filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = config.database.path.as_deref().filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Err(CliError::not_found(
        "No database path configured.",
        "Hint: Pass --database, set VAULTDB_PATH, or add [database] path to the config file.",
    )
    .into())
}
