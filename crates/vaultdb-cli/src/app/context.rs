//! Application context for the vaultdb CLI.
//!
//! Bundles CLI arguments with the lazily-loaded config so handlers do not
//! thread several parameters around.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::unsync::OnceCell;
use vaultdb_core::{platform_secret_store, ConnectionPool, EncryptionService};

use crate::cli::Cli;
use crate::config::CliConfig;
use crate::errors::classify;

use super::resolver::{load_config, resolve_config_path, resolve_database_path};

pub struct AppContext<'a> {
    cli: &'a Cli,
    config_path: OnceCell<PathBuf>,
    config: OnceCell<CliConfig>,
}

impl<'a> AppContext<'a> {
    pub fn new(cli: &'a Cli) -> Self {
        Self {
            cli,
            config_path: OnceCell::new(),
            config: OnceCell::new(),
        }
    }

    pub fn quiet(&self) -> bool {
        self.cli.quiet
    }

    pub fn config_path(&self) -> anyhow::Result<&Path> {
        self.config_path
            .get_or_try_init(resolve_config_path)
            .map(PathBuf::as_path)
    }

    /// Get the configuration, loading it lazily if needed.
    pub fn config(&self) -> anyhow::Result<&CliConfig> {
        self.config
            .get_or_try_init(|| load_config(self.config_path()?))
    }

    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        resolve_database_path(self.cli, self.config()?)
    }

    /// Build the encryption service with this platform's secret store.
    pub fn service(&self) -> anyhow::Result<EncryptionService> {
        let vault = &self.config()?.vault;
        let store = platform_secret_store(&vault.secret_store, &vault.app.instance_name);
        tracing::debug!(store = store.name(), "secret store selected");
        EncryptionService::new(vault.clone(), Arc::from(store), ConnectionPool::new()).map_err(classify)
    }
}
