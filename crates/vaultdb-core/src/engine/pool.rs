//! Shared cache of open database connections.
//!
//! The application keeps its long-lived connections here. SQLCipher holds
//! cipher state per connection, so the orchestrator clears the pool before
//! every transform to keep a stale keyed connection from interfering with
//! the transient connections it opens.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use super::{open_keyed, ensure_readable};
use super::key::CipherKey;
use crate::config::CipherSettings;
use crate::error::{Phase, Result, VaultError};

/// Cloneable handle to a set of open connections keyed by path.
#[derive(Clone, Default)]
pub struct ConnectionPool {
    connections: Arc<Mutex<HashMap<PathBuf, Connection>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Connection>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open (or replace) the pooled connection for `path`.
    ///
    /// The connection is keyed with `key` when given and must be able to
    /// read the schema before it is cached.
    pub fn open(&self, path: &Path, key: Option<&CipherKey>, cipher: &CipherSettings) -> Result<()> {
        let conn = open_keyed(path, key, cipher, false)?;
        ensure_readable(&conn, Phase::Open, key.is_some())?;
        self.lock().insert(path.to_path_buf(), conn);
        tracing::debug!(path = %path.display(), "pooled connection opened");
        Ok(())
    }

    /// Run `f` against the pooled connection for `path`.
    pub fn with_connection<T>(
        &self,
        path: &Path,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let guard = self.lock();
        let conn = guard.get(path).ok_or_else(|| {
            VaultError::InvalidArgument(format!("No open connection for {}", path.display()))
        })?;
        f(conn).map_err(|e| VaultError::engine(Phase::Open, e))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Close every pooled connection.
    pub fn clear(&self) {
        let drained: Vec<(PathBuf, Connection)> = self.lock().drain().collect();
        for (path, conn) in drained {
            if let Err((_, err)) = conn.close() {
                tracing::warn!(path = %path.display(), error = %err, "pooled connection did not close cleanly");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("open", &self.len())
            .finish()
    }
}
