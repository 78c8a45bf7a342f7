//! Encrypt, decrypt and rekey whole database files.
//!
//! Every transform writes a new file next to the source
//! (`app.db` → `app.db.encrypted`) and leaves the source untouched. The
//! produced file is reopened and checked before the transform reports
//! success; if anything fails the partial output is deleted. Swapping the
//! produced file into place is a separate, explicit step ([`EncryptionService::promote`]).
//!
//! Remembering or forgetting the key in the secret store happens after the
//! file work has succeeded and never turns a success into a failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::sleep;

use secrecy::ExposeSecret;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::crypto::require_strong_password;
use crate::engine::{self, CipherKey, ConnectionPool, DatabaseStatus};
use crate::error::{Result, VaultError};
use crate::fs::{promote_with_backup, remove_database_files, sibling_path};
use crate::secret_store::{entry_label, SecretStore};
use crate::unlock::UnlockState;

/// What happened to the remembered key after a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretStoreOutcome {
    Stored,
    Removed,
    /// No usable secret store on this device.
    Skipped,
    /// The store was available but the operation failed.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    pub output_path: PathBuf,
    pub secret_store: SecretStoreOutcome,
}

/// Result of a silent unlock attempt at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoUnlock {
    /// The remembered key opened the database.
    Unlocked,
    /// The remembered key no longer opens the database and was deleted.
    StaleSecretCleared,
    /// Nothing usable is remembered; ask the user.
    PromptRequired,
    /// The database was not waiting for a key.
    NotLocked,
}

/// Direction of a transform, used for naming and logging.
#[derive(Debug, Clone, Copy)]
enum Transform {
    Encrypt,
    Decrypt,
    Rekey,
}

impl Transform {
    fn as_str(self) -> &'static str {
        match self {
            Transform::Encrypt => "encrypt",
            Transform::Decrypt => "decrypt",
            Transform::Rekey => "rekey",
        }
    }
}

pub struct EncryptionService {
    config: VaultConfig,
    secret_store: Arc<dyn SecretStore>,
    pool: ConnectionPool,
}

impl EncryptionService {
    /// Build a service over `pool`, the same pool the application uses for
    /// its long-lived connections.
    pub fn new(config: VaultConfig, secret_store: Arc<dyn SecretStore>, pool: ConnectionPool) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            secret_store,
            pool,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Write an encrypted copy of the plaintext database at `source`.
    ///
    /// The password must pass the strength policy. On success the password
    /// is remembered in the secret store when one is available.
    pub fn encrypt_database(&self, source: &Path, password: &str) -> Result<TransformOutcome> {
        self.encrypt_with_key(source, &CipherKey::passphrase(password))
    }

    /// [`encrypt_database`](Self::encrypt_database) with explicit key
    /// material. Raw keys skip the password policy.
    pub fn encrypt_with_key(&self, source: &Path, key: &CipherKey) -> Result<TransformOutcome> {
        check_new_key(key)?;
        let output_path = self.run(
            Transform::Encrypt,
            source,
            None,
            Some(key),
            &self.config.transform.encrypted_suffix,
        )?;
        Ok(TransformOutcome {
            output_path,
            secret_store: self.remember_key(key),
        })
    }

    /// Write a plaintext copy of the encrypted database at `source`.
    ///
    /// A wrong password fails with [`VaultError::IncorrectPassword`] before
    /// anything is written. On success the remembered key is removed.
    pub fn decrypt_database(&self, source: &Path, password: &str) -> Result<TransformOutcome> {
        self.decrypt_with_key(source, &CipherKey::passphrase(password))
    }

    pub fn decrypt_with_key(&self, source: &Path, key: &CipherKey) -> Result<TransformOutcome> {
        check_existing_key(key)?;
        let output_path = self.run(
            Transform::Decrypt,
            source,
            Some(key),
            None,
            &self.config.transform.decrypted_suffix,
        )?;
        Ok(TransformOutcome {
            output_path,
            secret_store: self.forget_key(),
        })
    }

    /// Write a copy of the encrypted database at `source` keyed with
    /// `new_password`, and remember the new password in place of the old.
    pub fn rotate_password(&self, source: &Path, old_password: &str, new_password: &str) -> Result<TransformOutcome> {
        self.rotate_key(
            source,
            &CipherKey::passphrase(old_password),
            &CipherKey::passphrase(new_password),
        )
    }

    pub fn rotate_key(&self, source: &Path, old_key: &CipherKey, new_key: &CipherKey) -> Result<TransformOutcome> {
        check_existing_key(old_key)?;
        check_new_key(new_key)?;
        let output_path = self.run(
            Transform::Rekey,
            source,
            Some(old_key),
            Some(new_key),
            &self.config.transform.rekeyed_suffix,
        )?;
        Ok(TransformOutcome {
            output_path,
            secret_store: self.remember_key(new_key),
        })
    }

    fn run(
        &self,
        transform: Transform,
        source: &Path,
        source_key: Option<&CipherKey>,
        target_key: Option<&CipherKey>,
        suffix: &str,
    ) -> Result<PathBuf> {
        if !source.exists() {
            return Err(VaultError::SourceMissing(source.to_path_buf()));
        }
        let target = sibling_path(source, suffix);
        tracing::info!(
            action = transform.as_str(),
            source = %source.display(),
            target = %target.display(),
            "starting database transform"
        );

        let expected = if source_key.is_some() {
            DatabaseStatus::Encrypted
        } else {
            DatabaseStatus::Plaintext
        };
        match engine::probe(source)? {
            status if status == expected => {}
            DatabaseStatus::Encrypted => {
                return Err(VaultError::InvalidArgument(format!(
                    "Database is already encrypted: {}",
                    source.display()
                )))
            }
            _ => {
                return Err(VaultError::InvalidArgument(format!(
                    "Database is not encrypted: {}",
                    source.display()
                )))
            }
        }

        remove_database_files(&target).map_err(|e| {
            VaultError::io(format!("Failed to remove stale {}", target.display()), e)
        })?;

        // A cached keyed connection to either file would interfere with the
        // transient connections opened below.
        self.pool.clear();

        let cipher = &self.config.cipher;
        if let Err(err) = engine::export_copy(source, source_key, &target, target_key, cipher) {
            self.discard(&target);
            tracing::warn!(action = transform.as_str(), error = %err, "database transform failed");
            return Err(err);
        }

        sleep(self.config.transform.settle_delay());

        if let Err(err) = engine::verify(&target, target_key, cipher) {
            self.discard(&target);
            tracing::warn!(action = transform.as_str(), error = %err, "transformed database failed verification");
            return Err(err);
        }

        tracing::info!(action = transform.as_str(), target = %target.display(), "database transform complete");
        Ok(target)
    }

    fn discard(&self, target: &Path) {
        if let Err(err) = remove_database_files(target) {
            tracing::warn!(path = %target.display(), error = %err, "could not remove partial output");
        }
    }

    /// Replace `original` with `produced`, keeping the previous file as a
    /// backup. Returns the backup path.
    pub fn promote(&self, produced: &Path, original: &Path) -> Result<PathBuf> {
        if !produced.exists() {
            return Err(VaultError::SourceMissing(produced.to_path_buf()));
        }
        self.pool.clear();
        let backup = promote_with_backup(produced, original, &self.config.transform.backup_suffix)
            .map_err(|e| VaultError::io(format!("Failed to replace {}", original.display()), e))?;
        tracing::info!(
            path = %original.display(),
            backup = %backup.display(),
            "promoted transformed database"
        );
        Ok(backup)
    }

    /// Delete a backup left by [`promote`](Self::promote), companions
    /// included.
    pub fn discard_backup(&self, backup: &Path) -> Result<()> {
        remove_database_files(backup)
            .map_err(|e| VaultError::io(format!("Failed to remove {}", backup.display()), e))?;
        tracing::info!(path = %backup.display(), "removed previous database file");
        Ok(())
    }

    pub fn probe_status(&self, path: &Path) -> Result<DatabaseStatus> {
        engine::probe(path)
    }

    /// Remember `key` in the secret store, if there is one.
    pub fn remember_key(&self, key: &CipherKey) -> SecretStoreOutcome {
        if !self.secret_store.is_available() {
            tracing::debug!(store = self.secret_store.name(), "secret store unavailable; key not remembered");
            return SecretStoreOutcome::Skipped;
        }
        let label = entry_label(&self.config.app.instance_name);
        if self.secret_store.store_key(key.stored_form().as_str(), &label) {
            tracing::info!(store = self.secret_store.name(), "key remembered on this device");
            SecretStoreOutcome::Stored
        } else {
            tracing::warn!(store = self.secret_store.name(), "could not remember key on this device");
            SecretStoreOutcome::Failed
        }
    }

    /// Delete the remembered key, if there is a secret store.
    pub fn forget_key(&self) -> SecretStoreOutcome {
        if !self.secret_store.is_available() {
            return SecretStoreOutcome::Skipped;
        }
        if self.secret_store.remove_key() {
            SecretStoreOutcome::Removed
        } else {
            tracing::warn!(store = self.secret_store.name(), "could not remove remembered key");
            SecretStoreOutcome::Failed
        }
    }

    pub fn try_get_key_from_keychain(&self) -> Option<String> {
        if !self.secret_store.is_available() {
            return None;
        }
        self.secret_store.retrieve_key()
    }

    pub fn is_keychain_available(&self) -> bool {
        self.secret_store.is_available()
    }

    pub fn secret_store_name(&self) -> &'static str {
        self.secret_store.name()
    }

    /// Open the locked database with `password` and notify subscribers.
    pub fn unlock(&self, state: &UnlockState, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(VaultError::InvalidArgument(
                "Password cannot be empty".to_string(),
            ));
        }
        self.unlock_with_key(state, &CipherKey::passphrase(password))
    }

    /// Open the locked database with `key`, cache the connection in the pool
    /// and notify subscribers.
    pub fn unlock_with_key(&self, state: &UnlockState, key: &CipherKey) -> Result<()> {
        let path = state.database_path().ok_or_else(|| {
            VaultError::InvalidArgument("No locked database to unlock".to_string())
        })?;
        if !state.needs_unlock() {
            tracing::debug!(path = %path.display(), "database already unlocked");
            return Ok(());
        }
        self.pool.open(&path, Some(key), &self.config.cipher)?;
        state.notify_unlock_success();
        Ok(())
    }

    /// Unlock with the remembered key, if there is one and it still works.
    pub fn try_auto_unlock(&self, state: &UnlockState) -> AutoUnlock {
        if !state.needs_unlock() {
            return AutoUnlock::NotLocked;
        }
        let Some(secret) = self.try_get_key_from_keychain().map(Zeroizing::new) else {
            return AutoUnlock::PromptRequired;
        };
        let key = CipherKey::from_stored(&secret);

        match self.unlock_with_key(state, &key) {
            Ok(()) => AutoUnlock::Unlocked,
            Err(VaultError::IncorrectPassword) => {
                tracing::info!("remembered key no longer opens the database; removing it");
                self.forget_key();
                AutoUnlock::StaleSecretCleared
            }
            Err(err) => {
                tracing::warn!(error = %err, "automatic unlock failed");
                AutoUnlock::PromptRequired
            }
        }
    }
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("instance", &self.config.app.instance_name)
            .field("secret_store", &self.secret_store.name())
            .field("pool", &self.pool)
            .finish()
    }
}

/// Policy for a key that is about to protect a database.
fn check_new_key(key: &CipherKey) -> Result<()> {
    match key {
        CipherKey::Passphrase(secret) => require_strong_password(secret.expose_secret()),
        CipherKey::Raw(_) => Ok(()),
    }
}

/// A key for an existing database only has to be present.
fn check_existing_key(key: &CipherKey) -> Result<()> {
    match key {
        CipherKey::Passphrase(secret) if secret.expose_secret().is_empty() => Err(
            VaultError::InvalidArgument("Password cannot be empty".to_string()),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret_store::MemorySecretStore;
    use rusqlite::Connection;
    use tempfile::{tempdir, TempDir};

    const PASSWORD: &str = "Correct123!Pass";

    fn fast_config() -> VaultConfig {
        let mut config = VaultConfig::default();
        config.transform.settle_delay_ms = 0;
        config
    }

    fn service(store: &MemorySecretStore) -> EncryptionService {
        EncryptionService::new(fast_config(), Arc::new(store.clone()), ConnectionPool::new()).unwrap()
    }

    fn plaintext_db() -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE leases (id INTEGER PRIMARY KEY, unit TEXT NOT NULL);
             INSERT INTO leases (unit) VALUES ('4B'), ('7C');",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn test_encrypt_remembers_password() {
        let (_dir, path) = plaintext_db();
        let store = MemorySecretStore::new("app");
        let service = service(&store);

        let outcome = service.encrypt_database(&path, PASSWORD).unwrap();

        assert_eq!(outcome.output_path, sibling_path(&path, ".encrypted"));
        assert_eq!(outcome.secret_store, SecretStoreOutcome::Stored);
        assert_eq!(store.retrieve_key().as_deref(), Some(PASSWORD));
        assert_eq!(
            service.probe_status(&outcome.output_path).unwrap(),
            DatabaseStatus::Encrypted
        );
        assert_eq!(service.probe_status(&path).unwrap(), DatabaseStatus::Plaintext);
    }

    #[test]
    fn test_encrypt_without_store_still_succeeds() {
        let (_dir, path) = plaintext_db();
        let store = MemorySecretStore::unavailable("app");
        let service = service(&store);

        let outcome = service.encrypt_database(&path, PASSWORD).unwrap();
        assert_eq!(outcome.secret_store, SecretStoreOutcome::Skipped);
        assert!(outcome.output_path.exists());
    }

    #[test]
    fn test_weak_password_rejected_before_io() {
        let (_dir, path) = plaintext_db();
        let store = MemorySecretStore::new("app");
        let service = service(&store);

        let err = service.encrypt_database(&path, "short").unwrap_err();
        assert!(matches!(err, VaultError::WeakPassword(_)));
        assert!(!sibling_path(&path, ".encrypted").exists());
        assert_eq!(store.retrieve_key(), None);
    }

    #[test]
    fn test_raw_key_skips_policy() {
        let (_dir, path) = plaintext_db();
        let store = MemorySecretStore::new("app");
        let service = service(&store);
        let salt = [9u8; crate::crypto::SALT_LEN];
        let key = CipherKey::Raw(crate::crypto::derive_key(PASSWORD, &salt).unwrap());

        let outcome = service.encrypt_with_key(&path, &key).unwrap();
        let stored = store.retrieve_key().unwrap();
        assert!(CipherKey::from_stored(&stored).is_raw());

        let decrypted = service
            .decrypt_with_key(&outcome.output_path, &CipherKey::from_stored(&stored))
            .unwrap();
        assert_eq!(decrypted.secret_store, SecretStoreOutcome::Removed);
    }

    #[test]
    fn test_stale_target_is_replaced() {
        let (_dir, path) = plaintext_db();
        let stale = sibling_path(&path, ".encrypted");
        std::fs::write(&stale, b"left over from a crash").unwrap();
        let store = MemorySecretStore::new("app");

        let outcome = service(&store).encrypt_database(&path, PASSWORD).unwrap();
        assert_eq!(
            engine::probe(&outcome.output_path).unwrap(),
            DatabaseStatus::Encrypted
        );
    }

    #[test]
    fn test_unlock_notifies_and_pools_connection() {
        let (_dir, path) = plaintext_db();
        let store = MemorySecretStore::new("app");
        let service = service(&store);
        let encrypted = service.encrypt_database(&path, PASSWORD).unwrap().output_path;

        let state = UnlockState::new();
        state.mark_locked(&encrypted, None);

        let err = service.unlock(&state, "Wrong123!Pass").unwrap_err();
        assert!(matches!(err, VaultError::IncorrectPassword));
        assert!(state.needs_unlock());

        service.unlock(&state, PASSWORD).unwrap();
        assert!(!state.needs_unlock());
        assert!(service.pool().contains(&encrypted));
        let rows: i64 = service
            .pool()
            .with_connection(&encrypted, |conn| {
                conn.query_row("SELECT count(*) FROM leases", [], |row| row.get(0))
            })
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_auto_unlock_outcomes() {
        let (_dir, path) = plaintext_db();
        let store = MemorySecretStore::new("app");
        let service = service(&store);
        let encrypted = service.encrypt_database(&path, PASSWORD).unwrap().output_path;

        let state = UnlockState::new();
        assert_eq!(service.try_auto_unlock(&state), AutoUnlock::NotLocked);

        state.mark_locked(&encrypted, None);
        assert_eq!(service.try_auto_unlock(&state), AutoUnlock::Unlocked);
        assert!(!state.needs_unlock());

        state.mark_locked(&encrypted, None);
        assert!(store.store_key("Stale123!Secret", "label"));
        assert_eq!(service.try_auto_unlock(&state), AutoUnlock::StaleSecretCleared);
        assert_eq!(store.retrieve_key(), None);
        assert!(state.needs_unlock());

        assert_eq!(service.try_auto_unlock(&state), AutoUnlock::PromptRequired);
    }

    #[test]
    fn test_promote_swaps_files() {
        let (_dir, path) = plaintext_db();
        let store = MemorySecretStore::new("app");
        let service = service(&store);
        let encrypted = service.encrypt_database(&path, PASSWORD).unwrap().output_path;

        let backup = service.promote(&encrypted, &path).unwrap();

        assert_eq!(service.probe_status(&path).unwrap(), DatabaseStatus::Encrypted);
        assert_eq!(service.probe_status(&backup).unwrap(), DatabaseStatus::Plaintext);
        assert!(!encrypted.exists());

        service.discard_backup(&backup).unwrap();
        assert_eq!(service.probe_status(&backup).unwrap(), DatabaseStatus::Missing);
        assert_eq!(service.probe_status(&path).unwrap(), DatabaseStatus::Encrypted);
    }

    #[test]
    fn test_direction_mismatch_is_rejected() {
        let (_dir, path) = plaintext_db();
        let store = MemorySecretStore::new("app");
        let service = service(&store);

        let err = service.decrypt_database(&path, PASSWORD).unwrap_err();
        assert!(err.is_validation());

        let encrypted = service.encrypt_database(&path, PASSWORD).unwrap().output_path;
        let err = service.encrypt_database(&encrypted, PASSWORD).unwrap_err();
        assert!(err.to_string().contains("already encrypted"));
    }

    #[test]
    fn test_direction_mismatch_leaves_stale_output_alone() {
        let (_dir, path) = plaintext_db();
        let stale = sibling_path(&path, ".decrypted");
        std::fs::write(&stale, b"left over from a crash").unwrap();
        let store = MemorySecretStore::new("app");

        let err = service(&store).decrypt_database(&path, PASSWORD).unwrap_err();

        assert!(err.is_validation());
        assert_eq!(std::fs::read(&stale).unwrap(), b"left over from a crash");
    }

    #[test]
    fn test_busy_plaintext_is_not_called_encrypted() {
        let (_dir, path) = plaintext_db();
        let holder = Connection::open(&path).unwrap();
        holder
            .execute_batch(
                "PRAGMA locking_mode = EXCLUSIVE;
                 BEGIN EXCLUSIVE;
                 INSERT INTO leases (unit) VALUES ('9D');",
            )
            .unwrap();
        let store = MemorySecretStore::new("app");

        let err = service(&store).encrypt_database(&path, PASSWORD).unwrap_err();

        assert!(matches!(err, VaultError::Engine { .. }), "got {}", err);
        assert!(!sibling_path(&path, ".encrypted").exists());
        assert_eq!(store.retrieve_key(), None);
    }

    #[test]
    fn test_failed_export_removes_partial_output() {
        use rusqlite::functions::FunctionFlags;

        let dir = tempdir().unwrap();
        let path = dir.path().join("app.db");
        {
            // The CHECK needs a function only this connection knows, so the
            // schema cannot be replayed into the export target.
            let conn = Connection::open(&path).unwrap();
            conn.create_scalar_function(
                "unit_is_valid",
                1,
                FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
                |_| Ok(1i64),
            )
            .unwrap();
            conn.execute_batch(
                "CREATE TABLE units (id INTEGER PRIMARY KEY, code TEXT CHECK (unit_is_valid(code)));
                 INSERT INTO units (code) VALUES ('4B');",
            )
            .unwrap();
        }
        let store = MemorySecretStore::new("app");
        let service = service(&store);
        assert_eq!(service.probe_status(&path).unwrap(), DatabaseStatus::Plaintext);

        let err = service.encrypt_database(&path, PASSWORD).unwrap_err();

        assert!(
            matches!(err, VaultError::Engine { phase: crate::error::Phase::Export, .. }),
            "got {}",
            err
        );
        let target = sibling_path(&path, ".encrypted");
        for leftover in [
            target.clone(),
            sibling_path(&target, "-journal"),
            sibling_path(&target, "-wal"),
            sibling_path(&target, "-shm"),
        ] {
            assert!(!leftover.exists(), "{} was left behind", leftover.display());
        }
        assert_eq!(store.retrieve_key(), None);
        assert_eq!(service.probe_status(&path).unwrap(), DatabaseStatus::Plaintext);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = fast_config();
        config.cipher.kdf_iter = 0;
        let store = MemorySecretStore::new("app");
        assert!(EncryptionService::new(config, Arc::new(store), ConnectionPool::new()).is_err());
    }
}
