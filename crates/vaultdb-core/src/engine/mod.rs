//! SQLCipher command protocol.
//!
//! Encryption state is never stored by vaultdb; it is derived by probing:
//! a file that can be queried without a key is plaintext, anything else is
//! treated as encrypted.
//!
//! Moving data between representations uses SQLCipher's
//! attach/export/detach pattern:
//!
//! ```text
//! PRAGMA key = '<source key>';                 -- only when the source is encrypted
//! ATTACH DATABASE '<target>' AS vaultdb_target KEY '<target key or empty>';
//! PRAGMA vaultdb_target.cipher_page_size = ...; -- only when the target is encrypted
//! SELECT sqlcipher_export('vaultdb_target');
//! DETACH DATABASE vaultdb_target;
//! ```

pub mod key;
pub mod pool;

use std::path::Path;

use rusqlite::{Connection, DatabaseName, ErrorCode, OpenFlags};
use serde::Serialize;

pub use key::CipherKey;
pub use pool::ConnectionPool;

use crate::config::CipherSettings;
use crate::error::{Phase, Result, VaultError};

/// Schema alias used for the attached output database.
const TARGET_ALIAS: &str = "vaultdb_target";

/// Protection status of a database file, as observed by probing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseStatus {
    Missing,
    Plaintext,
    Encrypted,
}

/// Open an existing database, keying it when `key` is given. Never creates
/// the file at `path`.
pub(crate) fn open_keyed(
    path: &Path,
    key: Option<&CipherKey>,
    cipher: &CipherSettings,
    read_only: bool,
) -> Result<Connection> {
    if !path.exists() {
        return Err(VaultError::SourceMissing(path.to_path_buf()));
    }

    // Attached databases inherit the main connection's flags, so a writable
    // connection needs CREATE for ATTACH to produce the target file.
    let access = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
    };
    let conn = Connection::open_with_flags(path, access | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        .map_err(|e| VaultError::engine(Phase::Open, e))?;

    if let Some(key) = key {
        conn.pragma_update(None, "key", key.sql_value().as_str())
            .map_err(|e| VaultError::engine(Phase::Open, e))?;
        apply_cipher_settings(&conn, None, cipher)?;
    }
    Ok(conn)
}

/// Set every cipher parameter explicitly instead of relying on library
/// defaults.
fn apply_cipher_settings(conn: &Connection, schema: Option<&str>, cipher: &CipherSettings) -> Result<()> {
    let schema = schema.map(DatabaseName::Attached);
    let configure = |name: &str, result: rusqlite::Result<()>| {
        result.map_err(|e| VaultError::Engine {
            phase: Phase::Configure,
            message: format!("{}: {}", name, e),
        })
    };

    configure(
        "cipher_page_size",
        conn.pragma_update(schema, "cipher_page_size", cipher.page_size),
    )?;
    configure("kdf_iter", conn.pragma_update(schema, "kdf_iter", cipher.kdf_iter))?;
    configure(
        "cipher_kdf_algorithm",
        conn.pragma_update(schema, "cipher_kdf_algorithm", cipher.kdf_algorithm.as_str()),
    )?;
    configure(
        "cipher_hmac_algorithm",
        conn.pragma_update(schema, "cipher_hmac_algorithm", cipher.hmac_algorithm.as_str()),
    )?;
    Ok(())
}

fn is_not_a_database(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::NotADatabase)
}

/// Confirm the connection can read its schema.
///
/// When the connection was keyed, "not a database" means the key is wrong.
pub(crate) fn ensure_readable(conn: &Connection, phase: Phase, keyed: bool) -> Result<()> {
    match conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(_) => Ok(()),
        Err(err) if keyed && is_not_a_database(&err) => Err(VaultError::IncorrectPassword),
        Err(err) if is_not_a_database(&err) => Err(VaultError::Engine {
            phase,
            message: "file is encrypted or is not a database".to_string(),
        }),
        Err(err) => Err(VaultError::engine(phase, err)),
    }
}

/// Copy schema and data from `source` into a new database at `target`.
///
/// `target` must not exist. On error the partially written target is left
/// for the caller to remove.
pub(crate) fn export_copy(
    source: &Path,
    source_key: Option<&CipherKey>,
    target: &Path,
    target_key: Option<&CipherKey>,
    cipher: &CipherSettings,
) -> Result<()> {
    let conn = open_keyed(source, source_key, cipher, false)?;
    ensure_readable(&conn, Phase::Open, source_key.is_some())?;

    let target_str = target.to_str().ok_or_else(|| {
        VaultError::InvalidArgument(format!("Path is not valid UTF-8: {}", target.display()))
    })?;
    let target_key_value = target_key.map(CipherKey::sql_value);
    let key_param: &str = target_key_value.as_ref().map_or("", |value| value.as_str());

    tracing::debug!(source = %source.display(), target = %target.display(), "attaching target");
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {} KEY ?2", TARGET_ALIAS),
        [target_str, key_param],
    )
    .map_err(|e| VaultError::engine(Phase::Attach, e))?;

    if target_key.is_some() {
        apply_cipher_settings(&conn, Some(TARGET_ALIAS), cipher)?;
    }

    tracing::debug!("exporting into target");
    conn.query_row("SELECT sqlcipher_export(?1)", [TARGET_ALIAS], |_| Ok(()))
        .map_err(|e| VaultError::engine(Phase::Export, e))?;

    let user_version: i64 = conn
        .query_row("PRAGMA main.user_version", [], |row| row.get(0))
        .map_err(|e| VaultError::engine(Phase::Export, e))?;
    conn.pragma_update(Some(DatabaseName::Attached(TARGET_ALIAS)), "user_version", user_version)
        .map_err(|e| VaultError::engine(Phase::Export, e))?;

    conn.execute_batch(&format!("DETACH DATABASE {}", TARGET_ALIAS))
        .map_err(|e| VaultError::engine(Phase::Detach, e))?;
    conn.close()
        .map_err(|(_, e)| VaultError::engine(Phase::Detach, e))?;
    Ok(())
}

/// Reopen a freshly written database and make sure it is usable.
pub(crate) fn verify(path: &Path, key: Option<&CipherKey>, cipher: &CipherSettings) -> Result<()> {
    let conn = open_keyed(path, key, cipher, true).map_err(|e| VaultError::Verification(e.to_string()))?;

    match ensure_readable(&conn, Phase::Verify, key.is_some()) {
        Ok(()) => {}
        Err(VaultError::IncorrectPassword) => {
            return Err(VaultError::Verification(
                "output does not open with the expected key".to_string(),
            ))
        }
        Err(err) => return Err(VaultError::Verification(err.to_string())),
    }

    let check: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| VaultError::Verification(format!("quick_check failed: {}", e)))?;
    if check != "ok" {
        return Err(VaultError::Verification(format!(
            "quick_check reported: {}",
            check
        )));
    }
    Ok(())
}

/// Determine whether `path` is missing, plaintext, or encrypted.
///
/// Only "not a database" counts as encrypted; a busy or unreadable file is
/// an error.
pub fn probe(path: &Path) -> Result<DatabaseStatus> {
    if !path.exists() {
        return Ok(DatabaseStatus::Missing);
    }
    let conn = open_keyed(path, None, &CipherSettings::default(), true)?;
    match conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(_) => Ok(DatabaseStatus::Plaintext),
        Err(err) if is_not_a_database(&err) => Ok(DatabaseStatus::Encrypted),
        Err(err) => Err(VaultError::engine(Phase::Open, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn plaintext_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE tenants (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO tenants (name) VALUES ('Ada'), ('Grace');
             PRAGMA user_version = 7;",
        )
        .unwrap();
    }

    #[test]
    fn test_probe_missing_and_plaintext() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.db");
        assert_eq!(probe(&path).unwrap(), DatabaseStatus::Missing);

        plaintext_db(&path);
        assert_eq!(probe(&path).unwrap(), DatabaseStatus::Plaintext);
    }

    #[test]
    fn test_export_copy_encrypts_and_keeps_user_version() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.db");
        let target = dir.path().join("app.db.encrypted");
        plaintext_db(&source);
        let cipher = CipherSettings::default();
        let key = CipherKey::passphrase("Correct123!Pass");

        export_copy(&source, None, &target, Some(&key), &cipher).unwrap();
        verify(&target, Some(&key), &cipher).unwrap();

        assert_eq!(probe(&target).unwrap(), DatabaseStatus::Encrypted);
        let wrong = CipherKey::passphrase("Wrong123!Pass");
        let conn = open_keyed(&target, Some(&wrong), &cipher, true).unwrap();
        assert!(matches!(
            ensure_readable(&conn, Phase::Open, true),
            Err(VaultError::IncorrectPassword)
        ));

        let conn = open_keyed(&target, Some(&key), &cipher, true).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 7);
    }

    #[test]
    fn test_probe_reports_busy_plaintext_as_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.db");
        plaintext_db(&path);

        let holder = Connection::open(&path).unwrap();
        holder
            .execute_batch(
                "PRAGMA locking_mode = EXCLUSIVE;
                 BEGIN EXCLUSIVE;
                 INSERT INTO tenants (name) VALUES ('Linus');",
            )
            .unwrap();

        let err = probe(&path).unwrap_err();
        assert!(matches!(err, VaultError::Engine { phase: Phase::Open, .. }));

        holder.execute_batch("COMMIT").unwrap();
        drop(holder);
        assert_eq!(probe(&path).unwrap(), DatabaseStatus::Plaintext);
    }

    #[test]
    fn test_open_keyed_never_creates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.db");
        let err = open_keyed(&path, None, &CipherSettings::default(), false).unwrap_err();
        assert!(matches!(err, VaultError::SourceMissing(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, vec![0x42u8; 8192]).unwrap();

        let err = verify(&path, None, &CipherSettings::default()).unwrap_err();
        assert!(matches!(err, VaultError::Verification(_)));
    }
}
