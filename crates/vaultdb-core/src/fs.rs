//! Filesystem helpers for side-by-side database files.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Files SQLite may leave next to a database.
const COMPANION_SUFFIXES: &[&str] = &["-journal", "-wal", "-shm"];

/// `path` with `suffix` appended to its file name (`app.db` + `.encrypted`
/// becomes `app.db.encrypted`).
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove a database file and any journal/WAL companions. Missing files are
/// not an error.
pub fn remove_database_files(path: &Path) -> io::Result<()> {
    remove_if_exists(path)?;
    for suffix in COMPANION_SUFFIXES {
        remove_if_exists(&sibling_path(path, suffix))?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Rename `from` onto `to`, replacing `to` on platforms where `fs::rename`
/// refuses to overwrite.
pub fn rename_replacing(from: &Path, to: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(from, to) {
        let _ = fs::remove_file(to);
        fs::rename(from, to).map_err(|retry_err| {
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}

/// Move `produced` into `original`'s place, keeping the previous file and
/// its journal/WAL companions at `original` + `backup_suffix`. If
/// installing fails the backup is moved back so `original` is never left
/// missing.
pub fn promote_with_backup(produced: &Path, original: &Path, backup_suffix: &str) -> io::Result<PathBuf> {
    let backup = sibling_path(original, backup_suffix);
    remove_database_files(&backup)?;
    for suffix in COMPANION_SUFFIXES {
        let companion = sibling_path(original, suffix);
        if companion.exists() {
            rename_replacing(&companion, &sibling_path(&backup, suffix))?;
        }
    }
    rename_replacing(original, &backup)?;

    if let Err(err) = rename_replacing(produced, original) {
        let _ = rename_replacing(&backup, original);
        return Err(err);
    }
    Ok(backup)
}

/// Restrict a file to the current user.
pub fn set_owner_only(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sibling_path_appends_to_file_name() {
        let path = Path::new("/data/app.db");
        assert_eq!(
            sibling_path(path, ".encrypted"),
            PathBuf::from("/data/app.db.encrypted")
        );
    }

    #[test]
    fn test_remove_database_files_clears_companions() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("app.db");
        fs::write(&db, b"db").unwrap();
        fs::write(sibling_path(&db, "-wal"), b"wal").unwrap();
        fs::write(sibling_path(&db, "-shm"), b"shm").unwrap();

        remove_database_files(&db).unwrap();

        assert!(!db.exists());
        assert!(!sibling_path(&db, "-wal").exists());
        assert!(!sibling_path(&db, "-shm").exists());
        // Second call on nothing is fine.
        remove_database_files(&db).unwrap();
    }

    #[test]
    fn test_rename_replacing_overwrites_existing() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("new.db");
        let to = dir.path().join("app.db");
        fs::write(&to, b"old").unwrap();
        fs::write(&from, b"new").unwrap();

        rename_replacing(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"new");
    }

    #[test]
    fn test_promote_keeps_backup() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("app.db");
        let produced = dir.path().join("app.db.encrypted");
        fs::write(&original, b"plain").unwrap();
        fs::write(&produced, b"cipher").unwrap();

        let backup = promote_with_backup(&produced, &original, ".bak").unwrap();

        assert_eq!(backup, dir.path().join("app.db.bak"));
        assert_eq!(fs::read(&original).unwrap(), b"cipher");
        assert_eq!(fs::read(&backup).unwrap(), b"plain");
        assert!(!produced.exists());
    }

    #[test]
    fn test_promote_moves_companions_to_backup() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("app.db");
        let produced = dir.path().join("app.db.encrypted");
        fs::write(&original, b"plain").unwrap();
        fs::write(sibling_path(&original, "-wal"), b"plain wal").unwrap();
        fs::write(&produced, b"cipher").unwrap();

        let backup = promote_with_backup(&produced, &original, ".bak").unwrap();

        assert!(!sibling_path(&original, "-wal").exists());
        assert_eq!(fs::read(sibling_path(&backup, "-wal")).unwrap(), b"plain wal");

        remove_database_files(&backup).unwrap();
        assert!(!backup.exists());
        assert!(!sibling_path(&backup, "-wal").exists());
        assert_eq!(fs::read(&original).unwrap(), b"cipher");
    }

    #[test]
    fn test_promote_restores_original_when_produced_missing() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("app.db");
        let produced = dir.path().join("missing.db");
        fs::write(&original, b"plain").unwrap();

        assert!(promote_with_backup(&produced, &original, ".bak").is_err());
        assert_eq!(fs::read(&original).unwrap(), b"plain");
    }

    #[cfg(unix)]
    #[test]
    fn test_set_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.bin");
        fs::write(&path, b"x").unwrap();

        set_owner_only(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
