//! Startup flow: try the remembered key, then fall back to a password.

use vaultdb_core::{AutoUnlock, CipherKey, DatabaseStatus, SecretStoreOutcome, UnlockState};

use crate::app::{AppContext, PasswordReader};
use crate::constants::PASSWORD_ENV;
use crate::errors::{classify, CliError};

pub fn handle_unlock(
    ctx: &AppContext,
    remember: bool,
    no_input: bool,
    password_stdin: bool,
) -> anyhow::Result<()> {
    let path = ctx.database_path()?;
    let service = ctx.service()?;
    let quiet = ctx.quiet();

    match service.probe_status(&path).map_err(classify)? {
        DatabaseStatus::Missing => {
            return Err(CliError::not_found(
                format!("No database found at {}", path.display()),
                "Hint: Pass --database or set VAULTDB_PATH.",
            )
            .into())
        }
        DatabaseStatus::Plaintext => {
            if !quiet {
                println!("Database is not encrypted; nothing to unlock.");
            }
            return Ok(());
        }
        DatabaseStatus::Encrypted => {}
    }

    let state = UnlockState::new();
    state.mark_locked(&path, None);
    state.subscribe(move || {
        if !quiet {
            println!("Database unlocked.");
        }
    });

    match service.try_auto_unlock(&state) {
        AutoUnlock::Unlocked | AutoUnlock::NotLocked => return Ok(()),
        AutoUnlock::StaleSecretCleared => {
            eprintln!("Warning: The remembered key no longer opens this database and was removed.");
        }
        AutoUnlock::PromptRequired => {}
    }

    if no_input {
        return Err(CliError::Locked(
            "Database is locked and no remembered key opens it.".to_string(),
        )
        .into());
    }

    let password = PasswordReader::new(password_stdin).next(PASSWORD_ENV, "password")?;
    service.unlock(&state, &password).map_err(classify)?;

    if remember {
        match service.remember_key(&CipherKey::passphrase(&password)) {
            SecretStoreOutcome::Stored => {
                if !quiet {
                    println!("Password remembered on this device.");
                }
            }
            SecretStoreOutcome::Skipped => {
                eprintln!("Warning: No secret store is available; the password was not remembered.");
            }
            _ => {
                eprintln!("Warning: Could not remember the password on this device.");
            }
        }
    }
    Ok(())
}
