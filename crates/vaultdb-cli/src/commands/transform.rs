//! encrypt / decrypt / rotate.

use std::path::Path;

use vaultdb_core::{EncryptionService, SecretStoreOutcome, TransformOutcome};

use crate::app::{AppContext, PasswordReader};
use crate::cli::TransformArgs;
use crate::constants::{NEW_PASSWORD_ENV, PASSWORD_ENV};
use crate::errors::classify;

pub fn handle_encrypt(ctx: &AppContext, args: &TransformArgs) -> anyhow::Result<()> {
    let path = ctx.database_path()?;
    let service = ctx.service()?;
    let password = PasswordReader::new(args.password_stdin).next(PASSWORD_ENV, "password")?;

    let outcome = service
        .encrypt_database(&path, &password)
        .map_err(classify)?;
    finish(ctx, &service, &path, outcome, args, Transform::Encrypt)
}

pub fn handle_decrypt(ctx: &AppContext, args: &TransformArgs) -> anyhow::Result<()> {
    let path = ctx.database_path()?;
    let service = ctx.service()?;
    let password = PasswordReader::new(args.password_stdin).next(PASSWORD_ENV, "password")?;

    let outcome = service
        .decrypt_database(&path, &password)
        .map_err(classify)?;
    finish(ctx, &service, &path, outcome, args, Transform::Decrypt)
}

pub fn handle_rotate(ctx: &AppContext, args: &TransformArgs) -> anyhow::Result<()> {
    let path = ctx.database_path()?;
    let service = ctx.service()?;
    let mut reader = PasswordReader::new(args.password_stdin);
    let old_password = reader.next(PASSWORD_ENV, "current password")?;
    let new_password = reader.next(NEW_PASSWORD_ENV, "new password")?;

    let outcome = service
        .rotate_password(&path, &old_password, &new_password)
        .map_err(classify)?;
    finish(ctx, &service, &path, outcome, args, Transform::Rotate)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Transform {
    Encrypt,
    Decrypt,
    Rotate,
}

impl Transform {
    fn verb(self) -> &'static str {
        match self {
            Transform::Encrypt => "Encrypted",
            Transform::Decrypt => "Decrypted",
            Transform::Rotate => "Rekeyed",
        }
    }
}

fn finish(
    ctx: &AppContext,
    service: &EncryptionService,
    original: &Path,
    outcome: TransformOutcome,
    args: &TransformArgs,
    transform: Transform,
) -> anyhow::Result<()> {
    let quiet = ctx.quiet();
    let verb = transform.verb();
    if args.in_place {
        let backup = service
            .promote(&outcome.output_path, original)
            .map_err(classify)?;
        if !quiet {
            println!("{} database at {}", verb, original.display());
        }
        if !args.keep_backup {
            service.discard_backup(&backup).map_err(classify)?;
        } else if transform == Transform::Encrypt {
            eprintln!(
                "Warning: The unencrypted database is still readable at {}",
                backup.display()
            );
        } else if !quiet {
            println!("Previous file kept at {}", backup.display());
        }
    } else if !quiet {
        println!("{} copy written to {}", verb, outcome.output_path.display());
    }

    match outcome.secret_store {
        SecretStoreOutcome::Stored if !quiet => println!("Password remembered on this device."),
        SecretStoreOutcome::Removed if !quiet => {
            println!("Remembered password removed from this device.")
        }
        SecretStoreOutcome::Failed => {
            eprintln!("Warning: The secret store could not be updated; see the log for details.")
        }
        _ => {}
    }
    Ok(())
}
