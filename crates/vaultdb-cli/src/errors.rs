//! CLI error types for structured error handling.
//!
//! Core errors are sorted into categories that map to specific exit codes,
//! so scripts can tell "wrong password" from "file missing" without
//! parsing messages.

use std::fmt;

use vaultdb_core::VaultError;

/// CLI-specific errors with associated exit codes.
#[derive(Debug)]
pub enum CliError {
    /// Resource not found (database, config)
    NotFound { message: String, hint: String },

    /// Authentication failed (wrong password)
    AuthFailed {
        message: String,
        hint: Option<String>,
    },

    /// Invalid user input
    InvalidInput(String),

    /// The produced database could not be verified
    IntegrityFailed(String),

    /// The database is still waiting for a key
    Locked(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::NotFound { message, hint } => {
                write!(f, "{}\n{}", message, hint)
            }
            CliError::AuthFailed { message, hint } => {
                if let Some(h) = hint {
                    write!(f, "{}\n{}", message, h)
                } else {
                    write!(f, "{}", message)
                }
            }
            CliError::InvalidInput(message)
            | CliError::IntegrityFailed(message)
            | CliError::Locked(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Create a NotFound error with message and hint.
    pub fn not_found(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CliError::NotFound {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Create an AuthFailed error with message and hint.
    pub fn auth_failed_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CliError::AuthFailed {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        CliError::InvalidInput(message.into())
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        use super::constants::exit_codes;
        match self {
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::AuthFailed { .. } => exit_codes::AUTH_FAILED,
            CliError::InvalidInput(_) => exit_codes::INVALID_INPUT,
            CliError::IntegrityFailed(_) => exit_codes::INTEGRITY_FAILED,
            CliError::Locked(_) => exit_codes::LOCKED,
        }
    }

    /// Print error message to stderr and exit with appropriate code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        std::process::exit(self.exit_code())
    }
}

/// Sort a core error into a CLI category. Errors without a category keep
/// their message and exit with the general failure code.
pub fn classify(err: VaultError) -> anyhow::Error {
    match err {
        VaultError::IncorrectPassword => CliError::auth_failed_with_hint(
            "Incorrect password.",
            "Hint: The database was left unchanged; try again with the right password.",
        )
        .into(),
        VaultError::WeakPassword(reason) => CliError::invalid_input(format!(
            "Password too weak: {}",
            reason
        ))
        .into(),
        VaultError::InvalidArgument(message) | VaultError::Config(message) => {
            CliError::invalid_input(message).into()
        }
        VaultError::SourceMissing(path) => CliError::not_found(
            format!("No database found at {}", path.display()),
            "Hint: Pass --database or set VAULTDB_PATH.",
        )
        .into(),
        VaultError::Verification(message) => CliError::IntegrityFailed(format!(
            "Verification failed: {}\nThe partial output was removed; the original file is unchanged.",
            message
        ))
        .into(),
        other => anyhow::Error::new(other),
    }
}
