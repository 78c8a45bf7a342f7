//! Error types for vaultdb core operations.
//!
//! Every failure that can happen while encrypting, decrypting or verifying
//! a database is returned as a `VaultError` instead of a panic. The
//! `Display` output is meant to be shown to a user as-is; the CLI layer only
//! maps categories to exit codes.
//!
//! Secret storage problems are deliberately absent from this enum: storing
//! or clearing a remembered key is best effort and is reported through
//! [`crate::orchestrator::SecretStoreOutcome`] instead.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for vaultdb operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// The step of an attach/export/detach transform that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Attach,
    Configure,
    Export,
    Detach,
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Open => "open",
            Phase::Attach => "attach",
            Phase::Configure => "configure",
            Phase::Export => "export",
            Phase::Detach => "detach",
            Phase::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Core error type for vaultdb operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed input such as a wrong salt length or an empty password
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Password rejected by the strength policy
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// The database to transform does not exist
    #[error("Database not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// The supplied password does not open the database
    #[error("Incorrect password")]
    IncorrectPassword,

    /// SQLCipher rejected a command
    #[error("Database engine error during {phase}: {message}")]
    Engine { phase: Phase, message: String },

    /// The produced file could not be reopened or queried
    #[error("Verification failed: {0}")]
    Verification(String),

    /// The operating system could not supply random bytes
    #[error("Random source unavailable: {0}")]
    Entropy(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error with context
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl VaultError {
    /// Wrap an engine error with the phase it happened in.
    pub(crate) fn engine(phase: Phase, err: rusqlite::Error) -> Self {
        VaultError::Engine {
            phase,
            message: err.to_string(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        VaultError::Io {
            context: context.into(),
            source,
        }
    }

    /// True for errors caused by input that failed validation before any I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            VaultError::InvalidArgument(_) | VaultError::WeakPassword(_)
        )
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::io("I/O error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_names_phase() {
        let err = VaultError::Engine {
            phase: Phase::Export,
            message: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database engine error during export: disk full"
        );
    }

    #[test]
    fn test_validation_classification() {
        assert!(VaultError::WeakPassword("short".into()).is_validation());
        assert!(VaultError::InvalidArgument("salt".into()).is_validation());
        assert!(!VaultError::IncorrectPassword.is_validation());
    }
}
