//! Constants used throughout the CLI.

/// Exit codes for the CLI.
///
/// These follow common Unix conventions:
/// - 0: Success
/// - 1: General error (used by anyhow for unhandled errors)
/// - 2: Misuse of shell command (reserved by shells, and by clap)
/// - 3+: Application-specific errors
pub mod exit_codes {
    /// Resource not found (database file, config).
    pub const NOT_FOUND: i32 = 3;

    /// Invalid user input or arguments, including weak passwords.
    pub const INVALID_INPUT: i32 = 4;

    /// Authentication failed (wrong password).
    pub const AUTH_FAILED: i32 = 5;

    /// The produced database failed verification.
    pub const INTEGRITY_FAILED: i32 = 6;

    /// `status --check` found a database that is still locked.
    pub const LOCKED: i32 = 7;
}

/// Environment variable holding the password for non-interactive use.
pub const PASSWORD_ENV: &str = "VAULTDB_PASSWORD";

/// Environment variable holding the replacement password for `rotate`.
pub const NEW_PASSWORD_ENV: &str = "VAULTDB_NEW_PASSWORD";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "VAULTDB_CONFIG";

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "VAULTDB_LOG";
