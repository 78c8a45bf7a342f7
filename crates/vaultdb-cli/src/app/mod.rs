//! Application-level utilities for the vaultdb CLI.
//!
//! This module provides:
//! - Path resolution for config and database files
//! - Password input from the environment or stdin
//! - A lazily-built context shared by every command

mod context;
mod password;
mod resolver;

// Re-export public API
pub use context::AppContext;
pub use password::PasswordReader;
