//! # vaultdb core
//!
//! Key lifecycle for an embedded SQLite database encrypted with SQLCipher.
//!
//! This crate derives keys from passwords, turns a plaintext database into an
//! encrypted one (and back), checks the result, and remembers the key on a
//! trusted device so later launches can unlock without asking.
//!
//! ## Architecture
//!
//! - **crypto**: PBKDF2 key derivation, salts, password policy
//! - **secret_store**: platform secret storage behind one trait
//! - **unlock**: process-wide "locked / unlocked" state and notifications
//! - **orchestrator**: encrypt / decrypt / rekey flows and startup unlock
//! - **engine**: SQLCipher command protocol and the shared connection pool
//! - **fs**: side-by-side file naming, cleanup and promotion
//! - **config**: serde configuration with defaults for every field

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod fs;
pub mod orchestrator;
pub mod secret_store;
pub mod unlock;

pub use config::VaultConfig;
pub use engine::{CipherKey, ConnectionPool, DatabaseStatus};
pub use error::{Result, VaultError};
pub use orchestrator::{AutoUnlock, EncryptionService, SecretStoreOutcome, TransformOutcome};
pub use secret_store::{platform_secret_store, SecretStore};
pub use unlock::{SubscriptionId, UnlockState};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
