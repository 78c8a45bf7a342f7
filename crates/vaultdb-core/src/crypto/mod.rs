//! Key derivation and password policy for vaultdb.
//!
//! This module provides the pieces needed before a database can be keyed:
//! - **PBKDF2-HMAC-SHA256**: deterministic, deliberately slow key stretching
//! - **Salts**: 32 random bytes per database, stored as base64 text
//! - **Password policy**: minimum length and character-class rules
//!
//! ## Security Model
//!
//! - Same password + salt always yields the same key, so a database can be
//!   opened on any device that knows the password
//! - Key material is zeroized from memory on drop
//! - Passwords are never written anywhere except an OS secret store
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft of the encrypted database file
//! - Offline brute-force attacks on the password
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger
//! - Access to an unlocked session / memory

pub mod kdf;
pub mod password;
pub mod salt;

pub use kdf::{derive_key, derive_key_hex, DerivedKey, KEY_LEN, PBKDF2_ITERATIONS};
pub use password::{require_strong_password, validate_password_strength, PasswordCheck};
pub use salt::{generate_salt, salt_to_string, string_to_salt, SALT_LEN};
