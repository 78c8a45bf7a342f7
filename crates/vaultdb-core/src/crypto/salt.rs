//! Salt generation and text encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Result, VaultError};

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// Generate a fresh random salt from the OS random source.
///
/// # Errors
///
/// Returns `VaultError::Entropy` only when the OS cannot supply random
/// bytes. Callers should treat that as fatal.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).map_err(|e| VaultError::Entropy(e.to_string()))?;
    Ok(salt)
}

/// Encode a salt as standard base64 for storage in application settings.
pub fn salt_to_string(salt: &[u8; SALT_LEN]) -> String {
    STANDARD.encode(salt)
}

/// Decode a salt previously produced by [`salt_to_string`].
pub fn string_to_salt(text: &str) -> Result<[u8; SALT_LEN]> {
    let decoded = STANDARD
        .decode(text.trim().as_bytes())
        .map_err(|e| VaultError::InvalidArgument(format!("Salt is not valid base64: {}", e)))?;
    decoded.as_slice().try_into().map_err(|_| {
        VaultError::InvalidArgument(format!(
            "Salt must decode to exactly {} bytes (got {})",
            SALT_LEN,
            decoded.len()
        ))
    })
}
