//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! The hash and iteration count are part of the on-disk contract: every
//! database encrypted with a derived key can only be reopened with the same
//! parameters. Changing them requires re-encrypting with a new salt.

use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::Sha256;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::salt::SALT_LEN;
use crate::error::{Result, VaultError};

/// PBKDF2 iteration count.
///
/// Costs on the order of 100-200 ms on current desktop hardware.
pub const PBKDF2_ITERATIONS: u32 = 310_000;

/// Length of derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// A cryptographic key derived from a password.
///
/// The bytes are zeroized when the value is dropped.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Wrap raw key bytes.
    ///
    /// The caller is responsible for the bytes coming from a secure source.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { key: bytes }
    }

    /// Parse a 64-character hex key, as produced by [`DerivedKey::to_hex`].
    pub fn from_hex(text: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            hex::decode(text.trim())
                .map_err(|e| VaultError::InvalidArgument(format!("Invalid hex key: {}", e)))?,
        );
        let bytes: [u8; KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            VaultError::InvalidArgument(format!(
                "Hex key must decode to {} bytes (got {})",
                KEY_LEN,
                decoded.len()
            ))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Get a reference to the raw key bytes.
    ///
    /// Avoid storing or logging this value.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Lowercase hex encoding (64 characters).
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.key))
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 32-byte key from a password and a 32-byte salt.
///
/// # Errors
///
/// Returns `VaultError::InvalidArgument` if the password is empty or the
/// salt is not exactly [`SALT_LEN`] bytes. Salts are never padded or
/// truncated.
///
/// # Examples
///
/// ```
/// use vaultdb_core::crypto::derive_key;
///
/// let salt = [7u8; 32];
/// let key = derive_key("Correct123!Pass", &salt).unwrap();
/// assert_eq!(key.as_bytes().len(), 32);
/// ```
pub fn derive_key(password: &str, salt: &[u8]) -> Result<DerivedKey> {
    if password.is_empty() {
        return Err(VaultError::InvalidArgument(
            "Password cannot be empty".to_string(),
        ));
    }

    if salt.len() != SALT_LEN {
        return Err(VaultError::InvalidArgument(format!(
            "Salt must be exactly {} bytes (got {})",
            SALT_LEN,
            salt.len()
        )));
    }

    let mut key_bytes = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut *key_bytes)
        .map_err(|e| VaultError::InvalidArgument(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey::from_bytes(*key_bytes))
}

/// Derive a key and return it as lowercase hex, for text-only boundaries.
pub fn derive_key_hex(password: &str, salt: &[u8]) -> Result<Zeroizing<String>> {
    Ok(derive_key(password, salt)?.to_hex())
}
