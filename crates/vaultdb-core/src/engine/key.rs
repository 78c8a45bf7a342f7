//! Keys handed to SQLCipher.

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::crypto::{DerivedKey, KEY_LEN};

/// Key material for a SQLCipher database.
///
/// A passphrase is stretched by SQLCipher's own KDF; a raw key is used
/// directly and is rendered in SQLCipher's `x'<hex>'` form.
pub enum CipherKey {
    Passphrase(SecretString),
    Raw(DerivedKey),
}

impl CipherKey {
    pub fn passphrase(value: &str) -> Self {
        CipherKey::Passphrase(SecretString::from(value.to_string()))
    }

    /// Interpret a secret read back from a secret store.
    ///
    /// 64 lowercase hex characters are treated as a raw key. The password
    /// policy cannot produce such a value (it has at most two character
    /// classes), so the two forms never collide.
    pub fn from_stored(secret: &str) -> Self {
        let is_hex_key = secret.len() == KEY_LEN * 2
            && secret
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if is_hex_key {
            if let Ok(key) = DerivedKey::from_hex(secret) {
                return CipherKey::Raw(key);
            }
        }
        CipherKey::passphrase(secret)
    }

    /// The text passed as the `KEY` / `PRAGMA key` parameter.
    pub(crate) fn sql_value(&self) -> Zeroizing<String> {
        match self {
            CipherKey::Passphrase(secret) => Zeroizing::new(secret.expose_secret().to_string()),
            CipherKey::Raw(key) => Zeroizing::new(format!("x'{}'", key.to_hex().as_str())),
        }
    }

    /// The text worth remembering in a secret store.
    pub fn stored_form(&self) -> Zeroizing<String> {
        match self {
            CipherKey::Passphrase(secret) => Zeroizing::new(secret.expose_secret().to_string()),
            CipherKey::Raw(key) => key.to_hex(),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, CipherKey::Raw(_))
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherKey::Passphrase(_) => f.write_str("CipherKey::Passphrase([REDACTED])"),
            CipherKey::Raw(_) => f.write_str("CipherKey::Raw([REDACTED])"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_key_sql_form() {
        let key = CipherKey::Raw(DerivedKey::from_bytes([0xab; KEY_LEN]));
        let value = key.sql_value();
        assert!(value.starts_with("x'"));
        assert!(value.ends_with('\''));
        assert_eq!(value.len(), KEY_LEN * 2 + 3);
        assert_eq!(key.stored_form().as_str(), "ab".repeat(KEY_LEN));
    }

    #[test]
    fn test_from_stored_recognizes_hex_keys() {
        let stored = "0f".repeat(KEY_LEN);
        assert!(CipherKey::from_stored(&stored).is_raw());
        assert!(!CipherKey::from_stored("Correct123!Pass").is_raw());
        // Uppercase hex is a passphrase; hex keys are always stored lowercase.
        assert!(!CipherKey::from_stored(&"0F".repeat(KEY_LEN)).is_raw());
    }

    #[test]
    fn test_debug_redacts() {
        let key = CipherKey::passphrase("Correct123!Pass");
        let output = format!("{:?}", key);
        assert!(output.contains("REDACTED"));
        assert!(!output.contains("Correct123"));
    }
}
