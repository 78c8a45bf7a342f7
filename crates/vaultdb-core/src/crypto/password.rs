//! Password strength policy.
//!
//! Rules are applied in order and short-circuit on the first failure:
//! 1. Not empty or only whitespace
//! 2. At least 12 characters
//! 3. At least 3 of: uppercase, lowercase, digit, symbol

use crate::error::{Result, VaultError};

/// Minimum password length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 12;

/// Minimum number of distinct character classes.
pub const MIN_CHARACTER_CLASSES: usize = 3;

/// Outcome of a strength check. `reason` is empty when `valid` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCheck {
    pub valid: bool,
    pub reason: String,
}

impl PasswordCheck {
    fn accepted() -> Self {
        Self {
            valid: true,
            reason: String::new(),
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// Check a password against the strength policy.
///
/// # Examples
///
/// ```
/// use vaultdb_core::crypto::validate_password_strength;
///
/// assert!(validate_password_strength("Correct123!Pass").valid);
/// assert!(!validate_password_strength("short1!").valid);
/// ```
pub fn validate_password_strength(password: &str) -> PasswordCheck {
    if password.trim().is_empty() {
        return PasswordCheck::rejected("Password cannot be empty");
    }

    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return PasswordCheck::rejected(format!(
            "Password must be at least {} characters (got {})",
            MIN_PASSWORD_LENGTH, length
        ));
    }

    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    let classes = [has_upper, has_lower, has_digit, has_symbol]
        .iter()
        .filter(|present| **present)
        .count();
    if classes < MIN_CHARACTER_CLASSES {
        return PasswordCheck::rejected(format!(
            "Password must mix at least {} of: uppercase letters, lowercase letters, digits, symbols (found {})",
            MIN_CHARACTER_CLASSES, classes
        ));
    }

    PasswordCheck::accepted()
}

/// Like [`validate_password_strength`], but as a `Result`.
pub fn require_strong_password(password: &str) -> Result<()> {
    let check = validate_password_strength(password);
    if check.valid {
        Ok(())
    } else {
        Err(VaultError::WeakPassword(check.reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_rejections_have_distinct_reasons() {
        let cases = ["", "short1!", "alllowercase12"];
        let reasons: Vec<String> = cases
            .iter()
            .map(|password| {
                let check = validate_password_strength(password);
                assert!(!check.valid, "{:?} should be rejected", password);
                assert!(!check.reason.is_empty());
                check.reason
            })
            .collect();

        assert_ne!(reasons[0], reasons[1]);
        assert_ne!(reasons[1], reasons[2]);
        assert_ne!(reasons[0], reasons[2]);
    }

    #[test]
    fn test_reference_password_accepted() {
        let check = validate_password_strength("Correct123!Pass");
        assert!(check.valid);
        assert!(check.reason.is_empty());
    }

    #[test]
    fn test_rule_table() {
        let table: &[(&str, bool, &str)] = &[
            ("   ", false, "empty"),
            ("\n\t", false, "empty"),
            ("Ab1!", false, "at least 12"),
            ("Abcdefghij1", false, "at least 12"),
            ("ALLUPPERCASE12", false, "found 2"),
            ("lowercase-only-words", false, "found 2"),
            ("Uppercase-and-lower", true, ""),
            ("UPPER-CASE-1234", true, ""),
            ("MixedCase12345", true, ""),
            ("Pass phrase with spaces 9", true, ""),
        ];

        for (password, expected, fragment) in table {
            let check = validate_password_strength(password);
            assert_eq!(check.valid, *expected, "password {:?}", password);
            assert!(
                check.reason.contains(fragment),
                "password {:?} reason {:?}",
                password,
                check.reason
            );
        }
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 11 characters, but more than 12 bytes.
        let password = "Pässwörd1!é";
        assert_eq!(password.chars().count(), 11);
        let check = validate_password_strength(password);
        assert!(!check.valid);
        assert!(check.reason.contains("got 11"));
    }

    #[test]
    fn test_require_strong_password_maps_reason() {
        let err = require_strong_password("short1!").unwrap_err();
        assert!(matches!(err, VaultError::WeakPassword(ref reason) if reason.contains("12")));
        assert!(require_strong_password("Correct123!Pass").is_ok());
    }
}
