//! Runtime configuration for the encryption subsystem.
//!
//! Every field has a default so an empty (or missing) config file yields a
//! working setup. Hosts usually deserialize this from TOML.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Application instance name used when none is configured.
pub const DEFAULT_INSTANCE_NAME: &str = "vaultdb";

const KDF_ALGORITHMS: &[&str] = &["PBKDF2_HMAC_SHA1", "PBKDF2_HMAC_SHA256", "PBKDF2_HMAC_SHA512"];
const HMAC_ALGORITHMS: &[&str] = &["HMAC_SHA1", "HMAC_SHA256", "HMAC_SHA512"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub app: AppSection,
    pub cipher: CipherSettings,
    pub transform: TransformSection,
    pub secret_store: SecretStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// Distinguishes installations on one machine; keys secret storage.
    pub instance_name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
        }
    }
}

/// SQLCipher parameters applied explicitly to every keyed database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherSettings {
    pub page_size: u32,
    pub kdf_iter: u32,
    pub kdf_algorithm: String,
    pub hmac_algorithm: String,
}

impl Default for CipherSettings {
    fn default() -> Self {
        Self {
            page_size: 4096,
            kdf_iter: 256_000,
            kdf_algorithm: "PBKDF2_HMAC_SHA512".to_string(),
            hmac_algorithm: "HMAC_SHA512".to_string(),
        }
    }
}

impl CipherSettings {
    pub fn validate(&self) -> Result<()> {
        if !(512..=65536).contains(&self.page_size) || !self.page_size.is_power_of_two() {
            return Err(VaultError::Config(format!(
                "cipher page_size must be a power of two between 512 and 65536 (got {})",
                self.page_size
            )));
        }
        if self.kdf_iter == 0 {
            return Err(VaultError::Config(
                "cipher kdf_iter must be greater than zero".to_string(),
            ));
        }
        if !KDF_ALGORITHMS.contains(&self.kdf_algorithm.as_str()) {
            return Err(VaultError::Config(format!(
                "unsupported cipher kdf_algorithm: {}",
                self.kdf_algorithm
            )));
        }
        if !HMAC_ALGORITHMS.contains(&self.hmac_algorithm.as_str()) {
            return Err(VaultError::Config(format!(
                "unsupported cipher hmac_algorithm: {}",
                self.hmac_algorithm
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSection {
    pub encrypted_suffix: String,
    pub decrypted_suffix: String,
    pub rekeyed_suffix: String,
    pub backup_suffix: String,
    /// Pause after writing, before the verification pass reopens the file.
    pub settle_delay_ms: u64,
}

impl Default for TransformSection {
    fn default() -> Self {
        Self {
            encrypted_suffix: ".encrypted".to_string(),
            decrypted_suffix: ".decrypted".to_string(),
            rekeyed_suffix: ".rekeyed".to_string(),
            backup_suffix: ".bak".to_string(),
            settle_delay_ms: 250,
        }
    }
}

impl TransformSection {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    fn validate(&self) -> Result<()> {
        let suffixes = [
            ("encrypted_suffix", &self.encrypted_suffix),
            ("decrypted_suffix", &self.decrypted_suffix),
            ("rekeyed_suffix", &self.rekeyed_suffix),
            ("backup_suffix", &self.backup_suffix),
        ];
        for (name, value) in suffixes {
            if value.is_empty() || value.contains(['/', '\\']) {
                return Err(VaultError::Config(format!(
                    "transform {} must be a non-empty file name suffix",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecretStoreBackend {
    /// Pick the platform default.
    #[default]
    Auto,
    SecretTool,
    ProtectedFile,
    Keyring,
    Memory,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretStoreConfig {
    pub backend: SecretStoreBackend,
    /// Program used by the secret-tool backend.
    pub program: PathBuf,
    /// Base directory for the protected-file backend. Defaults to the
    /// per-user local data directory.
    pub data_dir: Option<PathBuf>,
    pub store_timeout_ms: u64,
    pub lookup_timeout_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            backend: SecretStoreBackend::Auto,
            program: PathBuf::from("secret-tool"),
            data_dir: None,
            store_timeout_ms: 5_000,
            lookup_timeout_ms: 5_000,
            probe_timeout_ms: 1_000,
        }
    }
}

impl VaultConfig {
    /// Check every section; returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        let name = self.app.instance_name.trim();
        if name.is_empty() {
            return Err(VaultError::Config(
                "app instance_name cannot be empty".to_string(),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(VaultError::Config(format!(
                "app instance_name may only contain letters, digits, '-', '_' and '.' (got {})",
                name
            )));
        }
        self.cipher.validate()?;
        self.transform.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        VaultConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"app": {"instance_name": "rentals-east"}}"#).unwrap();
        assert_eq!(config.app.instance_name, "rentals-east");
        assert_eq!(config.cipher, CipherSettings::default());
        assert_eq!(config.secret_store.backend, SecretStoreBackend::Auto);
    }

    #[test]
    fn test_rejects_bad_page_size() {
        let mut config = VaultConfig::default();
        config.cipher.page_size = 3000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_algorithm() {
        let mut config = VaultConfig::default();
        config.cipher.hmac_algorithm = "HMAC_MD5".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("HMAC_MD5"));
    }

    #[test]
    fn test_rejects_instance_name_with_path_separator() {
        let mut config = VaultConfig::default();
        config.app.instance_name = "../escape".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_suffix() {
        let mut config = VaultConfig::default();
        config.transform.encrypted_suffix = String::new();
        assert!(config.validate().is_err());
    }
}
