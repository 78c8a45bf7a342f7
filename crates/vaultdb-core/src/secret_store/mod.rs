//! Platform secret storage for remembered database keys.
//!
//! Remembering a key lets a trusted device unlock the database at startup
//! without prompting. Storage is always optional: every operation reports
//! failure as `false`/`None` and never as an error, so a missing or broken
//! keychain can only cost the user a password prompt.
//!
//! ## Backends
//!
//! - [`SecretToolStore`]: the `secret-tool` CLI (Linux Secret Service)
//! - [`ProtectedFileStore`]: a file encrypted with a user-scoped OS
//!   primitive (DPAPI on Windows)
//! - [`KeyringStore`]: the platform credential store via `keyring` (macOS)
//! - [`MemorySecretStore`]: in-process, for tests and headless hosts
//! - [`UnavailableSecretStore`]: no storage at all
//!
//! All backends key their entry on the application instance name, so two
//! differently configured installations never overwrite each other.

pub mod keychain;
pub mod memory;
pub mod protected_file;
pub mod secret_tool;

use std::time::Duration;

pub use keychain::KeyringStore;
pub use memory::MemorySecretStore;
pub use protected_file::{DataProtector, ProtectError, ProtectedFileStore};
pub use secret_tool::SecretToolStore;

#[cfg(windows)]
pub use protected_file::DpapiProtector;

use crate::config::{SecretStoreBackend, SecretStoreConfig};

/// Capability interface over OS secret storage.
pub trait SecretStore: Send + Sync {
    /// Persist `secret` (a password or hex key). `label` is a human-readable
    /// description shown by keychain UIs where supported.
    fn store_key(&self, secret: &str, label: &str) -> bool;

    /// The stored secret, or `None` if nothing is stored or it cannot be
    /// read back.
    fn retrieve_key(&self) -> Option<String>;

    /// Delete the stored secret. Removing a missing entry succeeds.
    fn remove_key(&self) -> bool;

    /// Cheap probe: can this backend be used at all?
    fn is_available(&self) -> bool;

    /// Backend name for log lines.
    fn name(&self) -> &'static str;
}

/// A backend that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSecretStore;

impl SecretStore for UnavailableSecretStore {
    fn store_key(&self, _secret: &str, _label: &str) -> bool {
        false
    }

    fn retrieve_key(&self) -> Option<String> {
        None
    }

    fn remove_key(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Human-readable label for the stored entry.
pub fn entry_label(instance: &str) -> String {
    format!("Database encryption key ({})", instance)
}

/// Select the secret store for this platform and configuration.
///
/// Called once at startup; the result is shared for the process lifetime.
pub fn platform_secret_store(config: &SecretStoreConfig, instance: &str) -> Box<dyn SecretStore> {
    let backend = match config.backend {
        SecretStoreBackend::Auto => default_backend(),
        other => other,
    };
    tracing::debug!(?backend, instance, "selecting secret store");

    match backend {
        SecretStoreBackend::SecretTool => Box::new(SecretToolStore::new(
            config.program.clone(),
            instance,
            SecretToolTimeouts {
                store: Duration::from_millis(config.store_timeout_ms),
                lookup: Duration::from_millis(config.lookup_timeout_ms),
                probe: Duration::from_millis(config.probe_timeout_ms),
            },
        )),
        SecretStoreBackend::ProtectedFile => protected_file_store(config, instance),
        SecretStoreBackend::Keyring => Box::new(KeyringStore::new(instance)),
        SecretStoreBackend::Memory => Box::new(MemorySecretStore::new(instance)),
        SecretStoreBackend::None | SecretStoreBackend::Auto => Box::new(UnavailableSecretStore),
    }
}

/// Bounded waits for the `secret-tool` backend.
#[derive(Debug, Clone, Copy)]
pub struct SecretToolTimeouts {
    pub store: Duration,
    pub lookup: Duration,
    pub probe: Duration,
}

impl Default for SecretToolTimeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(5),
            lookup: Duration::from_secs(5),
            probe: Duration::from_secs(1),
        }
    }
}

fn default_backend() -> SecretStoreBackend {
    if cfg!(target_os = "linux") {
        SecretStoreBackend::SecretTool
    } else if cfg!(windows) {
        SecretStoreBackend::ProtectedFile
    } else if cfg!(target_os = "macos") {
        SecretStoreBackend::Keyring
    } else {
        SecretStoreBackend::None
    }
}

#[cfg(windows)]
fn protected_file_store(config: &SecretStoreConfig, instance: &str) -> Box<dyn SecretStore> {
    match config.data_dir.clone().or_else(dirs::data_local_dir) {
        Some(dir) => Box::new(ProtectedFileStore::new(
            DpapiProtector::new(instance),
            &dir,
            instance,
        )),
        None => {
            tracing::warn!("no per-user data directory; secret storage disabled");
            Box::new(UnavailableSecretStore)
        }
    }
}

#[cfg(not(windows))]
fn protected_file_store(_config: &SecretStoreConfig, _instance: &str) -> Box<dyn SecretStore> {
    tracing::warn!("protected-file secret storage requires Windows; secret storage disabled");
    Box::new(UnavailableSecretStore)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_store_contract() {
        let store = UnavailableSecretStore;
        assert!(!store.is_available());
        assert!(!store.store_key("secret", "label"));
        assert_eq!(store.retrieve_key(), None);
        assert!(store.remove_key());
        assert!(store.remove_key());
    }

    #[test]
    fn test_factory_honors_explicit_backends() {
        let mut config = SecretStoreConfig {
            backend: SecretStoreBackend::Memory,
            ..SecretStoreConfig::default()
        };
        assert_eq!(platform_secret_store(&config, "app").name(), "memory");

        config.backend = SecretStoreBackend::None;
        assert_eq!(platform_secret_store(&config, "app").name(), "none");

        config.backend = SecretStoreBackend::SecretTool;
        assert_eq!(platform_secret_store(&config, "app").name(), "secret-tool");
    }

    #[test]
    fn test_entry_label_names_instance() {
        assert!(entry_label("rentals-east").contains("rentals-east"));
    }
}
