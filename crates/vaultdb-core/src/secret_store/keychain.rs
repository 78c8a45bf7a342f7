//! Platform credential store via the `keyring` crate.

use super::SecretStore;

/// Account name of the stored entry; the service is the instance name.
const ACCOUNT: &str = "database-key";

#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(instance: &str) -> Self {
        Self {
            service: instance.to_string(),
        }
    }

    fn entry(&self) -> Option<keyring::Entry> {
        match keyring::Entry::new(&self.service, ACCOUNT) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "keychain entry failed");
                None
            }
        }
    }
}

impl SecretStore for KeyringStore {
    fn store_key(&self, secret: &str, label: &str) -> bool {
        let Some(entry) = self.entry() else {
            return false;
        };
        match entry.set_password(secret) {
            Ok(()) => {
                tracing::debug!(service = %self.service, label, "secret stored in keychain");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "keychain write failed");
                false
            }
        }
    }

    fn retrieve_key(&self) -> Option<String> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(err) => {
                tracing::warn!(error = %err, "keychain read failed");
                None
            }
        }
    }

    fn remove_key(&self) -> bool {
        let Some(entry) = self.entry() else {
            return false;
        };
        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => true,
            Err(err) => {
                tracing::warn!(error = %err, "keychain delete failed");
                false
            }
        }
    }

    fn is_available(&self) -> bool {
        let Some(entry) = self.entry() else {
            return false;
        };
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => true,
            Err(err) => {
                tracing::debug!(error = %err, "keychain unavailable");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}
