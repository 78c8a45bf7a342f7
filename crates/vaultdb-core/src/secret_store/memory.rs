//! In-process secret store.
//!
//! Useful for tests and for hosts that want "remember for this session"
//! semantics. Stores created with [`MemorySecretStore::for_instance`] share
//! one backing map, like several installations sharing an OS keychain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use zeroize::Zeroizing;

use super::SecretStore;

type Backing = Arc<Mutex<HashMap<String, Zeroizing<String>>>>;

#[derive(Clone)]
pub struct MemorySecretStore {
    backing: Backing,
    instance: String,
    available: bool,
}

impl MemorySecretStore {
    pub fn new(instance: &str) -> Self {
        Self {
            backing: Backing::default(),
            instance: instance.to_string(),
            available: true,
        }
    }

    /// A store that reports itself unavailable and refuses writes.
    pub fn unavailable(instance: &str) -> Self {
        Self {
            available: false,
            ..Self::new(instance)
        }
    }

    /// Another store over the same backing map, keyed by `instance`.
    pub fn for_instance(&self, instance: &str) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
            instance: instance.to_string(),
            available: self.available,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Zeroizing<String>>> {
        self.backing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SecretStore for MemorySecretStore {
    fn store_key(&self, secret: &str, _label: &str) -> bool {
        if !self.available {
            return false;
        }
        self.lock()
            .insert(self.instance.clone(), Zeroizing::new(secret.to_string()));
        true
    }

    fn retrieve_key(&self) -> Option<String> {
        if !self.available {
            return None;
        }
        self.lock()
            .get(&self.instance)
            .map(|secret| secret.as_str().to_string())
    }

    fn remove_key(&self) -> bool {
        self.lock().remove(&self.instance);
        true
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecretStore")
            .field("instance", &self.instance)
            .field("available", &self.available)
            .finish()
    }
}
