//! Process-wide unlock state.
//!
//! Startup marks the database as locked when it is encrypted and no key has
//! been applied yet. Components that must wait for the database (background
//! sync, report generation, and so on) subscribe to the unlock notification
//! instead of polling. The state lives for one process and is never
//! persisted.
//!
//! Share one instance through `Arc<UnlockState>`; tests build a fresh one
//! each.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback fired once per successful unlock.
pub type UnlockListener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`UnlockState::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Inner {
    needs_unlock: bool,
    database_path: Option<PathBuf>,
    connection_string: Option<String>,
    listeners: Vec<(SubscriptionId, UnlockListener)>,
}

#[derive(Default)]
pub struct UnlockState {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl UnlockState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record that the database at `path` is encrypted and waiting for a key.
    pub fn mark_locked(&self, path: impl Into<PathBuf>, connection_string: Option<String>) {
        let path = path.into();
        tracing::info!(path = %path.display(), "database locked");
        let mut inner = self.lock();
        inner.needs_unlock = true;
        inner.database_path = Some(path);
        inner.connection_string = connection_string;
    }

    pub fn needs_unlock(&self) -> bool {
        self.lock().needs_unlock
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.lock().database_path.clone()
    }

    pub fn connection_string(&self) -> Option<String> {
        self.lock().connection_string.clone()
    }

    /// Register `listener` for unlock notifications.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(existing, _)| *existing != id);
        inner.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Clear the locked flag and notify every listener, in registration
    /// order, exactly once.
    ///
    /// Returns false without notifying anyone when the state is not locked.
    /// Listeners run on the calling thread after the internal lock is
    /// released, so a listener may query or re-lock the state.
    pub fn notify_unlock_success(&self) -> bool {
        let listeners: Vec<UnlockListener> = {
            let mut inner = self.lock();
            if !inner.needs_unlock {
                return false;
            }
            inner.needs_unlock = false;
            inner
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };

        tracing::info!(listeners = listeners.len(), "database unlocked");
        for listener in listeners {
            listener();
        }
        true
    }
}

impl std::fmt::Debug for UnlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("UnlockState")
            .field("needs_unlock", &inner.needs_unlock)
            .field("database_path", &inner.database_path)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}
