//! In-memory configuration store

use degrade_core::{ConfigListener, ConfigStore, ConfigStoreError};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::trace;

/// Configuration store backed by a map
///
/// Every `set` notifies listeners whose suffix matches the key. Listeners
/// run on the calling thread, after the write lock is released.
#[derive(Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, String>>,
    listeners: RwLock<Vec<(String, ConfigListener)>>,
}

impl MemoryConfigStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store pre-filled with values
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Set a value and notify matching listeners
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        self.values.write().insert(key.clone(), value.clone());

        let matching: Vec<ConfigListener> = self
            .listeners
            .read()
            .iter()
            .filter(|(suffix, _)| key.ends_with(suffix.as_str()))
            .map(|(_, listener)| ConfigListener::clone(listener))
            .collect();
        trace!(key = %key, listeners = matching.len(), "config value set");
        for listener in matching {
            listener(&key, &value);
        }
    }

    /// Remove a value; listeners are not notified
    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.write().remove(key)
    }

    /// Number of registered listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for MemoryConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConfigStore")
            .field("keys", &self.values.read().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, ConfigStoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn on_change(&self, key_suffix: &str, listener: ConfigListener) {
        self.listeners.write().push((key_suffix.to_string(), listener));
    }
}
