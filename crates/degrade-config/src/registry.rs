//! Degrade Action Registry
//!
//! Readers load the current [`RegistrySnapshot`] wait-free; a reload builds
//! a complete new snapshot and publishes it in one atomic swap, so a reader
//! sees either the old map or the new one in full.

use crate::action::DegradeAction;
use crate::cache::ProxyCache;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Immutable generation of the registry
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    actions: HashMap<String, Arc<DegradeAction>>,
}

impl RegistrySnapshot {
    /// Generation number, bumped on every install
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Action configured for a call key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<DegradeAction>> {
        self.actions.get(key)
    }

    /// All actions
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &HashMap<String, Arc<DegradeAction>> {
        &self.actions
    }

    /// Number of configured keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no keys are configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Shared registry of degrade actions plus the proxy cache tied to it
#[derive(Debug)]
pub struct DegradeActionRegistry {
    current: ArcSwap<RegistrySnapshot>,
    proxies: ProxyCache,
    generation: AtomicU64,
    writer: Mutex<()>,
}

impl Default for DegradeActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DegradeActionRegistry {
    /// Create empty registry (generation 0)
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            proxies: ProxyCache::new(),
            generation: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    /// Current snapshot
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Action for a call key in the current snapshot
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<DegradeAction>> {
        self.current.load().get(key).cloned()
    }

    /// Current generation
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Replace every action, then clear the proxy cache once
    ///
    /// Returns the generation of the installed snapshot.
    pub fn install(&self, actions: HashMap<String, Arc<DegradeAction>>) -> u64 {
        let _writer = self.writer.lock();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let count = actions.len();
        self.current.store(Arc::new(RegistrySnapshot {
            generation,
            actions,
        }));
        self.proxies.clear();
        debug!(generation, actions = count, "degrade actions installed");
        generation
    }

    /// Remove every action
    pub fn clear(&self) -> u64 {
        self.install(HashMap::new())
    }

    /// Compiled proxy cache
    #[inline]
    #[must_use]
    pub fn proxies(&self) -> &ProxyCache {
        &self.proxies
    }
}
