//! Compiled fallback proxy cache
//!
//! Proxies over compiled scripts are built lazily on first use per call key.
//! Entries carry the registry generation they were built for, so an entry
//! left over from before a reload is never handed out.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use degrade_core::FallbackTarget;
use std::sync::Arc;

#[derive(Clone)]
struct CachedProxy {
    generation: u64,
    proxy: Arc<dyn FallbackTarget>,
}

/// Concurrent memoized proxy factory keyed by call key
#[derive(Default)]
pub struct ProxyCache {
    entries: DashMap<String, CachedProxy>,
}

impl ProxyCache {
    /// Create empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached proxy for `key`, building it with `build` on first use
    ///
    /// `build` runs without holding any shard lock, so racing callers may
    /// each build a proxy. The first one inserted is kept and returned to
    /// every caller; the others are dropped. A caller holding an older
    /// generation than the cached entry gets its own proxy and leaves the
    /// cache untouched.
    pub fn get_or_insert_with<F>(&self, key: &str, generation: u64, build: F) -> Arc<dyn FallbackTarget>
    where
        F: FnOnce() -> Arc<dyn FallbackTarget>,
    {
        if let Some(cached) = self.entries.get(key) {
            if cached.generation == generation {
                return Arc::clone(&cached.proxy);
            }
        }

        let built = build();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().generation;
                if current == generation {
                    Arc::clone(&occupied.get().proxy)
                } else if current < generation {
                    occupied.insert(CachedProxy {
                        generation,
                        proxy: Arc::clone(&built),
                    });
                    built
                } else {
                    built
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CachedProxy {
                    generation,
                    proxy: Arc::clone(&built),
                });
                built
            }
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached proxies
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a proxy is cached for `key`
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl std::fmt::Debug for ProxyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCache")
            .field("len", &self.entries.len())
            .finish()
    }
}
