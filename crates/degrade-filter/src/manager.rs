//! Degrade action lifecycle
//!
//! Compiles the methods list at startup, installs it into the shared
//! registry, and recompiles whenever the store reports a change under the
//! methods key. A failed reload keeps the previous actions.

use crate::error::FilterError;
use crate::settings::FilterSettings;
use degrade_config::{DegradeActionCompiler, DegradeActionRegistry, SkippedEntry};
use degrade_core::{ConfigStore, DecisionEngine};
use degrade_fallback::FallbackExecutor;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{error, info, warn};

/// Owns startup compilation and live reloads of degrade actions
pub struct DegradeActionManager {
    compiler: DegradeActionCompiler,
    registry: Arc<DegradeActionRegistry>,
    settings: FilterSettings,
    last_skipped: Mutex<Vec<SkippedEntry>>,
    reload_lock: Mutex<()>,
}

impl std::fmt::Debug for DegradeActionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradeActionManager")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DegradeActionManager {
    /// Compile the current methods list and subscribe to its changes
    ///
    /// # Errors
    /// The startup compilation failed and `fail_fast_on_startup` is set
    pub fn start(
        store: Arc<dyn ConfigStore>,
        registry: Arc<DegradeActionRegistry>,
        settings: FilterSettings,
    ) -> Result<Arc<Self>, FilterError> {
        let compiler = DegradeActionCompiler::new(Arc::clone(&store)).with_method_prefix(settings.method_prefix.clone());
        Self::start_with(compiler, store, registry, settings)
    }

    /// Like [`Self::start`] with a preconfigured compiler
    ///
    /// # Errors
    /// The startup compilation failed and `fail_fast_on_startup` is set
    pub fn start_with(
        compiler: DegradeActionCompiler,
        store: Arc<dyn ConfigStore>,
        registry: Arc<DegradeActionRegistry>,
        settings: FilterSettings,
    ) -> Result<Arc<Self>, FilterError> {
        let manager = Arc::new(Self {
            compiler,
            registry,
            settings,
            last_skipped: Mutex::new(Vec::new()),
            reload_lock: Mutex::new(()),
        });

        let initial = store
            .get_string(&manager.settings.methods_key)
            .map_err(FilterError::from)
            .and_then(|text| manager.reload(text.as_deref().unwrap_or_default()));
        match initial {
            Ok(generation) => info!(
                generation,
                actions = manager.registry.snapshot().len(),
                "degrade actions loaded"
            ),
            Err(err) if manager.settings.fail_fast_on_startup && err.is_fatal() => return Err(err),
            Err(err) => error!(error = %err, "initial degrade configuration failed; starting without actions"),
        }

        let weak: Weak<Self> = Arc::downgrade(&manager);
        store.on_change(
            &manager.settings.methods_key,
            Arc::new(move |key: &str, value: &str| {
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                if let Err(err) = manager.reload(value) {
                    warn!(key, error = %err, "degrade reload failed; keeping previous actions");
                }
            }),
        );
        Ok(manager)
    }

    /// Recompile `text` and install it as the new registry content
    ///
    /// Blank text empties the registry. Returns the installed generation.
    ///
    /// # Errors
    /// The methods list could not be compiled; the registry is untouched
    pub fn reload(&self, text: &str) -> Result<u64, FilterError> {
        let _guard = self.reload_lock.lock();
        let compiled = self.compiler.compile(text)?;
        let generation = self.registry.install(compiled.actions);
        if !compiled.skipped.is_empty() {
            warn!(
                generation,
                skipped = compiled.skipped.len(),
                "degrade actions installed with skipped entries"
            );
        }
        *self.last_skipped.lock() = compiled.skipped;
        Ok(generation)
    }

    /// Shared registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<DegradeActionRegistry> {
        &self.registry
    }

    /// Executor over the managed registry, recording timeouts under the configured data key
    #[must_use]
    pub fn executor(&self, engine: Arc<dyn DecisionEngine>) -> FallbackExecutor {
        FallbackExecutor::new(Arc::clone(&self.registry), engine)
            .with_timeout_data_key(self.settings.timeout_data_key.clone())
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// Entries dropped by the last successful compilation
    #[must_use]
    pub fn skipped(&self) -> Vec<SkippedEntry> {
        self.last_skipped.lock().clone()
    }
}
