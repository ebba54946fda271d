//! Degrade Action Compiler
//!
//! Turns the methods list (`alias=lookupKey,...`) plus one fallback spec per
//! lookup key into a map of [`DegradeAction`]s. Per-entry failures are
//! logged and skipped; only a config store failure aborts the compilation.

use crate::action::{DegradeAction, FallbackStrategy};
use crate::config::DegradeActionConfig;
use crate::error::{CompileError, ConfigError};
use crate::script::ExpressionScriptEngine;
use crate::types::TypeRegistry;
use degrade_core::{ConfigStore, ScriptEngine};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Config key holding the methods list
pub const KEY_DEGRADE_METHODS: &str = "pigeon.invoker.degrade.methods";

/// Prefix of the per-method fallback spec keys
pub const KEY_DEGRADE_METHOD_PREFIX: &str = "pigeon.invoker.degrade.method.return.";

/// Entry dropped during compilation
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    /// Raw pair text
    pub pair: String,
    /// Why it was dropped
    pub reason: SkipReason,
}

/// Why an entry was dropped
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Not exactly `alias=lookupKey`
    MalformedPair,
    /// Alias is blank
    EmptyAlias,
    /// Fallback spec could not be compiled
    Invalid(ConfigError),
}

/// Result of one compilation
#[derive(Debug, Default)]
pub struct CompiledActions {
    /// Actions by alias
    pub actions: HashMap<String, Arc<DegradeAction>>,
    /// Entries that were dropped
    pub skipped: Vec<SkippedEntry>,
}

/// Compiles degrade configuration into actions
pub struct DegradeActionCompiler {
    store: Arc<dyn ConfigStore>,
    types: Arc<TypeRegistry>,
    scripts: Arc<dyn ScriptEngine>,
    method_prefix: String,
}

impl std::fmt::Debug for DegradeActionCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradeActionCompiler")
            .field("method_prefix", &self.method_prefix)
            .finish_non_exhaustive()
    }
}

impl DegradeActionCompiler {
    /// Create compiler reading fallback specs from `store`
    ///
    /// Uses the built-in types and an expression engine without natives.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            types: Arc::new(TypeRegistry::with_builtins()),
            scripts: Arc::new(ExpressionScriptEngine::new()),
            method_prefix: KEY_DEGRADE_METHOD_PREFIX.to_string(),
        }
    }

    /// With a custom type registry
    #[must_use]
    pub fn with_types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = types;
        self
    }

    /// With a custom script engine
    #[must_use]
    pub fn with_script_engine(mut self, scripts: Arc<dyn ScriptEngine>) -> Self {
        self.scripts = scripts;
        self
    }

    /// With a custom spec key prefix
    #[must_use]
    pub fn with_method_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.method_prefix = prefix.into();
        self
    }

    /// Type registry in use
    #[inline]
    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Compile a methods list
    ///
    /// Blank text compiles to an empty map.
    ///
    /// # Errors
    /// `CompileError::Store` if a fallback spec cannot be read
    pub fn compile(&self, text: &str) -> Result<CompiledActions, CompileError> {
        let mut compiled = CompiledActions::default();
        if text.trim().is_empty() {
            return Ok(compiled);
        }

        for raw in text.split(',') {
            if raw.trim().is_empty() {
                continue;
            }
            let Some((alias, lookup_key)) = split_pair(raw) else {
                warn!(pair = %raw, "skipping malformed degrade pair");
                compiled.skipped.push(SkippedEntry {
                    pair: raw.to_string(),
                    reason: SkipReason::MalformedPair,
                });
                continue;
            };
            if alias.is_empty() {
                warn!(pair = %raw, "skipping degrade pair with empty alias");
                compiled.skipped.push(SkippedEntry {
                    pair: raw.to_string(),
                    reason: SkipReason::EmptyAlias,
                });
                continue;
            }

            match self.compile_entry(lookup_key) {
                Ok(action) => {
                    debug!(alias, lookup_key, "degrade action compiled");
                    compiled.actions.insert(alias.to_string(), Arc::new(action));
                }
                Err(EntryError::Config(err)) => {
                    warn!(alias, lookup_key, error = %err, "skipping invalid degrade action");
                    compiled.skipped.push(SkippedEntry {
                        pair: raw.to_string(),
                        reason: SkipReason::Invalid(err),
                    });
                }
                Err(EntryError::Store(err)) => return Err(err.into()),
            }
        }
        Ok(compiled)
    }

    fn compile_entry(&self, lookup_key: &str) -> Result<DegradeAction, EntryError> {
        if lookup_key.is_empty() {
            return Ok(DegradeAction::none());
        }
        let key = format!("{}{}", self.method_prefix, lookup_key);
        let spec = self.store.get_string(&key).map_err(EntryError::Store)?;
        match spec.as_deref().map(str::trim) {
            None | Some("") => Ok(DegradeAction::none()),
            Some(text) => {
                let config = DegradeActionConfig::from_json_like(text)?;
                Ok(self.build_action(&config)?)
            }
        }
    }

    /// Resolve one parsed spec into an action
    ///
    /// First match wins: mock, script, exception, then typed value.
    ///
    /// # Errors
    /// Script compile errors, unknown types, content that does not fit
    pub fn build_action(&self, config: &DegradeActionConfig) -> Result<DegradeAction, ConfigError> {
        let content = config.content_text();
        let content = content.as_deref();

        let action = if config.use_mock_class {
            DegradeAction::delegate()
        } else if config.use_script {
            let source = content.ok_or(ConfigError::MissingContent("script"))?;
            DegradeAction::script(self.scripts.compile(source)?)
        } else if config.throw_exception {
            match config.return_type() {
                Some(exception_type) => {
                    let exception = self.types.deserialize_exception(exception_type, content)?;
                    DegradeAction::exception(Some(exception))
                }
                None => DegradeAction::exception(None),
            }
        } else if let (Some(key_type), Some(value_type)) = (config.key_type(), config.value_type()) {
            let value = self
                .types
                .deserialize_map(config.return_type(), key_type, value_type, content)?;
            DegradeAction::new(FallbackStrategy::Literal(value))
        } else if let Some(element_type) = config.element_type() {
            let value = self
                .types
                .deserialize_collection(config.return_type(), element_type, content)?;
            DegradeAction::new(FallbackStrategy::Literal(value))
        } else if let Some(return_type) = config.return_type() {
            let value = self.types.deserialize_value(return_type, content)?;
            DegradeAction::new(FallbackStrategy::Literal(value))
        } else {
            DegradeAction::none()
        };

        Ok(action.with_enabled(config.enable))
    }
}

enum EntryError {
    Config(ConfigError),
    Store(degrade_core::ConfigStoreError),
}

impl From<ConfigError> for EntryError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Split `alias=lookupKey`, both sides trimmed
///
/// Trailing empty parts are dropped before counting, so `a=b=` is accepted
/// while `a=`, `a=b=c` and `=` are not.
fn split_pair(raw: &str) -> Option<(&str, &str)> {
    let mut parts: Vec<&str> = raw.split('=').collect();
    while parts.len() > 1 && parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    match parts.as_slice() {
        [alias, lookup_key] => Some((alias.trim(), lookup_key.trim())),
        _ => None,
    }
}
