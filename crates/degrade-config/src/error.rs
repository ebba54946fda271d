//! Error types for degrade action compilation
//!
//! - [`ConfigError`]: one entry's fallback spec is unusable; the entry is skipped
//! - [`CompileError`]: the whole configuration could not be compiled; the
//!   previous registry stays in force

use degrade_core::{ConfigStoreError, ScriptError};

/// Errors in a single method's fallback spec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Text is not valid JSON (bare keys allowed)
    #[error("malformed fallback spec: {0}")]
    Malformed(String),

    /// Fallback spec is not a JSON object
    #[error("fallback spec must be an object")]
    NotAnObject,

    /// Spec could not be mapped onto its fields
    #[error("invalid fallback spec: {0}")]
    Deserialize(String),

    /// Type name is not registered
    #[error("unknown type: '{0}'")]
    UnknownType(String),

    /// Content does not match its declared type
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Declared type name
        expected: String,
        /// Kind of the content found
        found: String,
    },

    /// Declared exception type is not an exception
    #[error("invalid exception class: {0}")]
    NotAnException(String),

    /// Map key cannot be read as the declared key type
    #[error("invalid map key '{key}' for key type {key_type}")]
    InvalidKey {
        /// Raw map key
        key: String,
        /// Declared key type name
        key_type: String,
    },

    /// Content required by the strategy is absent
    #[error("missing content for {0}")]
    MissingContent(&'static str),

    /// Embedded script did not compile
    #[error("script error: {0}")]
    Script(#[from] ScriptError),
}

impl ConfigError {
    /// Create type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Errors that abort a whole compilation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Configuration store failed while resolving entries
    #[error("config store failure: {0}")]
    Store(#[from] ConfigStoreError),
}
