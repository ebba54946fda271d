//! Error types for the degradation filter

use degrade_config::CompileError;
use degrade_core::ConfigStoreError;

/// Errors raised while setting up the filter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// Degrade configuration could not be compiled
    #[error("degrade configuration could not be compiled: {0}")]
    Compile(#[from] CompileError),

    /// Methods list could not be read
    #[error("degrade methods list unavailable: {0}")]
    Store(#[from] ConfigStoreError),

    /// Properties file is unusable
    #[error("invalid properties file: {0}")]
    Properties(String),
}

impl FilterError {
    /// Whether this error must abort startup when fail-fast is on
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Compile(_) | Self::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_store_errors_are_fatal() {
        let store = ConfigStoreError::Unavailable("down".to_string());
        assert!(FilterError::from(store.clone()).is_fatal());
        assert!(FilterError::from(CompileError::from(store)).is_fatal());
        assert!(!FilterError::Properties("bad".to_string()).is_fatal());
    }
}
