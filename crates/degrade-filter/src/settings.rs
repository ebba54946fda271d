//! Filter settings

use degrade_config::{KEY_DEGRADE_METHODS, KEY_DEGRADE_METHOD_PREFIX};
use degrade_fallback::CURRENT_TIMEOUT_DATA_KEY;
use serde::{Deserialize, Serialize};

/// Settings of the degradation filter and its reload wiring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Config key holding the methods list; reloads trigger on keys ending with it
    pub methods_key: String,
    /// Prefix of the per-method fallback spec keys
    pub method_prefix: String,
    /// Monitoring data key for the effective timeout
    pub timeout_data_key: String,
    /// Whether a failed startup compilation aborts startup
    pub fail_fast_on_startup: bool,
}

impl FilterSettings {
    /// Create default settings
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With methods key
    #[inline]
    #[must_use]
    pub fn with_methods_key(mut self, key: impl Into<String>) -> Self {
        self.methods_key = key.into();
        self
    }

    /// With per-method spec prefix
    #[inline]
    #[must_use]
    pub fn with_method_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.method_prefix = prefix.into();
        self
    }

    /// With timeout monitoring data key
    #[inline]
    #[must_use]
    pub fn with_timeout_data_key(mut self, key: impl Into<String>) -> Self {
        self.timeout_data_key = key.into();
        self
    }

    /// With startup failure policy
    #[inline]
    #[must_use]
    pub fn with_fail_fast_on_startup(mut self, fail_fast: bool) -> Self {
        self.fail_fast_on_startup = fail_fast;
        self
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            methods_key: KEY_DEGRADE_METHODS.to_string(),
            method_prefix: KEY_DEGRADE_METHOD_PREFIX.to_string(),
            timeout_data_key: CURRENT_TIMEOUT_DATA_KEY.to_string(),
            fail_fast_on_startup: true,
        }
    }
}
