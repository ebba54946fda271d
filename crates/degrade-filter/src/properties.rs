//! Properties file loading
//!
//! A TOML file with a flat `[properties]` table of config keys plus an
//! optional `[settings]` table for the filter:
//!
//! ```toml
//! [settings]
//! fail_fast_on_startup = false
//!
//! [properties]
//! "pigeon.invoker.degrade.methods" = "svcA#m1=svcA#m1"
//! "pigeon.invoker.degrade.method.return.svcA#m1" = '{returnClass:"string", content:"\"ok\""}'
//! ```

use crate::error::FilterError;
use crate::settings::FilterSettings;
use degrade_config::MemoryConfigStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Parsed properties file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertiesFile {
    /// Filter settings, defaults when absent
    pub settings: Option<FilterSettings>,
    /// Raw config values
    pub properties: BTreeMap<String, String>,
}

impl PropertiesFile {
    /// Parse from TOML text
    ///
    /// # Errors
    /// The text is not valid TOML or does not match the layout
    pub fn from_toml_str(text: &str) -> Result<Self, FilterError> {
        toml::from_str(text).map_err(|e| FilterError::Properties(e.to_string()))
    }

    /// Read and parse a file
    ///
    /// # Errors
    /// The file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FilterError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FilterError::Properties(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Effective filter settings
    #[must_use]
    pub fn settings(&self) -> FilterSettings {
        self.settings.clone().unwrap_or_default()
    }

    /// Value of one property
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// In-memory store holding every property
    #[must_use]
    pub fn into_store(self) -> MemoryConfigStore {
        MemoryConfigStore::with_values(self.properties)
    }
}
