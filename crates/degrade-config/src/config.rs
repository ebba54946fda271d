//! Raw fallback spec of one method

use crate::error::ConfigError;
use crate::json::parse_json_like;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag injected into every spec before deserialization
pub const CONFIG_TYPE_TAG: &str = "DegradeActionConfig";

/// One method's fallback spec as written in the config store
///
/// ```text
/// {enable:true, returnClass:"string", content:"\"ok\""}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DegradeActionConfig {
    /// Synthetic type tag, transparent to config authors
    #[serde(rename = "@class", skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    /// Delegate to the invoker's mock object
    pub use_mock_class: bool,
    /// Evaluate `content` as a script
    #[serde(rename = "useGroovyScript", alias = "useScript")]
    pub use_script: bool,
    /// Raise the exception described by `content`
    pub throw_exception: bool,
    /// Whether the action is switched on
    pub enable: bool,
    /// Script source or serialized value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Type of the value (or map container, or exception)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_class: Option<String>,
    /// Map key type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_class: Option<String>,
    /// Map value type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_class: Option<String>,
    /// Collection element type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_class: Option<String>,
}

impl Default for DegradeActionConfig {
    fn default() -> Self {
        Self {
            type_tag: None,
            use_mock_class: false,
            use_script: false,
            throw_exception: false,
            enable: true,
            content: None,
            return_class: None,
            key_class: None,
            value_class: None,
            component_class: None,
        }
    }
}

impl DegradeActionConfig {
    /// Parse a spec, accepting bare object keys
    ///
    /// # Errors
    /// Malformed text, a non-object, or fields of the wrong type
    pub fn from_json_like(text: &str) -> Result<Self, ConfigError> {
        let mut value = parse_json_like(text)?;
        let Value::Object(fields) = &mut value else {
            return Err(ConfigError::NotAnObject);
        };
        fields
            .entry("@class")
            .or_insert_with(|| Value::String(CONFIG_TYPE_TAG.to_string()));
        serde_json::from_value(value).map_err(|e| ConfigError::Deserialize(e.to_string()))
    }

    /// `content` as text
    ///
    /// Strings are returned as-is; any other JSON value is re-serialized so
    /// authors may inline structured content.
    #[must_use]
    pub fn content_text(&self) -> Option<String> {
        match &self.content {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    /// Declared type name, blank treated as absent
    fn non_blank(name: Option<&String>) -> Option<&str> {
        name.map(String::as_str).filter(|n| !n.trim().is_empty())
    }

    /// Non-blank `returnClass`
    #[must_use]
    pub fn return_type(&self) -> Option<&str> {
        Self::non_blank(self.return_class.as_ref())
    }

    /// Non-blank `keyClass`
    #[must_use]
    pub fn key_type(&self) -> Option<&str> {
        Self::non_blank(self.key_class.as_ref())
    }

    /// Non-blank `valueClass`
    #[must_use]
    pub fn value_type(&self) -> Option<&str> {
        Self::non_blank(self.value_class.as_ref())
    }

    /// Non-blank `componentClass`
    #[must_use]
    pub fn element_type(&self) -> Option<&str> {
        Self::non_blank(self.component_class.as_ref())
    }
}
