//! Resolved fallback policies

use degrade_core::{CompiledScript, ExceptionDescriptor};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// How a substitute response is computed
#[derive(Clone)]
pub enum FallbackStrategy {
    /// Return the value verbatim (`None` means no value)
    Literal(Option<Value>),
    /// Raise the exception, or a generic "service degraded" one
    Exception(Option<ExceptionDescriptor>),
    /// Invoke the invoker's mock object
    Delegate,
    /// Evaluate a compiled script
    Script(Arc<dyn CompiledScript>),
}

impl fmt::Debug for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Exception(exception) => f.debug_tuple("Exception").field(exception).finish(),
            Self::Delegate => f.write_str("Delegate"),
            Self::Script(script) => f.debug_tuple("Script").field(&script.source()).finish(),
        }
    }
}

impl PartialEq for FallbackStrategy {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Exception(a), Self::Exception(b)) => a == b,
            (Self::Delegate, Self::Delegate) => true,
            (Self::Script(a), Self::Script(b)) => a.source() == b.source(),
            _ => false,
        }
    }
}

/// Fallback policy of one call key
///
/// Immutable once built. The mock/script/exception flags are derived from
/// the strategy, so at most one of them is ever set.
#[derive(Debug, Clone, PartialEq)]
pub struct DegradeAction {
    strategy: FallbackStrategy,
    enabled: bool,
}

impl DegradeAction {
    /// Create action from a strategy
    #[inline]
    #[must_use]
    pub fn new(strategy: FallbackStrategy) -> Self {
        Self {
            strategy,
            enabled: true,
        }
    }

    /// "No fallback defined": all flags false, no value
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::new(FallbackStrategy::Literal(None))
    }

    /// Return `value` verbatim
    #[inline]
    #[must_use]
    pub fn literal(value: Value) -> Self {
        Self::new(FallbackStrategy::Literal(Some(value)))
    }

    /// Raise `exception`, or a generic one when `None`
    #[inline]
    #[must_use]
    pub fn exception(exception: Option<ExceptionDescriptor>) -> Self {
        Self::new(FallbackStrategy::Exception(exception))
    }

    /// Delegate to the mock object
    #[inline]
    #[must_use]
    pub fn delegate() -> Self {
        Self::new(FallbackStrategy::Delegate)
    }

    /// Evaluate a script
    #[inline]
    #[must_use]
    pub fn script(script: Arc<dyn CompiledScript>) -> Self {
        Self::new(FallbackStrategy::Script(script))
    }

    /// With the `enable` flag from config
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Strategy
    #[inline]
    #[must_use]
    pub fn strategy(&self) -> &FallbackStrategy {
        &self.strategy
    }

    /// Delegates to the mock object
    #[inline]
    #[must_use]
    pub fn uses_mock_object(&self) -> bool {
        matches!(self.strategy, FallbackStrategy::Delegate)
    }

    /// Evaluates a script
    #[inline]
    #[must_use]
    pub fn uses_script(&self) -> bool {
        matches!(self.strategy, FallbackStrategy::Script(_))
    }

    /// Raises an exception
    #[inline]
    #[must_use]
    pub fn throws_exception(&self) -> bool {
        matches!(self.strategy, FallbackStrategy::Exception(_))
    }

    /// `enable` flag as configured
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Literal return value
    #[must_use]
    pub fn literal_value(&self) -> Option<&Value> {
        match &self.strategy {
            FallbackStrategy::Literal(value) => value.as_ref(),
            _ => None,
        }
    }

    /// Configured exception
    #[must_use]
    pub fn configured_exception(&self) -> Option<&ExceptionDescriptor> {
        match &self.strategy {
            FallbackStrategy::Exception(exception) => exception.as_ref(),
            _ => None,
        }
    }

    /// Compiled script
    #[must_use]
    pub fn compiled_script(&self) -> Option<&Arc<dyn CompiledScript>> {
        match &self.strategy {
            FallbackStrategy::Script(script) => Some(script),
            _ => None,
        }
    }

    /// JSON summary for admin output
    #[must_use]
    pub fn describe(&self) -> Value {
        let (strategy, detail) = match &self.strategy {
            FallbackStrategy::Literal(value) => ("literal", value.clone().unwrap_or(Value::Null)),
            FallbackStrategy::Exception(exception) => (
                "exception",
                exception
                    .as_ref()
                    .and_then(|e| serde_json::to_value(e).ok())
                    .unwrap_or(Value::Null),
            ),
            FallbackStrategy::Delegate => ("delegate", Value::Null),
            FallbackStrategy::Script(script) => ("script", Value::String(script.source().to_string())),
        };
        json!({
            "strategy": strategy,
            "enabled": self.enabled,
            "useMockClass": self.uses_mock_object(),
            "useScript": self.uses_script(),
            "throwException": self.throws_exception(),
            "detail": detail,
        })
    }
}

impl Default for DegradeAction {
    fn default() -> Self {
        Self::none()
    }
}
