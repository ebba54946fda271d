//! Error types for the degradation pipeline
//!
//! Provides the error taxonomy shared by every stage:
//! - Transport failures raised by the downstream handler ([`RpcError`])
//! - Business exceptions carried inside responses ([`ExceptionDescriptor`])
//! - Failures while synthesizing a substitute response ([`FallbackError`])
//! - Collaborator failures (config store, script engine)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Well-known exception kinds produced by the degradation layer itself
pub mod exception_kinds {
    /// Forced or proactive degrade with no configured exception
    pub const SERVICE_DEGRADED: &str = "service-degraded";
    /// Marker reported when a failed call was answered by a substitute
    pub const SERVICE_FAILURE_DEGRADED: &str = "service-failure-degraded";
    /// Wrapper for fallback failures that are not already exceptions
    pub const APPLICATION_ERROR: &str = "application-error";
}

/// Transport error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorKind {
    /// No provider could be reached
    ServiceUnavailable,
    /// The remote side failed while executing the call
    RemoteInvocation,
    /// The call exceeded its timeout
    RequestTimeout,
    /// The request was rejected (throttled, overloaded)
    Rejected,
    /// Request or response could not be (de)serialized
    Serialization,
    /// Anything else raised by the transport
    Other,
}

impl RpcErrorKind {
    /// Whether this kind is eligible for reactive (failure-driven) degrade
    #[inline]
    #[must_use]
    pub fn is_degradable(self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable | Self::RemoteInvocation | Self::RequestTimeout | Self::Rejected
        )
    }

    /// Stable label, used for logs and metric labels
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceUnavailable => "service_unavailable",
            Self::RemoteInvocation => "remote_invocation",
            Self::RequestTimeout => "request_timeout",
            Self::Rejected => "rejected",
            Self::Serialization => "serialization",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-layer failure surfaced by the downstream handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RpcError {
    kind: RpcErrorKind,
    message: String,
}

impl RpcError {
    /// Create error of the given kind
    #[inline]
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// No provider available
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::ServiceUnavailable, message)
    }

    /// Remote execution failure
    pub fn remote_invocation(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::RemoteInvocation, message)
    }

    /// Call timed out
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::RequestTimeout, message)
    }

    /// Request rejected
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Rejected, message)
    }

    /// Error classification
    #[inline]
    #[must_use]
    pub fn kind(&self) -> RpcErrorKind {
        self.kind
    }

    /// Human-readable message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Shorthand for `self.kind().is_degradable()`
    #[inline]
    #[must_use]
    pub fn is_degradable(&self) -> bool {
        self.kind.is_degradable()
    }
}

/// A business exception: a typed, serializable error value
///
/// Travels inside `ServiceException` responses, is delivered to failure
/// callbacks, and is what a fallback "throws".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionDescriptor {
    /// Exception type name
    pub kind: String,
    /// Optional message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Extra structured fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl ExceptionDescriptor {
    /// Create exception of the given kind
    #[inline]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: None,
            fields: Map::new(),
        }
    }

    /// With message
    #[inline]
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// With an extra field
    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Generic "service degraded" exception keyed by call identity
    pub fn service_degraded(call_key: &str) -> Self {
        Self::new(exception_kinds::SERVICE_DEGRADED).with_message(call_key)
    }

    /// Marker for a failed call that was answered by a substitute
    #[must_use]
    pub fn service_failure_degraded() -> Self {
        Self::new(exception_kinds::SERVICE_FAILURE_DEGRADED)
    }

    /// Generic application error wrapper
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(exception_kinds::APPLICATION_ERROR).with_message(message)
    }

    /// Check exception kind
    #[inline]
    #[must_use]
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for ExceptionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => f.write_str(&self.kind),
        }
    }
}

impl std::error::Error for ExceptionDescriptor {}

/// Why a call is being degraded reactively, or what is reported as its failure
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// Transport failure
    Transport(RpcError),
    /// Business exception opted into degradation
    Business(ExceptionDescriptor),
    /// The call failed and a substitute was returned
    FailureDegraded,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "transport failure: {err}"),
            Self::Business(exception) => write!(f, "business exception: {exception}"),
            Self::FailureDegraded => f.write_str(exception_kinds::SERVICE_FAILURE_DEGRADED),
        }
    }
}

impl From<RpcError> for FailureCause {
    fn from(err: RpcError) -> Self {
        Self::Transport(err)
    }
}

impl From<ExceptionDescriptor> for FailureCause {
    fn from(exception: ExceptionDescriptor) -> Self {
        Self::Business(exception)
    }
}

/// Errors raised while computing a substitute response
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FallbackError {
    /// The fallback deliberately raised an exception
    #[error("fallback raised {0}")]
    Raised(ExceptionDescriptor),

    /// Delegate target failed while handling the call
    #[error("delegate invocation of '{method}' failed: {message}")]
    Delegate {
        /// Method that was invoked on the target
        method: String,
        /// Target's failure description
        message: String,
    },

    /// Delegate target has no handler for the method
    #[error("no fallback handler for method '{0}'")]
    NoSuchMethod(String),

    /// Compiled script failed at evaluation time
    #[error("script evaluation failed: {0}")]
    Script(String),
}

impl FallbackError {
    /// Create delegate error
    pub fn delegate(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delegate {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Convert into the business-exception shape delivered to callers
    ///
    /// Raised exceptions pass through; everything else becomes an
    /// application error.
    #[must_use]
    pub fn into_exception(self) -> ExceptionDescriptor {
        match self {
            Self::Raised(exception) => exception,
            other => ExceptionDescriptor::application(other.to_string()),
        }
    }
}

impl From<ExceptionDescriptor> for FallbackError {
    fn from(exception: ExceptionDescriptor) -> Self {
        Self::Raised(exception)
    }
}

/// Script compilation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// Source text could not be parsed
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Character offset of the failure
        offset: usize,
        /// What was expected there
        message: String,
    },

    /// Script references a native function that is not registered
    #[error("unknown native function: {0}")]
    UnknownNative(String),

    /// Empty source
    #[error("empty script")]
    Empty,
}

/// Configuration store failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigStoreError {
    /// Store could not be reached
    #[error("config store unavailable: {0}")]
    Unavailable(String),

    /// Store returned a value it could not decode
    #[error("invalid value for '{key}': {message}")]
    InvalidValue {
        /// Key that was read
        key: String,
        /// Why the value is unusable
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rpc_error_display() {
        let err = RpcError::timeout("no reply in 1000ms");
        assert_eq!(err.to_string(), "request_timeout: no reply in 1000ms");
    }

    #[test]
    fn degradable_kinds() {
        assert!(RpcError::unavailable("x").is_degradable());
        assert!(RpcError::remote_invocation("x").is_degradable());
        assert!(RpcError::timeout("x").is_degradable());
        assert!(RpcError::rejected("x").is_degradable());
        assert!(!RpcError::new(RpcErrorKind::Serialization, "x").is_degradable());
        assert!(!RpcError::new(RpcErrorKind::Other, "x").is_degradable());
    }

    #[test]
    fn service_degraded_carries_key() {
        let exception = ExceptionDescriptor::service_degraded("svcA#m1");
        assert!(exception.is_kind(exception_kinds::SERVICE_DEGRADED));
        assert_eq!(exception.message.as_deref(), Some("svcA#m1"));
        assert_eq!(exception.to_string(), "service-degraded: svcA#m1");
    }

    #[test]
    fn fallback_error_into_exception() {
        let raised = ExceptionDescriptor::new("quota-exceeded");
        assert_eq!(
            FallbackError::Raised(raised.clone()).into_exception(),
            raised
        );

        let wrapped = FallbackError::delegate("m1", "boom").into_exception();
        assert!(wrapped.is_kind(exception_kinds::APPLICATION_ERROR));
        assert!(wrapped.message.unwrap().contains("boom"));
    }

    #[test]
    fn exception_serde_skips_empty() {
        let json = serde_json::to_value(ExceptionDescriptor::new("x")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "x"}));
    }
}
