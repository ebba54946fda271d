//! Core invocation types
//!
//! Calling conventions, per-service invoker settings, timeline markers and
//! monitoring data shared by the whole pipeline.

use crate::collaborators::{FallbackTarget, InvocationCallback};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// How a result or error is delivered to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMethod {
    /// Caller blocks for the response
    #[default]
    Sync,
    /// Caller receives a future
    Future,
    /// Result delivered through a callback
    Callback,
    /// Fire-and-forget
    Oneway,
}

impl CallMethod {
    /// Stable wire code
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Sync => 1,
            Self::Future => 2,
            Self::Callback => 3,
            Self::Oneway => 4,
        }
    }

    /// Decode wire code
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Sync),
            2 => Some(Self::Future),
            3 => Some(Self::Callback),
            4 => Some(Self::Oneway),
            _ => None,
        }
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Future => "future",
            Self::Callback => "callback",
            Self::Oneway => "oneway",
        }
    }
}

impl fmt::Display for CallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "future" => Ok(Self::Future),
            "callback" => Ok(Self::Callback),
            "oneway" => Ok(Self::Oneway),
            other => Err(format!("unknown call method: {other}")),
        }
    }
}

/// Per-service invoker settings
///
/// Shared by every call made through one service reference. Holds the
/// defaults plus per-method overrides for calling convention and timeout,
/// and the optional pre-registered mock object and callback.
#[derive(Clone)]
pub struct InvokerSettings {
    url: String,
    call_method: CallMethod,
    method_call_methods: HashMap<String, CallMethod>,
    timeout_ms: u64,
    method_timeouts: HashMap<String, u64>,
    serialize: String,
    mock: Option<Arc<dyn FallbackTarget>>,
    callback: Option<Arc<dyn InvocationCallback>>,
}

impl InvokerSettings {
    /// Default call timeout
    pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

    /// Create settings for a service url
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            call_method: CallMethod::Sync,
            method_call_methods: HashMap::new(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            method_timeouts: HashMap::new(),
            serialize: "json".to_string(),
            mock: None,
            callback: None,
        }
    }

    /// With default calling convention
    #[inline]
    #[must_use]
    pub fn with_call_method(mut self, call_method: CallMethod) -> Self {
        self.call_method = call_method;
        self
    }

    /// With calling convention for one method
    #[must_use]
    pub fn with_method_call_method(mut self, method: impl Into<String>, call_method: CallMethod) -> Self {
        self.method_call_methods.insert(method.into(), call_method);
        self
    }

    /// With default timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// With timeout for one method
    #[must_use]
    pub fn with_method_timeout_ms(mut self, method: impl Into<String>, timeout_ms: u64) -> Self {
        self.method_timeouts.insert(method.into(), timeout_ms);
        self
    }

    /// With serialization name
    #[must_use]
    pub fn with_serialize(mut self, serialize: impl Into<String>) -> Self {
        self.serialize = serialize.into();
        self
    }

    /// With mock object used by mock-backed fallbacks
    #[must_use]
    pub fn with_mock(mut self, mock: Arc<dyn FallbackTarget>) -> Self {
        self.mock = Some(mock);
        self
    }

    /// With callback used by callback-convention calls
    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn InvocationCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Service url
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Default calling convention
    #[inline]
    #[must_use]
    pub fn default_call_method(&self) -> CallMethod {
        self.call_method
    }

    /// Calling convention for a method
    #[must_use]
    pub fn call_method_for(&self, method: &str) -> CallMethod {
        self.method_call_methods
            .get(method)
            .copied()
            .unwrap_or(self.call_method)
    }

    /// Timeout for a method
    #[must_use]
    pub fn timeout_for(&self, method: &str) -> u64 {
        self.method_timeouts
            .get(method)
            .copied()
            .unwrap_or(self.timeout_ms)
    }

    /// Serialization name
    #[inline]
    #[must_use]
    pub fn serialize(&self) -> &str {
        &self.serialize
    }

    /// Registered mock object
    #[inline]
    #[must_use]
    pub fn mock(&self) -> Option<&Arc<dyn FallbackTarget>> {
        self.mock.as_ref()
    }

    /// Registered callback
    #[inline]
    #[must_use]
    pub fn callback(&self) -> Option<&Arc<dyn InvocationCallback>> {
        self.callback.as_ref()
    }
}

impl fmt::Debug for InvokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokerSettings")
            .field("url", &self.url)
            .field("call_method", &self.call_method)
            .field("method_call_methods", &self.method_call_methods)
            .field("timeout_ms", &self.timeout_ms)
            .field("method_timeouts", &self.method_timeouts)
            .field("serialize", &self.serialize)
            .field("has_mock", &self.mock.is_some())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Pipeline phase marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimePhase {
    /// Context created
    Start,
    /// Entered the degradation stage
    Degrade,
}

/// Timeline entry
#[derive(Debug, Clone, Copy)]
pub struct TimePoint {
    /// Phase reached
    pub phase: TimePhase,
    /// When it was reached
    pub at: Instant,
}

impl TimePoint {
    /// Marker for now
    #[inline]
    #[must_use]
    pub fn now(phase: TimePhase) -> Self {
        Self {
            phase,
            at: Instant::now(),
        }
    }
}

/// Per-call monitoring record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorData {
    /// Calling convention of the service
    pub call_method: Option<CallMethod>,
    /// Serialization name
    pub serialize: Option<String>,
    /// Effective timeout
    pub timeout_ms: Option<u64>,
    /// Times the record was submitted
    pub submissions: u32,
    /// Whether the call was answered by a substitute
    pub degraded: bool,
}

impl MonitorData {
    /// Submit the record
    #[inline]
    pub fn add(&mut self) {
        self.submissions += 1;
    }

    /// Flag the call as degraded
    #[inline]
    pub fn degrade(&mut self) {
        self.degraded = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn call_method_codes_roundtrip() {
        for method in [CallMethod::Sync, CallMethod::Future, CallMethod::Callback, CallMethod::Oneway] {
            assert_eq!(CallMethod::from_code(method.code()), Some(method));
        }
        assert_eq!(CallMethod::from_code(0), None);
    }

    #[test]
    fn call_method_from_str() {
        assert_eq!("Future".parse::<CallMethod>(), Ok(CallMethod::Future));
        assert!("async".parse::<CallMethod>().is_err());
    }

    #[test]
    fn per_method_overrides() {
        let settings = InvokerSettings::new("svcA")
            .with_timeout_ms(800)
            .with_method_timeout_ms("slow", 3_000)
            .with_method_call_method("notify", CallMethod::Oneway);

        assert_eq!(settings.timeout_for("fast"), 800);
        assert_eq!(settings.timeout_for("slow"), 3_000);
        assert_eq!(settings.call_method_for("notify"), CallMethod::Oneway);
        assert_eq!(settings.call_method_for("query"), CallMethod::Sync);
    }

    #[test]
    fn settings_debug_hides_objects() {
        let debug = format!("{:?}", InvokerSettings::new("svcA"));
        assert!(debug.contains("has_mock: false"));
    }
}
