//! Per-call invocation context
//!
//! Owned by exactly one call. Created by the pipeline, mutated only by the
//! stages of that call, dropped when the call completes.

use crate::collaborators::InvocationCallback;
use crate::error::FailureCause;
use crate::future::InvocationFuture;
use crate::response::InvocationResponse;
use crate::types::{CallMethod, InvokerSettings, MonitorData, TimePhase, TimePoint};
use once_cell::unsync::OnceCell;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Degradation state of one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DegradeInfo {
    /// The call failed and is being degraded reactively
    pub failure_degrade: bool,
    /// What triggered the reactive degrade
    pub cause: Option<FailureCause>,
    /// A substitute response was produced
    pub degraded: bool,
}

/// One-shot per-call overrides
///
/// `default_result` and `callback` are consumed on first read.
#[derive(Clone, Default)]
pub struct InvocationOverrides {
    /// Forced result returned instead of evaluating the fallback action
    pub default_result: Option<Value>,
    /// Callback that takes precedence over the configured one
    pub callback: Option<Arc<dyn InvocationCallback>>,
    /// Timeout that takes precedence over the configured one
    pub timeout_ms: Option<u64>,
}

impl InvocationOverrides {
    /// Consume the forced result
    #[inline]
    pub fn take_default_result(&mut self) -> Option<Value> {
        self.default_result.take()
    }

    /// Consume the forced callback
    #[inline]
    pub fn take_callback(&mut self) -> Option<Arc<dyn InvocationCallback>> {
        self.callback.take()
    }
}

impl fmt::Debug for InvocationOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationOverrides")
            .field("default_result", &self.default_result)
            .field("has_callback", &self.callback.is_some())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Mutable state of one invocation
#[derive(Debug)]
pub struct InvocationContext {
    settings: Arc<InvokerSettings>,
    method_name: String,
    parameter_types: Vec<String>,
    arguments: Vec<Value>,
    degrade_info: DegradeInfo,
    overrides: InvocationOverrides,
    timeline: Vec<TimePoint>,
    monitor_data: Option<MonitorData>,
    response: OnceCell<InvocationResponse>,
    future: Option<InvocationFuture>,
}

impl InvocationContext {
    /// Create context for a call of `method_name`
    pub fn new(settings: Arc<InvokerSettings>, method_name: impl Into<String>) -> Self {
        Self {
            settings,
            method_name: method_name.into(),
            parameter_types: Vec::new(),
            arguments: Vec::new(),
            degrade_info: DegradeInfo::default(),
            overrides: InvocationOverrides::default(),
            timeline: vec![TimePoint::now(TimePhase::Start)],
            monitor_data: None,
            response: OnceCell::new(),
            future: None,
        }
    }

    /// With arguments and their declared types
    #[must_use]
    pub fn with_arguments(mut self, parameter_types: Vec<String>, arguments: Vec<Value>) -> Self {
        self.parameter_types = parameter_types;
        self.arguments = arguments;
        self
    }

    /// With one-shot overrides
    #[must_use]
    pub fn with_overrides(mut self, overrides: InvocationOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// With a monitoring record
    #[must_use]
    pub fn with_monitor_data(mut self) -> Self {
        self.monitor_data = Some(MonitorData::default());
        self
    }

    /// Invoker settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    /// Method name
    #[inline]
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Declared parameter types
    #[inline]
    #[must_use]
    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    /// Arguments
    #[inline]
    #[must_use]
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Declared calling convention of this method
    #[inline]
    #[must_use]
    pub fn call_method(&self) -> CallMethod {
        self.settings.call_method_for(&self.method_name)
    }

    /// Override timeout, else the configured one
    #[must_use]
    pub fn effective_timeout_ms(&self) -> u64 {
        self.overrides
            .timeout_ms
            .unwrap_or_else(|| self.settings.timeout_for(&self.method_name))
    }

    /// Degradation state
    #[inline]
    #[must_use]
    pub fn degrade_info(&self) -> &DegradeInfo {
        &self.degrade_info
    }

    /// Mutable degradation state
    #[inline]
    pub fn degrade_info_mut(&mut self) -> &mut DegradeInfo {
        &mut self.degrade_info
    }

    /// Overrides
    #[inline]
    #[must_use]
    pub fn overrides(&self) -> &InvocationOverrides {
        &self.overrides
    }

    /// Mutable overrides
    #[inline]
    pub fn overrides_mut(&mut self) -> &mut InvocationOverrides {
        &mut self.overrides
    }

    /// Record a timeline marker
    #[inline]
    pub fn record(&mut self, phase: TimePhase) {
        self.timeline.push(TimePoint::now(phase));
    }

    /// Timeline so far
    #[inline]
    #[must_use]
    pub fn timeline(&self) -> &[TimePoint] {
        &self.timeline
    }

    /// Monitoring record
    #[inline]
    #[must_use]
    pub fn monitor_data(&self) -> Option<&MonitorData> {
        self.monitor_data.as_ref()
    }

    /// Mutable monitoring record
    #[inline]
    pub fn monitor_data_mut(&mut self) -> Option<&mut MonitorData> {
        self.monitor_data.as_mut()
    }

    /// Response assigned to this call
    #[inline]
    #[must_use]
    pub fn response(&self) -> Option<&InvocationResponse> {
        self.response.get()
    }

    /// Assign the response
    ///
    /// # Errors
    /// Hands the response back if one was already assigned
    pub fn set_response(&mut self, response: InvocationResponse) -> Result<(), InvocationResponse> {
        self.response.set(response)
    }

    /// Publish a future for the caller to pick up
    #[inline]
    pub fn set_future(&mut self, future: InvocationFuture) {
        self.future = Some(future);
    }

    /// Take the published future
    #[inline]
    pub fn take_future(&mut self) -> Option<InvocationFuture> {
        self.future.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> InvocationContext {
        let settings = InvokerSettings::new("svcA").with_method_timeout_ms("m1", 250);
        InvocationContext::new(Arc::new(settings), "m1")
    }

    #[test]
    fn timeout_override_wins() {
        let mut ctx = context();
        assert_eq!(ctx.effective_timeout_ms(), 250);
        ctx.overrides_mut().timeout_ms = Some(40);
        assert_eq!(ctx.effective_timeout_ms(), 40);
    }

    #[test]
    fn default_result_is_one_shot() {
        let mut ctx = context().with_overrides(InvocationOverrides {
            default_result: Some(json!(7)),
            ..InvocationOverrides::default()
        });
        assert_eq!(ctx.overrides_mut().take_default_result(), Some(json!(7)));
        assert_eq!(ctx.overrides_mut().take_default_result(), None);
    }

    #[test]
    fn response_slot_is_single_assignment() {
        let mut ctx = context();
        assert!(ctx.set_response(InvocationResponse::value(json!(1))).is_ok());
        let rejected = ctx.set_response(InvocationResponse::value(json!(2))).unwrap_err();
        assert_eq!(rejected.return_value(), Some(&json!(2)));
        assert_eq!(ctx.response().unwrap().return_value(), Some(&json!(1)));
    }

    #[test]
    fn timeline_starts_with_start_marker() {
        let mut ctx = context();
        ctx.record(TimePhase::Degrade);
        let phases: Vec<_> = ctx.timeline().iter().map(|p| p.phase).collect();
        assert_eq!(phases, vec![TimePhase::Start, TimePhase::Degrade]);
    }
}
