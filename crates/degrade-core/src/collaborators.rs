//! Contracts of the external collaborators the degradation layer depends on
//!
//! Implement these to plug the filter into a concrete transport, circuit
//! breaker, configuration store and monitoring backend.

use crate::context::InvocationContext;
use crate::error::{ConfigStoreError, ExceptionDescriptor, FailureCause, FallbackError, RpcError, ScriptError};
use crate::response::InvocationResponse;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Circuit-breaker decision engine
///
/// Decides whether a call is degraded and aggregates outcome statistics.
pub trait DecisionEngine: Send + Sync {
    /// Degrade before dispatching?
    fn need_proactive_degrade(&self, ctx: &InvocationContext) -> bool;

    /// Degrade after a qualifying failure?
    fn need_reactive_degrade(&self, ctx: &InvocationContext) -> bool;

    /// Whether a business exception is opted into reactive degrade
    fn is_opted_into_reactive_degrade(&self, exception: &ExceptionDescriptor) -> bool;

    /// Call completed normally
    fn report_normal(&self, ctx: &InvocationContext);

    /// Call failed
    fn report_failed(&self, ctx: &InvocationContext, cause: &FailureCause);

    /// Call was answered by a substitute without failing first
    fn report_degraded(&self, ctx: &InvocationContext, cause: Option<&FailureCause>);

    /// Stable call identity (`service#method`)
    fn resolve_call_key(&self, ctx: &InvocationContext) -> String {
        format!("{}#{}", ctx.settings().url(), ctx.method_name())
    }

    /// Attach degrade details to the current monitoring transaction
    fn monitor_degrade(&self, _ctx: &InvocationContext, _transaction: &dyn MonitorTransaction) {}
}

/// Change listener: `(key, new_value)`
pub type ConfigListener = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Live configuration store
pub trait ConfigStore: Send + Sync {
    /// Read a string value
    ///
    /// # Errors
    /// Store-level failures; a missing key is `Ok(None)`
    fn get_string(&self, key: &str) -> Result<Option<String>, ConfigStoreError>;

    /// Register a listener for updates of keys ending with `key_suffix`
    fn on_change(&self, key_suffix: &str, listener: ConfigListener);
}

/// Request-quality tracker used by routing
pub trait QualityTracker: Send + Sync {
    /// Record one client request outcome
    fn report_client_request(&self, ctx: &InvocationContext, failed: bool);
}

/// A monitoring transaction
pub trait MonitorTransaction: Send + Sync {
    /// Attach auxiliary data
    fn add_data(&self, name: &str, value: Value);
}

/// Monitoring backend
pub trait Monitor: Send + Sync {
    /// Transaction of the call in progress, if any
    fn current_transaction(&self) -> Option<Arc<dyn MonitorTransaction>>;
}

/// Monitor that never has a transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn current_transaction(&self) -> Option<Arc<dyn MonitorTransaction>> {
        None
    }
}

/// Object a fallback call can be delegated to by method name
pub trait FallbackTarget: Send + Sync {
    /// Invoke `method` with the call's parameter types and arguments
    ///
    /// # Errors
    /// Raised exceptions or target-specific failures
    fn invoke(
        &self,
        method: &str,
        parameter_types: &[String],
        arguments: &[Value],
    ) -> Result<Value, FallbackError>;
}

/// Callback receiving the outcome of a callback-convention call
pub trait InvocationCallback: Send + Sync {
    /// Call succeeded
    fn on_success(&self, value: Value);

    /// Call failed
    fn on_failure(&self, exception: ExceptionDescriptor);
}

/// Next stage of the invocation pipeline
pub trait InvocationHandler: Send + Sync {
    /// Handle the call
    ///
    /// # Errors
    /// Transport failures
    fn handle(&self, ctx: &mut InvocationContext) -> Result<InvocationResponse, RpcError>;
}

/// Variables visible to a script while it answers one call
#[derive(Debug, Clone, Copy)]
pub struct ScriptScope<'a> {
    /// Method being called
    pub method: &'a str,
    /// Declared parameter types
    pub parameter_types: &'a [String],
    /// Call arguments
    pub arguments: &'a [Value],
}

/// A compiled fallback script
pub trait CompiledScript: Send + Sync + Debug {
    /// Evaluate against one call
    ///
    /// # Errors
    /// Evaluation failures or deliberately raised exceptions
    fn evaluate(&self, scope: &ScriptScope<'_>) -> Result<Value, FallbackError>;

    /// Source text
    fn source(&self) -> &str;
}

/// Embedded script engine
pub trait ScriptEngine: Send + Sync {
    /// Compile source text
    ///
    /// # Errors
    /// Syntax errors or unresolved references
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledScript>, ScriptError>;
}
