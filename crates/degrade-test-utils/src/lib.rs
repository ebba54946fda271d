//! Testing utilities for the degrade workspace
//!
//! Recording fakes for every collaborator plus context and registry fixtures.

#![allow(missing_docs)]

use degrade_config::{DegradeAction, DegradeActionRegistry};
use degrade_core::{
    CallMethod, DecisionEngine, ExceptionDescriptor, FailureCause, InvocationCallback, InvocationContext,
    InvocationHandler, InvocationResponse, InvokerSettings, Monitor, MonitorTransaction, QualityTracker,
    RpcError,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One report received by [`RecordingDecisionEngine`]
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Normal { key: String },
    Failed { key: String, cause: FailureCause },
    Degraded { key: String, cause: Option<FailureCause> },
    MonitorDegrade { key: String },
}

/// Decision engine with switchable answers that records every report
#[derive(Debug, Default)]
pub struct RecordingDecisionEngine {
    proactive: AtomicBool,
    reactive: AtomicBool,
    opted_in: Mutex<Vec<String>>,
    call_key: Mutex<Option<String>>,
    reactive_checks: AtomicUsize,
    reports: Mutex<Vec<Report>>,
}

impl RecordingDecisionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_proactive(self, on: bool) -> Self {
        self.proactive.store(on, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn with_reactive(self, on: bool) -> Self {
        self.reactive.store(on, Ordering::SeqCst);
        self
    }

    /// Opt a business exception kind into reactive degrade
    #[must_use]
    pub fn with_opted_in(self, kind: &str) -> Self {
        self.opted_in.lock().push(kind.to_string());
        self
    }

    /// Resolve every call to `key` instead of `url#method`
    #[must_use]
    pub fn with_call_key(self, key: &str) -> Self {
        *self.call_key.lock() = Some(key.to_string());
        self
    }

    pub fn set_proactive(&self, on: bool) {
        self.proactive.store(on, Ordering::SeqCst);
    }

    pub fn set_reactive(&self, on: bool) {
        self.reactive.store(on, Ordering::SeqCst);
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// How many times `need_reactive_degrade` was asked
    pub fn reactive_checks(&self) -> usize {
        self.reactive_checks.load(Ordering::SeqCst)
    }
}

impl DecisionEngine for RecordingDecisionEngine {
    fn need_proactive_degrade(&self, _ctx: &InvocationContext) -> bool {
        self.proactive.load(Ordering::SeqCst)
    }

    fn need_reactive_degrade(&self, _ctx: &InvocationContext) -> bool {
        self.reactive_checks.fetch_add(1, Ordering::SeqCst);
        self.reactive.load(Ordering::SeqCst)
    }

    fn is_opted_into_reactive_degrade(&self, exception: &ExceptionDescriptor) -> bool {
        self.opted_in.lock().iter().any(|kind| exception.is_kind(kind))
    }

    fn report_normal(&self, ctx: &InvocationContext) {
        let key = self.resolve_call_key(ctx);
        self.reports.lock().push(Report::Normal { key });
    }

    fn report_failed(&self, ctx: &InvocationContext, cause: &FailureCause) {
        let key = self.resolve_call_key(ctx);
        self.reports.lock().push(Report::Failed {
            key,
            cause: cause.clone(),
        });
    }

    fn report_degraded(&self, ctx: &InvocationContext, cause: Option<&FailureCause>) {
        let key = self.resolve_call_key(ctx);
        self.reports.lock().push(Report::Degraded {
            key,
            cause: cause.cloned(),
        });
    }

    fn resolve_call_key(&self, ctx: &InvocationContext) -> String {
        match self.call_key.lock().as_ref() {
            Some(key) => key.clone(),
            None => format!("{}#{}", ctx.settings().url(), ctx.method_name()),
        }
    }

    fn monitor_degrade(&self, ctx: &InvocationContext, transaction: &dyn MonitorTransaction) {
        let key = self.resolve_call_key(ctx);
        transaction.add_data("Degrade", Value::String(key.clone()));
        self.reports.lock().push(Report::MonitorDegrade { key });
    }
}

/// Quality tracker recording `(method, failed)`
#[derive(Debug, Default)]
pub struct RecordingTracker {
    requests: Mutex<Vec<(String, bool)>>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<(String, bool)> {
        self.requests.lock().clone()
    }
}

impl QualityTracker for RecordingTracker {
    fn report_client_request(&self, ctx: &InvocationContext, failed: bool) {
        self.requests.lock().push((ctx.method_name().to_string(), failed));
    }
}

/// Monitoring transaction recording its data
#[derive(Debug, Default)]
pub struct RecordingTransaction {
    data: Mutex<Vec<(String, Value)>>,
}

impl RecordingTransaction {
    pub fn data(&self) -> Vec<(String, Value)> {
        self.data.lock().clone()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.data
            .lock()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }
}

impl MonitorTransaction for RecordingTransaction {
    fn add_data(&self, name: &str, value: Value) {
        self.data.lock().push((name.to_string(), value));
    }
}

/// Monitor that always has one current transaction
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    transaction: Arc<RecordingTransaction>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction(&self) -> &RecordingTransaction {
        &self.transaction
    }
}

impl Monitor for RecordingMonitor {
    fn current_transaction(&self) -> Option<Arc<dyn MonitorTransaction>> {
        Some(Arc::clone(&self.transaction) as Arc<dyn MonitorTransaction>)
    }
}

/// Handler returning a fixed outcome and counting calls
#[derive(Debug)]
pub struct ScriptedHandler {
    outcome: Result<InvocationResponse, RpcError>,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub fn ok(value: Value) -> Self {
        Self::response(InvocationResponse::value(value))
    }

    pub fn response(response: InvocationResponse) -> Self {
        Self {
            outcome: Ok(response),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn error(err: RpcError) -> Self {
        Self {
            outcome: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InvocationHandler for ScriptedHandler {
    fn handle(&self, _ctx: &mut InvocationContext) -> Result<InvocationResponse, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Callback recording what it receives
#[derive(Debug, Default)]
pub struct RecordingCallback {
    successes: Mutex<Vec<Value>>,
    failures: Mutex<Vec<ExceptionDescriptor>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successes(&self) -> Vec<Value> {
        self.successes.lock().clone()
    }

    pub fn failures(&self) -> Vec<ExceptionDescriptor> {
        self.failures.lock().clone()
    }
}

impl InvocationCallback for RecordingCallback {
    fn on_success(&self, value: Value) {
        self.successes.lock().push(value);
    }

    fn on_failure(&self, exception: ExceptionDescriptor) {
        self.failures.lock().push(exception);
    }
}

/// Settings for `url` with a default calling convention
pub fn settings(url: &str, call_method: CallMethod) -> InvokerSettings {
    InvokerSettings::new(url).with_call_method(call_method)
}

/// Context for `url#method` with monitoring data
pub fn context(url: &str, method: &str, call_method: CallMethod) -> InvocationContext {
    context_with(settings(url, call_method), method)
}

/// Context over custom settings with monitoring data
pub fn context_with(settings: InvokerSettings, method: &str) -> InvocationContext {
    InvocationContext::new(Arc::new(settings), method).with_monitor_data()
}

/// Registry holding the given actions
pub fn registry_with(actions: Vec<(&str, DegradeAction)>) -> Arc<DegradeActionRegistry> {
    let registry = Arc::new(DegradeActionRegistry::new());
    let actions: HashMap<String, Arc<DegradeAction>> = actions
        .into_iter()
        .map(|(key, action)| (key.to_string(), Arc::new(action)))
        .collect();
    registry.install(actions);
    registry
}
