//! Fallback Executor
//!
//! Synthesizes the substitute response for a degraded call. How the value
//! reaches the caller depends on the calling convention:
//! - Sync: returned as the response (exceptions as `ServiceException`)
//! - Callback: delivered to the callback, the response is `NoReturn`
//! - Future: delivered through an already-complete future
//! - Oneway: nothing is evaluated, the response is `NoReturn`
//!
//! A reactive failure degrade of a Future call is answered as Sync.

use crate::delegate::{DelegateInvoker, ScriptProxy};
use degrade_config::{DegradeAction, DegradeActionRegistry, FallbackStrategy, RegistrySnapshot};
use degrade_core::{
    CallMethod, DecisionEngine, ExceptionDescriptor, FailureCause, FallbackError, FallbackTarget,
    InvocationCallback, InvocationContext, InvocationFuture, InvocationResponse, Monitor, NoopMonitor,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Monitoring data key for the effective timeout
pub const CURRENT_TIMEOUT_DATA_KEY: &str = "CurrentTimeout";

/// Outcome of evaluating an action
enum Resolution {
    Value(Value),
    Raised(FallbackError),
}

impl Resolution {
    fn from_result(result: Result<Value, FallbackError>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(err) => Self::Raised(err),
        }
    }

    fn into_response(self) -> InvocationResponse {
        match self {
            Self::Value(value) => InvocationResponse::value(value),
            Self::Raised(err) => InvocationResponse::service_exception(err.into_exception()),
        }
    }
}

/// Produces substitute responses for degraded calls
pub struct FallbackExecutor {
    registry: Arc<DegradeActionRegistry>,
    engine: Arc<dyn DecisionEngine>,
    monitor: Arc<dyn Monitor>,
    timeout_data_key: String,
}

impl std::fmt::Debug for FallbackExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackExecutor")
            .field("registry", &self.registry)
            .field("timeout_data_key", &self.timeout_data_key)
            .finish_non_exhaustive()
    }
}

impl FallbackExecutor {
    /// Create executor over a registry
    pub fn new(registry: Arc<DegradeActionRegistry>, engine: Arc<dyn DecisionEngine>) -> Self {
        Self {
            registry,
            engine,
            monitor: Arc::new(NoopMonitor),
            timeout_data_key: CURRENT_TIMEOUT_DATA_KEY.to_string(),
        }
    }

    /// With a monitoring backend
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// With a custom key for the timeout monitoring data
    #[must_use]
    pub fn with_timeout_data_key(mut self, key: impl Into<String>) -> Self {
        self.timeout_data_key = key.into();
        self
    }

    /// Registry in use
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<DegradeActionRegistry> {
        &self.registry
    }

    /// Decision engine in use
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn DecisionEngine> {
        &self.engine
    }

    /// Synthesize a substitute response and report the outcome
    ///
    /// Returns `None` when nothing could be synthesized (no action, no
    /// override, or a delegate action without a mock object); the call then
    /// proceeds as if it had not been degraded.
    pub fn synthesize(&self, ctx: &mut InvocationContext) -> Option<InvocationResponse> {
        let response = self.synthesize_response(ctx)?;

        if let Some(data) = ctx.monitor_data_mut() {
            data.degrade();
        }
        if ctx.degrade_info().failure_degrade {
            self.engine.report_failed(ctx, &FailureCause::FailureDegraded);
        } else {
            self.engine.report_degraded(ctx, ctx.degrade_info().cause.as_ref());
        }
        Some(response)
    }

    fn synthesize_response(&self, ctx: &mut InvocationContext) -> Option<InvocationResponse> {
        let declared = ctx.call_method();
        let timeout_ms = ctx.effective_timeout_ms();
        let service_call_method = ctx.settings().default_call_method();
        let serialize = ctx.settings().serialize().to_string();
        if let Some(data) = ctx.monitor_data_mut() {
            data.call_method = Some(service_call_method);
            data.serialize = Some(serialize);
            data.timeout_ms = Some(timeout_ms);
            data.add();
        }

        let default_result = ctx.overrides_mut().take_default_result();
        let key = self.engine.resolve_call_key(ctx);
        let snapshot = self.registry.snapshot();
        let action = snapshot.get(&key).cloned();

        let convention = if declared == CallMethod::Future && ctx.degrade_info().failure_degrade {
            CallMethod::Sync
        } else {
            declared
        };
        debug!(
            key = %key,
            convention = %convention,
            has_action = action.is_some(),
            has_override = default_result.is_some(),
            "synthesizing degraded response"
        );

        let response = match convention {
            CallMethod::Oneway => Some(InvocationResponse::no_return()),
            CallMethod::Sync => self
                .resolve(ctx, &key, &snapshot, default_result, action.as_deref())
                .map(Resolution::into_response),
            CallMethod::Callback => {
                let resolution = self.resolve(ctx, &key, &snapshot, default_result, action.as_deref());
                let response = resolution.and_then(|resolution| Self::deliver_to_callback(ctx, resolution));
                if response.is_some() {
                    if let Some(transaction) = self.monitor.current_transaction() {
                        self.engine.monitor_degrade(ctx, transaction.as_ref());
                    }
                }
                response
            }
            CallMethod::Future => self
                .resolve(ctx, &key, &snapshot, default_result, action.as_deref())
                .map(|resolution| {
                    let future = InvocationFuture::completed(resolution.into_response(), timeout_ms);
                    ctx.set_future(future.clone());
                    InvocationResponse::future(future)
                }),
        }?;

        ctx.degrade_info_mut().degraded = true;
        if let Some(transaction) = self.monitor.current_transaction() {
            transaction.add_data(&self.timeout_data_key, Value::from(timeout_ms));
        }
        if ctx.set_response(response.clone()).is_err() {
            debug!(key = %key, "response already assigned, keeping the first");
        }
        Some(response)
    }

    /// Evaluate the override or the configured action
    fn resolve(
        &self,
        ctx: &InvocationContext,
        key: &str,
        snapshot: &RegistrySnapshot,
        default_result: Option<Value>,
        action: Option<&DegradeAction>,
    ) -> Option<Resolution> {
        if let Some(value) = default_result {
            return Some(Resolution::Value(value));
        }
        let action = action?;

        let invoke = |target: Arc<dyn FallbackTarget>| {
            Resolution::from_result(DelegateInvoker::new(target).invoke(
                ctx.method_name(),
                ctx.parameter_types(),
                ctx.arguments(),
            ))
        };

        match action.strategy() {
            FallbackStrategy::Delegate => match ctx.settings().mock() {
                Some(mock) => Some(invoke(Arc::clone(mock))),
                None => {
                    warn!(key = %key, "mock fallback configured but the invoker has no mock object");
                    None
                }
            },
            FallbackStrategy::Script(script) => {
                let proxy = self
                    .registry
                    .proxies()
                    .get_or_insert_with(key, snapshot.generation(), || {
                        Arc::new(ScriptProxy::new(Arc::clone(script))) as Arc<dyn FallbackTarget>
                    });
                Some(invoke(proxy))
            }
            FallbackStrategy::Exception(exception) => {
                let exception = exception
                    .clone()
                    .unwrap_or_else(|| ExceptionDescriptor::service_degraded(key));
                Some(Resolution::Raised(FallbackError::Raised(exception)))
            }
            FallbackStrategy::Literal(value) => {
                Some(Resolution::Value(value.clone().unwrap_or(Value::Null)))
            }
        }
    }

    fn deliver_to_callback(ctx: &mut InvocationContext, resolution: Resolution) -> Option<InvocationResponse> {
        let callback: Arc<dyn InvocationCallback> = match ctx.overrides_mut().take_callback() {
            Some(callback) => callback,
            None => match ctx.settings().callback() {
                Some(callback) => Arc::clone(callback),
                None => {
                    warn!(method = ctx.method_name(), "callback call degraded without a callback");
                    return None;
                }
            },
        };
        match resolution {
            Resolution::Value(value) => callback.on_success(value),
            Resolution::Raised(err) => callback.on_failure(err.into_exception()),
        }
        Some(InvocationResponse::no_return())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::MockService;
    use degrade_config::ExpressionScriptEngine;
    use degrade_core::{exception_kinds, InvocationOverrides, MessageType, RpcError};
    use degrade_test_utils::{
        context, context_with, registry_with, settings, RecordingCallback, RecordingDecisionEngine,
        RecordingMonitor, Report,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn build(actions: Vec<(&str, DegradeAction)>) -> (FallbackExecutor, Arc<RecordingDecisionEngine>) {
        let engine = Arc::new(RecordingDecisionEngine::new());
        let executor = FallbackExecutor::new(registry_with(actions), Arc::clone(&engine) as Arc<dyn DecisionEngine>);
        (executor, engine)
    }

    fn script(source: &str) -> DegradeAction {
        let compiled = ExpressionScriptEngine::new().compile_expression(source).unwrap();
        DegradeAction::script(Arc::new(compiled))
    }

    #[test]
    fn sync_literal() {
        let (executor, engine) = build(vec![("svcA#m1", DegradeAction::literal(json!("ok")))]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);

        let response = executor.synthesize(&mut ctx).unwrap();
        assert_eq!(response.return_value(), Some(&json!("ok")));
        assert!(ctx.degrade_info().degraded);
        assert_eq!(ctx.response().unwrap().return_value(), Some(&json!("ok")));
        assert!(ctx.monitor_data().unwrap().degraded);
        assert_eq!(
            engine.reports(),
            vec![Report::Degraded {
                key: "svcA#m1".to_string(),
                cause: None
            }]
        );
    }

    #[test]
    fn sync_none_action_yields_null_value() {
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::none())]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let response = executor.synthesize(&mut ctx).unwrap();
        assert_eq!(response.message_type(), MessageType::Service);
        assert!(!response.has_return());
    }

    #[test]
    fn sync_without_action_synthesizes_nothing() {
        let (executor, engine) = build(vec![]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        assert!(executor.synthesize(&mut ctx).is_none());
        assert!(!ctx.degrade_info().degraded);
        assert!(engine.reports().is_empty());
        // Monitoring data is still recorded
        assert_eq!(ctx.monitor_data().unwrap().submissions, 1);
    }

    #[test]
    fn sync_generic_exception_carries_call_key() {
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::exception(None))]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);

        let response = executor.synthesize(&mut ctx).unwrap();
        assert_eq!(response.message_type(), MessageType::ServiceException);
        let exception = response.exception().unwrap();
        assert!(exception.is_kind(exception_kinds::SERVICE_DEGRADED));
        assert_eq!(exception.message.as_deref(), Some("svcA#m1"));
    }

    #[test]
    fn sync_configured_exception() {
        let configured = ExceptionDescriptor::new("quota-exceeded").with_message("slow down");
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::exception(Some(configured.clone())))]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let response = executor.synthesize(&mut ctx).unwrap();
        assert_eq!(response.exception(), Some(&configured));
    }

    #[test]
    fn override_wins_and_is_consumed() {
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::literal(json!("configured")))]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync).with_overrides(InvocationOverrides {
            default_result: Some(json!("forced")),
            ..InvocationOverrides::default()
        });
        let response = executor.synthesize(&mut ctx).unwrap();
        assert_eq!(response.return_value(), Some(&json!("forced")));
        assert!(ctx.overrides().default_result.is_none());
    }

    #[test]
    fn override_without_action() {
        let (executor, _) = build(vec![]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync).with_overrides(InvocationOverrides {
            default_result: Some(json!(1)),
            ..InvocationOverrides::default()
        });
        assert_eq!(executor.synthesize(&mut ctx).unwrap().return_value(), Some(&json!(1)));
    }

    #[test]
    fn delegate_to_mock() {
        let mock = MockService::new().with_method("m1", |args| Ok(json!({"echo": args[0]})));
        let settings = settings("svcA", CallMethod::Sync).with_mock(Arc::new(mock));
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::delegate())]);
        let mut ctx = context_with(settings, "m1").with_arguments(vec!["int".to_string()], vec![json!(3)]);

        let response = executor.synthesize(&mut ctx).unwrap();
        assert_eq!(response.return_value(), Some(&json!({"echo": 3})));
    }

    #[test]
    fn delegate_without_mock_synthesizes_nothing() {
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::delegate())]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        assert!(executor.synthesize(&mut ctx).is_none());
    }

    #[test]
    fn delegate_failure_becomes_business_exception() {
        let settings = settings("svcA", CallMethod::Sync).with_mock(Arc::new(MockService::new()));
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::delegate())]);
        let mut ctx = context_with(settings, "m1");

        let response = executor.synthesize(&mut ctx).unwrap();
        assert_eq!(response.message_type(), MessageType::ServiceException);
        assert!(response.exception().unwrap().is_kind(exception_kinds::APPLICATION_ERROR));
    }

    #[test]
    fn script_proxy_is_cached_per_key() {
        let (executor, _) = build(vec![("svcA#m1", script("args[0]"))]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync).with_arguments(vec![], vec![json!("a")]);
        assert_eq!(executor.synthesize(&mut ctx).unwrap().return_value(), Some(&json!("a")));
        assert!(executor.registry().proxies().contains("svcA#m1"));

        let mut ctx = context("svcA", "m1", CallMethod::Sync).with_arguments(vec![], vec![json!("b")]);
        assert_eq!(executor.synthesize(&mut ctx).unwrap().return_value(), Some(&json!("b")));
        assert_eq!(executor.registry().proxies().len(), 1);
    }

    #[test]
    fn callback_success_and_failure() {
        let callback = Arc::new(RecordingCallback::new());
        let settings = settings("svcA", CallMethod::Callback)
            .with_callback(Arc::clone(&callback) as Arc<dyn InvocationCallback>);
        let (executor, _) = build(vec![
            ("svcA#ok", DegradeAction::literal(json!(5))),
            ("svcA#err", DegradeAction::exception(None)),
        ]);

        let mut ctx = context_with(settings.clone(), "ok");
        assert!(executor.synthesize(&mut ctx).unwrap().is_no_return());
        let mut ctx = context_with(settings, "err");
        assert!(executor.synthesize(&mut ctx).unwrap().is_no_return());

        assert_eq!(callback.successes(), vec![json!(5)]);
        assert_eq!(callback.failures().len(), 1);
        assert!(callback.failures()[0].is_kind(exception_kinds::SERVICE_DEGRADED));
    }

    #[test]
    fn callback_override_is_one_shot_and_preferred() {
        let configured = Arc::new(RecordingCallback::new());
        let forced = Arc::new(RecordingCallback::new());
        let settings = settings("svcA", CallMethod::Callback)
            .with_callback(Arc::clone(&configured) as Arc<dyn InvocationCallback>);
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::literal(json!(1)))]);

        let mut ctx = context_with(settings, "m1").with_overrides(InvocationOverrides {
            callback: Some(Arc::clone(&forced) as Arc<dyn InvocationCallback>),
            ..InvocationOverrides::default()
        });
        executor.synthesize(&mut ctx).unwrap();
        assert!(ctx.overrides().callback.is_none());
        assert_eq!(forced.successes(), vec![json!(1)]);
        assert!(configured.successes().is_empty());
    }

    #[test]
    fn callback_notifies_monitor() {
        let callback = Arc::new(RecordingCallback::new());
        let monitor = Arc::new(RecordingMonitor::new());
        let settings = settings("svcA", CallMethod::Callback)
            .with_timeout_ms(750)
            .with_callback(callback);
        let engine = Arc::new(RecordingDecisionEngine::new());
        let executor = FallbackExecutor::new(
            registry_with(vec![("svcA#m1", DegradeAction::literal(json!(1)))]),
            Arc::clone(&engine) as Arc<dyn DecisionEngine>,
        )
        .with_monitor(Arc::clone(&monitor) as Arc<dyn Monitor>);

        let mut ctx = context_with(settings, "m1");
        executor.synthesize(&mut ctx).unwrap();
        assert!(engine.reports().contains(&Report::MonitorDegrade {
            key: "svcA#m1".to_string()
        }));
        assert_eq!(monitor.transaction().get(CURRENT_TIMEOUT_DATA_KEY), Some(json!(750)));
    }

    #[test]
    fn callback_without_callback_synthesizes_nothing() {
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::literal(json!(1)))]);
        let mut ctx = context("svcA", "m1", CallMethod::Callback);
        assert!(executor.synthesize(&mut ctx).is_none());
    }

    #[test]
    fn future_is_complete_on_return() {
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::literal(json!("later")))]);
        let mut ctx = context("svcA", "m1", CallMethod::Future);

        let response = executor.synthesize(&mut ctx).unwrap();
        assert_eq!(response.message_type(), MessageType::Future);
        let future = ctx.take_future().unwrap();
        assert!(future.is_done());
        assert_eq!(future.get().unwrap().return_value(), Some(&json!("later")));
        assert!(response.as_future().unwrap().is_done());
    }

    #[tokio::test]
    async fn future_exception_can_be_awaited() {
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::exception(None))]);
        let mut ctx = context("svcA", "m1", CallMethod::Future);
        executor.synthesize(&mut ctx).unwrap();

        let response = ctx.take_future().unwrap().await;
        assert_eq!(response.message_type(), MessageType::ServiceException);
    }

    #[test]
    fn future_failure_degrade_follows_sync() {
        let (executor, engine) = build(vec![("svcA#m1", DegradeAction::literal(json!("ok")))]);
        let mut ctx = context("svcA", "m1", CallMethod::Future);
        ctx.degrade_info_mut().failure_degrade = true;
        ctx.degrade_info_mut().cause = Some(RpcError::timeout("slow").into());

        let response = executor.synthesize(&mut ctx).unwrap();
        assert_eq!(response.message_type(), MessageType::Service);
        assert_eq!(response.return_value(), Some(&json!("ok")));
        assert!(ctx.take_future().is_none());
        assert_eq!(
            engine.reports(),
            vec![Report::Failed {
                key: "svcA#m1".to_string(),
                cause: FailureCause::FailureDegraded
            }]
        );
    }

    #[test]
    fn future_without_action_creates_no_future() {
        let (executor, _) = build(vec![]);
        let mut ctx = context("svcA", "m1", CallMethod::Future);
        assert!(executor.synthesize(&mut ctx).is_none());
        assert!(ctx.take_future().is_none());
    }

    #[test]
    fn oneway_never_evaluates() {
        let settings = settings("svcA", CallMethod::Oneway).with_mock(Arc::new(
            MockService::new().with_method("m1", |_| panic!("must not be invoked")),
        ));
        let (executor, _) = build(vec![("svcA#m1", DegradeAction::delegate())]);
        let mut ctx = context_with(settings, "m1");
        assert!(executor.synthesize(&mut ctx).unwrap().is_no_return());

        let (executor, _) = build(vec![]);
        let mut ctx = context("svcA", "m1", CallMethod::Oneway);
        assert!(executor.synthesize(&mut ctx).unwrap().is_no_return());
        assert!(ctx.degrade_info().degraded);
    }

    #[test]
    fn proactive_report_carries_cause() {
        let (executor, engine) = build(vec![("svcA#m1", DegradeAction::none())]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let cause = FailureCause::Business(ExceptionDescriptor::new("x"));
        ctx.degrade_info_mut().cause = Some(cause.clone());
        executor.synthesize(&mut ctx).unwrap();
        assert_eq!(
            engine.reports(),
            vec![Report::Degraded {
                key: "svcA#m1".to_string(),
                cause: Some(cause)
            }]
        );
    }

    #[test]
    fn monitor_data_recorded() {
        let settings = settings("svcA", CallMethod::Sync)
            .with_method_call_method("m1", CallMethod::Future)
            .with_serialize("hessian")
            .with_timeout_ms(300);
        let (executor, _) = build(vec![]);
        let mut ctx = context_with(settings, "m1");
        ctx.overrides_mut().timeout_ms = Some(90);
        executor.synthesize(&mut ctx);

        let data = ctx.monitor_data().unwrap();
        assert_eq!(data.call_method, Some(CallMethod::Sync));
        assert_eq!(data.serialize.as_deref(), Some("hessian"));
        assert_eq!(data.timeout_ms, Some(90));
    }
}
