//! Degradation filter
//!
//! Per call: record the `Degrade` timeline marker, try a proactive degrade,
//! otherwise dispatch, classify the outcome, try a reactive degrade on
//! qualifying failures, and report. Proactive short-circuits never reach
//! the transport and are not reported to the quality tracker; every
//! dispatched call is reported exactly once.

use crate::chain::InvocationFilter;
use degrade_core::{
    CallMethod, DecisionEngine, FailureCause, InvocationContext, InvocationHandler, InvocationResponse,
    MessageType, QualityTracker, RpcError, TimePhase,
};
use degrade_fallback::FallbackExecutor;
use std::sync::Arc;
use tracing::{debug, trace};

/// Pipeline stage applying degradation policies
pub struct DegradationFilter {
    executor: Arc<FallbackExecutor>,
    engine: Arc<dyn DecisionEngine>,
    tracker: Arc<dyn QualityTracker>,
}

impl std::fmt::Debug for DegradationFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradationFilter")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl DegradationFilter {
    /// Create filter; decisions come from the executor's engine
    pub fn new(executor: Arc<FallbackExecutor>, tracker: Arc<dyn QualityTracker>) -> Self {
        let engine = Arc::clone(executor.engine());
        Self {
            executor,
            engine,
            tracker,
        }
    }

    /// Executor in use
    #[inline]
    #[must_use]
    pub fn executor(&self) -> &Arc<FallbackExecutor> {
        &self.executor
    }

    /// Mark the call as failure-degraded and try to substitute
    fn degrade_on_failure(&self, ctx: &mut InvocationContext, cause: FailureCause) -> Option<InvocationResponse> {
        let info = ctx.degrade_info_mut();
        info.failure_degrade = true;
        info.cause = Some(cause);
        let response = self.executor.synthesize(ctx)?;
        record_synthesized(ctx, "reactive");
        Some(response)
    }

    fn dispatch(
        &self,
        next: &dyn InvocationHandler,
        ctx: &mut InvocationContext,
        failed: &mut bool,
    ) -> Result<InvocationResponse, RpcError> {
        let response = match next.handle(ctx) {
            Ok(response) => response,
            Err(err) => return self.on_transport_error(ctx, err, failed),
        };

        let mut failure = None;
        if response.has_return() {
            match response.message_type() {
                MessageType::Exception => {
                    if let Some(err) = response.transport_error().filter(|e| e.is_degradable()) {
                        *failed = true;
                        let cause = FailureCause::Transport(err.clone());
                        failure = Some(cause.clone());
                        if self.engine.need_reactive_degrade(ctx) {
                            if let Some(substitute) = self.degrade_on_failure(ctx, cause) {
                                return Ok(substitute);
                            }
                        }
                    }
                }
                MessageType::ServiceException => {
                    if let Some(exception) = response.exception() {
                        // Reactive degrade is asked twice on purpose; both answers are observable
                        if self.engine.need_reactive_degrade(ctx)
                            && self.engine.is_opted_into_reactive_degrade(exception)
                        {
                            *failed = true;
                            let cause = FailureCause::Business(exception.clone());
                            failure = Some(cause.clone());
                            if self.engine.need_reactive_degrade(ctx) {
                                if let Some(substitute) = self.degrade_on_failure(ctx, cause) {
                                    return Ok(substitute);
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if ctx.call_method() == CallMethod::Sync {
            match &failure {
                Some(cause) => self.engine.report_failed(ctx, cause),
                None => self.engine.report_normal(ctx),
            }
        }
        trace!(method = ctx.method_name(), failed = *failed, "call dispatched");
        Ok(response)
    }

    fn on_transport_error(
        &self,
        ctx: &mut InvocationContext,
        err: RpcError,
        failed: &mut bool,
    ) -> Result<InvocationResponse, RpcError> {
        metrics::counter!("degrade.dispatch.failed", "kind" => err.kind().as_str()).increment(1);
        if !err.is_degradable() {
            return Err(err);
        }

        *failed = true;
        let cause = FailureCause::Transport(err.clone());
        if self.engine.need_reactive_degrade(ctx) {
            if let Some(substitute) = self.degrade_on_failure(ctx, cause.clone()) {
                return Ok(substitute);
            }
        }
        debug!(method = ctx.method_name(), error = %err, "call failed without substitute");
        self.engine.report_failed(ctx, &cause);
        Err(err)
    }
}

impl InvocationFilter for DegradationFilter {
    fn invoke(
        &self,
        next: &dyn InvocationHandler,
        ctx: &mut InvocationContext,
    ) -> Result<InvocationResponse, RpcError> {
        ctx.record(TimePhase::Degrade);

        if self.engine.need_proactive_degrade(ctx) {
            if let Some(response) = self.executor.synthesize(ctx) {
                record_synthesized(ctx, "proactive");
                return Ok(response);
            }
        }

        let mut report = ClientRequestReport {
            tracker: self.tracker.as_ref(),
            ctx,
            failed: false,
        };
        let outcome = self.dispatch(next, report.ctx, &mut report.failed);
        drop(report);
        outcome
    }
}

/// Reports a dispatched call to the quality tracker when dropped, unwinding included
struct ClientRequestReport<'a> {
    tracker: &'a dyn QualityTracker,
    ctx: &'a mut InvocationContext,
    failed: bool,
}

impl Drop for ClientRequestReport<'_> {
    fn drop(&mut self) {
        self.tracker.report_client_request(self.ctx, self.failed);
    }
}

fn record_synthesized(ctx: &InvocationContext, mode: &'static str) {
    let convention = ctx.call_method().as_str();
    metrics::counter!("degrade.synthesized", "convention" => convention, "mode" => mode).increment(1);
    debug!(
        service = ctx.settings().url(),
        method = ctx.method_name(),
        convention,
        mode,
        "call degraded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use degrade_config::DegradeAction;
    use degrade_core::{exception_kinds, ExceptionDescriptor};
    use degrade_test_utils::{
        context, registry_with, RecordingDecisionEngine, RecordingTracker, Report, ScriptedHandler,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        filter: DegradationFilter,
        engine: Arc<RecordingDecisionEngine>,
        tracker: Arc<RecordingTracker>,
    }

    fn fixture(engine: RecordingDecisionEngine, actions: Vec<(&str, DegradeAction)>) -> Fixture {
        let engine = Arc::new(engine);
        let tracker = Arc::new(RecordingTracker::new());
        let executor = Arc::new(FallbackExecutor::new(
            registry_with(actions),
            Arc::clone(&engine) as Arc<dyn DecisionEngine>,
        ));
        Fixture {
            filter: DegradationFilter::new(executor, Arc::clone(&tracker) as Arc<dyn QualityTracker>),
            engine,
            tracker,
        }
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn proactive_degrade_skips_dispatch() {
        let fx = fixture(
            RecordingDecisionEngine::new().with_proactive(true),
            vec![("svcA#m1", DegradeAction::literal(json!("ok")))],
        );
        let handler = ScriptedHandler::ok(json!("real"));
        let mut ctx = context("svcA", "m1", CallMethod::Sync);

        let response = fx.filter.invoke(&handler, &mut ctx).unwrap();
        assert_eq!(response.return_value(), Some(&json!("ok")));
        assert_eq!(handler.calls(), 0);
        assert!(fx.tracker.requests().is_empty());
        let phases: Vec<_> = ctx.timeline().iter().map(|p| p.phase).collect();
        assert_eq!(phases, vec![TimePhase::Start, TimePhase::Degrade]);
    }

    #[test]
    fn proactive_without_action_dispatches() {
        let fx = fixture(RecordingDecisionEngine::new().with_proactive(true), vec![]);
        let handler = ScriptedHandler::ok(json!("real"));
        let mut ctx = context("svcA", "m1", CallMethod::Sync);

        let response = fx.filter.invoke(&handler, &mut ctx).unwrap();
        assert_eq!(response.return_value(), Some(&json!("real")));
        assert_eq!(handler.calls(), 1);
        assert_eq!(fx.engine.reports(), vec![Report::Normal { key: key("svcA#m1") }]);
        assert_eq!(fx.tracker.requests(), vec![(key("m1"), false)]);
    }

    #[test]
    fn normal_sync_call_reports_normal() {
        let fx = fixture(RecordingDecisionEngine::new(), vec![]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        fx.filter.invoke(&ScriptedHandler::ok(json!(1)), &mut ctx).unwrap();
        assert_eq!(fx.engine.reports(), vec![Report::Normal { key: key("svcA#m1") }]);
    }

    #[test]
    fn non_sync_success_is_not_reported_to_engine() {
        let fx = fixture(RecordingDecisionEngine::new(), vec![]);
        let mut ctx = context("svcA", "m1", CallMethod::Future);
        fx.filter.invoke(&ScriptedHandler::ok(json!(1)), &mut ctx).unwrap();
        assert!(fx.engine.reports().is_empty());
        assert_eq!(fx.tracker.requests(), vec![(key("m1"), false)]);
    }

    #[test]
    fn transport_error_degrades_reactively() {
        let fx = fixture(
            RecordingDecisionEngine::new().with_reactive(true),
            vec![("svcA#m1", DegradeAction::literal(json!("fallback")))],
        );
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let response = fx
            .filter
            .invoke(&ScriptedHandler::error(RpcError::timeout("slow")), &mut ctx)
            .unwrap();

        assert_eq!(response.return_value(), Some(&json!("fallback")));
        assert!(ctx.degrade_info().failure_degrade);
        assert_eq!(
            ctx.degrade_info().cause,
            Some(FailureCause::Transport(RpcError::timeout("slow")))
        );
        assert_eq!(
            fx.engine.reports(),
            vec![Report::Failed {
                key: key("svcA#m1"),
                cause: FailureCause::FailureDegraded
            }]
        );
        assert_eq!(fx.tracker.requests(), vec![(key("m1"), true)]);
    }

    #[test]
    fn transport_error_without_substitute_is_reraised() {
        let fx = fixture(RecordingDecisionEngine::new().with_reactive(true), vec![]);
        let mut ctx = context("svcA", "m1", CallMethod::Callback);
        let err = fx
            .filter
            .invoke(&ScriptedHandler::error(RpcError::unavailable("no provider")), &mut ctx)
            .unwrap_err();

        assert_eq!(err, RpcError::unavailable("no provider"));
        assert_eq!(
            fx.engine.reports(),
            vec![Report::Failed {
                key: key("svcA#m1"),
                cause: FailureCause::Transport(err)
            }]
        );
        assert_eq!(fx.tracker.requests(), vec![(key("m1"), true)]);
    }

    #[test]
    fn non_degradable_error_propagates_unreported() {
        let fx = fixture(
            RecordingDecisionEngine::new().with_reactive(true),
            vec![("svcA#m1", DegradeAction::literal(json!(1)))],
        );
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let err = RpcError::new(degrade_core::RpcErrorKind::Serialization, "bad frame");
        assert!(fx.filter.invoke(&ScriptedHandler::error(err), &mut ctx).is_err());
        assert!(fx.engine.reports().is_empty());
        assert_eq!(fx.tracker.requests(), vec![(key("m1"), false)]);
        assert!(!ctx.degrade_info().degraded);
    }

    #[test]
    fn exception_response_classified_failed() {
        let fx = fixture(RecordingDecisionEngine::new(), vec![]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let handler = ScriptedHandler::response(InvocationResponse::transport(RpcError::rejected("busy")));

        let response = fx.filter.invoke(&handler, &mut ctx).unwrap();
        assert_eq!(response.message_type(), MessageType::Exception);
        assert_eq!(
            fx.engine.reports(),
            vec![Report::Failed {
                key: key("svcA#m1"),
                cause: FailureCause::Transport(RpcError::rejected("busy"))
            }]
        );
        assert_eq!(fx.tracker.requests(), vec![(key("m1"), true)]);
    }

    #[test]
    fn opted_in_business_exception_degrades() {
        let fx = fixture(
            RecordingDecisionEngine::new()
                .with_reactive(true)
                .with_opted_in("quota-exceeded"),
            vec![("svcA#m1", DegradeAction::literal(json!("cached")))],
        );
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let handler = ScriptedHandler::response(InvocationResponse::service_exception(
            ExceptionDescriptor::new("quota-exceeded"),
        ));

        let response = fx.filter.invoke(&handler, &mut ctx).unwrap();
        assert_eq!(response.return_value(), Some(&json!("cached")));
        assert_eq!(fx.engine.reactive_checks(), 2);
    }

    #[test]
    fn other_business_exception_is_normal() {
        let fx = fixture(
            RecordingDecisionEngine::new().with_reactive(true),
            vec![("svcA#m1", DegradeAction::literal(json!("cached")))],
        );
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let handler = ScriptedHandler::response(InvocationResponse::service_exception(
            ExceptionDescriptor::new("not-found"),
        ));

        let response = fx.filter.invoke(&handler, &mut ctx).unwrap();
        assert!(response.exception().unwrap().is_kind("not-found"));
        assert_eq!(fx.engine.reports(), vec![Report::Normal { key: key("svcA#m1") }]);
        assert_eq!(fx.tracker.requests(), vec![(key("m1"), false)]);
    }

    #[test]
    fn opted_in_exception_without_reactive_permission_is_normal() {
        let fx = fixture(
            RecordingDecisionEngine::new().with_opted_in("quota-exceeded"),
            vec![],
        );
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let handler = ScriptedHandler::response(InvocationResponse::service_exception(
            ExceptionDescriptor::new("quota-exceeded"),
        ));
        fx.filter.invoke(&handler, &mut ctx).unwrap();
        assert_eq!(fx.engine.reports(), vec![Report::Normal { key: key("svcA#m1") }]);
    }

    #[test]
    fn reactive_generic_exception_for_failure() {
        let fx = fixture(
            RecordingDecisionEngine::new().with_reactive(true),
            vec![("svcA#m1", DegradeAction::exception(None))],
        );
        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let response = fx
            .filter
            .invoke(&ScriptedHandler::error(RpcError::remote_invocation("boom")), &mut ctx)
            .unwrap();
        assert!(response
            .exception()
            .unwrap()
            .is_kind(exception_kinds::SERVICE_DEGRADED));
    }

    struct PanickingHandler;

    impl InvocationHandler for PanickingHandler {
        fn handle(&self, _ctx: &mut InvocationContext) -> Result<InvocationResponse, RpcError> {
            panic!("provider stub crashed");
        }
    }

    #[test]
    fn quality_reported_when_dispatch_panics() {
        let fx = fixture(RecordingDecisionEngine::new(), vec![]);
        let mut ctx = context("svcA", "m1", CallMethod::Sync);

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            fx.filter.invoke(&PanickingHandler, &mut ctx)
        }));
        assert!(unwound.is_err());
        assert_eq!(fx.tracker.requests(), vec![(key("m1"), false)]);
    }

    #[test]
    fn quality_reported_failed_when_fallback_panics() {
        let scripts = degrade_config::ExpressionScriptEngine::new()
            .with_native("explode", |_scope| panic!("fallback crashed"));
        let script = scripts.compile_expression("native:explode").unwrap();
        let fx = fixture(
            RecordingDecisionEngine::new().with_reactive(true),
            vec![("svcA#m1", DegradeAction::script(Arc::new(script)))],
        );
        let mut ctx = context("svcA", "m1", CallMethod::Sync);

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            fx.filter
                .invoke(&ScriptedHandler::error(RpcError::timeout("slow")), &mut ctx)
        }));
        assert!(unwound.is_err());
        assert_eq!(fx.tracker.requests(), vec![(key("m1"), true)]);
    }

    fn outcome(index: u8) -> ScriptedHandler {
        match index % 6 {
            0 => ScriptedHandler::ok(json!("real")),
            1 => ScriptedHandler::ok(serde_json::Value::Null),
            2 => ScriptedHandler::error(RpcError::timeout("slow")),
            3 => ScriptedHandler::error(RpcError::new(degrade_core::RpcErrorKind::Other, "bug")),
            4 => ScriptedHandler::response(InvocationResponse::transport(RpcError::unavailable("down"))),
            _ => ScriptedHandler::response(InvocationResponse::service_exception(ExceptionDescriptor::new(
                "quota-exceeded",
            ))),
        }
    }

    proptest::proptest! {
        #[test]
        fn dispatched_calls_report_quality_once(
            proactive in proptest::bool::ANY,
            reactive in proptest::bool::ANY,
            with_action in proptest::bool::ANY,
            convention in 1u8..5,
            result in 0u8..6,
        ) {
            let actions = if with_action {
                vec![("svcA#m1", DegradeAction::literal(json!("fallback")))]
            } else {
                vec![]
            };
            let fx = fixture(
                RecordingDecisionEngine::new()
                    .with_proactive(proactive)
                    .with_reactive(reactive)
                    .with_opted_in("quota-exceeded"),
                actions,
            );
            let convention = CallMethod::from_code(convention).unwrap();
            let handler = outcome(result);
            let mut ctx = context("svcA", "m1", convention);
            let _ = fx.filter.invoke(&handler, &mut ctx);

            let short_circuited = handler.calls() == 0;
            proptest::prop_assert_eq!(fx.tracker.requests().len(), usize::from(!short_circuited));
            proptest::prop_assert!(!short_circuited || (proactive && ctx.degrade_info().degraded));
            proptest::prop_assert!(fx.engine.reports().len() <= 1);
        }
    }
}
