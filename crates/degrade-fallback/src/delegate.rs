//! Delegate targets and the invocation wrapper around them

use degrade_core::{CompiledScript, FallbackError, FallbackTarget, ScriptScope};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Invokes a [`FallbackTarget`] by method name
///
/// Exceptions the target raises on purpose pass through; every other
/// target failure is reported as [`FallbackError::Delegate`].
#[derive(Clone)]
pub struct DelegateInvoker {
    target: Arc<dyn FallbackTarget>,
}

impl DelegateInvoker {
    /// Wrap a target
    #[inline]
    #[must_use]
    pub fn new(target: Arc<dyn FallbackTarget>) -> Self {
        Self { target }
    }

    /// Invoke `method` on the target
    ///
    /// # Errors
    /// Raised exceptions, or `Delegate` for any other failure
    pub fn invoke(
        &self,
        method: &str,
        parameter_types: &[String],
        arguments: &[Value],
    ) -> Result<Value, FallbackError> {
        self.target
            .invoke(method, parameter_types, arguments)
            .map_err(|err| match err {
                FallbackError::Raised(_) | FallbackError::Delegate { .. } => err,
                other => FallbackError::delegate(method, other.to_string()),
            })
    }
}

impl fmt::Debug for DelegateInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateInvoker").finish_non_exhaustive()
    }
}

/// [`FallbackTarget`] answering every method with a compiled script
#[derive(Debug, Clone)]
pub struct ScriptProxy {
    script: Arc<dyn CompiledScript>,
}

impl ScriptProxy {
    /// Create proxy over a script
    #[inline]
    #[must_use]
    pub fn new(script: Arc<dyn CompiledScript>) -> Self {
        Self { script }
    }
}

impl FallbackTarget for ScriptProxy {
    fn invoke(
        &self,
        method: &str,
        parameter_types: &[String],
        arguments: &[Value],
    ) -> Result<Value, FallbackError> {
        self.script.evaluate(&ScriptScope {
            method,
            parameter_types,
            arguments,
        })
    }
}

type MethodFn = Arc<dyn Fn(&[Value]) -> Result<Value, FallbackError> + Send + Sync>;

/// Mock object built from one closure per method
///
/// ```rust
/// use degrade_fallback::MockService;
/// use degrade_core::FallbackTarget;
/// use serde_json::json;
///
/// let mock = MockService::new().with_method("echo", |args| Ok(args[0].clone()));
/// assert_eq!(mock.invoke("echo", &[], &[json!(1)]).unwrap(), json!(1));
/// assert!(mock.invoke("other", &[], &[]).is_err());
/// ```
#[derive(Clone, Default)]
pub struct MockService {
    methods: HashMap<String, MethodFn>,
}

impl MockService {
    /// Create mock with no methods
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a handler for `method`
    #[must_use]
    pub fn with_method<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, FallbackError> + Send + Sync + 'static,
    {
        self.methods.insert(method.into(), Arc::new(handler));
        self
    }
}

impl fmt::Debug for MockService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.methods.keys().collect();
        names.sort();
        f.debug_struct("MockService").field("methods", &names).finish()
    }
}

impl FallbackTarget for MockService {
    fn invoke(
        &self,
        method: &str,
        _parameter_types: &[String],
        arguments: &[Value],
    ) -> Result<Value, FallbackError> {
        let handler = self
            .methods
            .get(method)
            .ok_or_else(|| FallbackError::NoSuchMethod(method.to_string()))?;
        handler(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use degrade_config::ExpressionScriptEngine;
    use degrade_core::ExceptionDescriptor;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn raised_exceptions_pass_through() {
        let mock = MockService::new().with_method("m1", |_| {
            Err(ExceptionDescriptor::new("quota-exceeded").into())
        });
        let err = DelegateInvoker::new(Arc::new(mock)).invoke("m1", &[], &[]).unwrap_err();
        assert_eq!(err, FallbackError::Raised(ExceptionDescriptor::new("quota-exceeded")));
    }

    #[test]
    fn other_failures_are_hidden() {
        let err = DelegateInvoker::new(Arc::new(MockService::new()))
            .invoke("m1", &[], &[])
            .unwrap_err();
        match err {
            FallbackError::Delegate { method, message } => {
                assert_eq!(method, "m1");
                assert!(message.contains("no fallback handler"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn script_proxy_sees_call() {
        let script = ExpressionScriptEngine::new().compile_expression("args[0].id").unwrap();
        let proxy = ScriptProxy::new(Arc::new(script));
        let value = proxy
            .invoke("lookup", &["user".to_string()], &[json!({"id": 42})])
            .unwrap();
        assert_eq!(value, json!(42));
    }
}
