//! Expression sandbox for script-backed fallbacks
//!
//! A script is a single expression:
//!
//! | form | result |
//! |---|---|
//! | JSON literal (`"ok"`, `{"a": 1}`) | the literal |
//! | `method` | name of the called method |
//! | `parameterTypes` | declared parameter types |
//! | `args`, `args[0].user.id`, `args[1][2]` | argument or a path into it (missing → `null`) |
//! | `raise("kind")`, `raise("kind", "message")` | raises a business exception |
//! | `native:<name>` | calls a pre-registered native function |

use degrade_core::{CompiledScript, ExceptionDescriptor, FallbackError, ScriptEngine, ScriptError, ScriptScope};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Native fallback function callable as `native:<name>`
pub type NativeFn = Arc<dyn Fn(&ScriptScope<'_>) -> Result<Value, FallbackError> + Send + Sync>;

const NATIVE_PREFIX: &str = "native:";

#[derive(Debug, Clone)]
enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Clone)]
enum Expr {
    Literal(Value),
    Method,
    ParameterTypes,
    Args(Vec<Segment>),
    Raise(ExceptionDescriptor),
    Native(NativeFn),
}

/// A compiled expression
#[derive(Clone)]
pub struct CompiledExpression {
    source: String,
    expr: Expr,
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl CompiledScript for CompiledExpression {
    fn evaluate(&self, scope: &ScriptScope<'_>) -> Result<Value, FallbackError> {
        match &self.expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Method => Ok(Value::String(scope.method.to_string())),
            Expr::ParameterTypes => Ok(Value::Array(
                scope
                    .parameter_types
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            )),
            Expr::Args(path) => {
                let Some((first, rest)) = path.split_first() else {
                    return Ok(Value::Array(scope.arguments.to_vec()));
                };
                let root = match first {
                    Segment::Index(i) => scope.arguments.get(*i),
                    Segment::Field(_) => None,
                };
                let mut current = root;
                for segment in rest {
                    current = current.and_then(|v| match segment {
                        Segment::Field(name) => v.get(name.as_str()),
                        Segment::Index(i) => v.get(*i),
                    });
                }
                Ok(current.cloned().unwrap_or(Value::Null))
            }
            Expr::Raise(exception) => Err(FallbackError::Raised(exception.clone())),
            Expr::Native(native) => native(scope),
        }
    }

    fn source(&self) -> &str {
        &self.source
    }
}

/// Script engine evaluating [`CompiledExpression`]s
#[derive(Clone, Default)]
pub struct ExpressionScriptEngine {
    natives: HashMap<String, NativeFn>,
}

impl fmt::Debug for ExpressionScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.natives.keys().collect();
        names.sort();
        f.debug_struct("ExpressionScriptEngine")
            .field("natives", &names)
            .finish()
    }
}

impl ExpressionScriptEngine {
    /// Create engine with no native functions
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native function
    pub fn register_native<F>(&mut self, name: impl Into<String>, native: F)
    where
        F: Fn(&ScriptScope<'_>) -> Result<Value, FallbackError> + Send + Sync + 'static,
    {
        self.natives.insert(name.into(), Arc::new(native));
    }

    /// With a native function
    #[must_use]
    pub fn with_native<F>(mut self, name: impl Into<String>, native: F) -> Self
    where
        F: Fn(&ScriptScope<'_>) -> Result<Value, FallbackError> + Send + Sync + 'static,
    {
        self.register_native(name, native);
        self
    }

    /// Compile into the concrete expression type
    ///
    /// # Errors
    /// Empty source, syntax errors, unknown natives
    pub fn compile_expression(&self, source: &str) -> Result<CompiledExpression, ScriptError> {
        let leading = source.len() - source.trim_start().len();
        let text = source.trim();
        if text.is_empty() {
            return Err(ScriptError::Empty);
        }

        let expr = if let Some(name) = text.strip_prefix(NATIVE_PREFIX) {
            let name = name.trim();
            if name.is_empty() || !name.chars().all(is_ident_char) {
                return Err(syntax(leading + NATIVE_PREFIX.len(), "expected native function name"));
            }
            let native = self
                .natives
                .get(name)
                .ok_or_else(|| ScriptError::UnknownNative(name.to_string()))?;
            Expr::Native(Arc::clone(native))
        } else if text == "method" {
            Expr::Method
        } else if text == "parameterTypes" {
            Expr::ParameterTypes
        } else if let Some(path) = text.strip_prefix("args") {
            Expr::Args(parse_path(path, leading + "args".len())?)
        } else if let Some(inner) = text.strip_prefix("raise(") {
            let Some(inner) = inner.strip_suffix(')') else {
                return Err(syntax(leading + text.len(), "expected ')'"));
            };
            Expr::Raise(parse_raise(inner, leading + "raise(".len())?)
        } else {
            let value = serde_json::from_str(text)
                .map_err(|e| syntax(leading + offset_of(text, e.line(), e.column()), e.to_string()))?;
            Expr::Literal(value)
        };

        Ok(CompiledExpression {
            source: source.to_string(),
            expr,
        })
    }
}

impl ScriptEngine for ExpressionScriptEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledScript>, ScriptError> {
        Ok(Arc::new(self.compile_expression(source)?))
    }
}

fn syntax(offset: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Syntax {
        offset,
        message: message.into(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Byte offset of a 1-based line/column pair
fn offset_of(text: &str, line: usize, column: usize) -> usize {
    let before: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    before + column.saturating_sub(1)
}

fn parse_path(path: &str, base: usize) -> Result<Vec<Segment>, ScriptError> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                let close = path[i..]
                    .find(']')
                    .map(|p| i + p)
                    .ok_or_else(|| syntax(base + i, "unclosed '['"))?;
                let index = path[i + 1..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| syntax(base + i + 1, "expected array index"))?;
                segments.push(Segment::Index(index));
                i = close + 1;
            }
            b'.' => {
                let start = i + 1;
                let end = path[start..]
                    .find(|c: char| c == '.' || c == '[')
                    .map_or(path.len(), |p| start + p);
                let name = &path[start..end];
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                    return Err(syntax(base + start, "expected field name"));
                }
                if segments.is_empty() {
                    return Err(syntax(base + i, "arguments are indexed, use args[N]"));
                }
                segments.push(Segment::Field(name.to_string()));
                i = end;
            }
            _ => return Err(syntax(base + i, "expected '[' or '.'")),
        }
    }
    Ok(segments)
}

fn parse_raise(inner: &str, base: usize) -> Result<ExceptionDescriptor, ScriptError> {
    let array = format!("[{inner}]");
    let parts: Vec<Value> = serde_json::from_str(&array)
        .map_err(|e| syntax(base + offset_of(inner, e.line(), e.column()).saturating_sub(1), e.to_string()))?;

    let mut strings = parts.iter().map(Value::as_str);
    match (strings.next(), strings.next(), strings.next()) {
        (Some(Some(kind)), None, None) if !kind.is_empty() => Ok(ExceptionDescriptor::new(kind)),
        (Some(Some(kind)), Some(Some(message)), None) if !kind.is_empty() => {
            Ok(ExceptionDescriptor::new(kind).with_message(message))
        }
        _ => Err(syntax(base, "raise expects (\"kind\") or (\"kind\", \"message\")")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn eval(engine: &ExpressionScriptEngine, source: &str, arguments: &[Value]) -> Result<Value, FallbackError> {
        let types = vec!["user".to_string(), "int".to_string()];
        let scope = ScriptScope {
            method: "lookup",
            parameter_types: &types,
            arguments,
        };
        engine.compile_expression(source).unwrap().evaluate(&scope)
    }

    #[test]
    fn literals() {
        let engine = ExpressionScriptEngine::new();
        assert_eq!(eval(&engine, "\"ok\"", &[]).unwrap(), json!("ok"));
        assert_eq!(eval(&engine, " {\"a\": [1, 2]} ", &[]).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn call_variables() {
        let engine = ExpressionScriptEngine::new();
        assert_eq!(eval(&engine, "method", &[]).unwrap(), json!("lookup"));
        assert_eq!(eval(&engine, "parameterTypes", &[]).unwrap(), json!(["user", "int"]));
    }

    #[test]
    fn argument_paths() {
        let engine = ExpressionScriptEngine::new();
        let args = [json!({"user": {"id": 7, "tags": ["a", "b"]}}), json!(3)];
        assert_eq!(eval(&engine, "args", &args).unwrap(), json!(args));
        assert_eq!(eval(&engine, "args[1]", &args).unwrap(), json!(3));
        assert_eq!(eval(&engine, "args[0].user.id", &args).unwrap(), json!(7));
        assert_eq!(eval(&engine, "args[0].user.tags[1]", &args).unwrap(), json!("b"));
        assert_eq!(eval(&engine, "args[0].missing.deeper", &args).unwrap(), Value::Null);
        assert_eq!(eval(&engine, "args[9]", &args).unwrap(), Value::Null);
    }

    #[test]
    fn raise_produces_exception() {
        let engine = ExpressionScriptEngine::new();
        let err = eval(&engine, r#"raise("quota-exceeded", "slow down")"#, &[]).unwrap_err();
        assert_eq!(
            err,
            FallbackError::Raised(ExceptionDescriptor::new("quota-exceeded").with_message("slow down"))
        );
    }

    #[test]
    fn natives() {
        let engine = ExpressionScriptEngine::new()
            .with_native("first_arg_or_zero", |scope| {
                Ok(scope.arguments.first().cloned().unwrap_or(json!(0)))
            });
        assert_eq!(eval(&engine, "native:first_arg_or_zero", &[json!(5)]).unwrap(), json!(5));
        assert_eq!(
            engine.compile_expression("native:missing").unwrap_err(),
            ScriptError::UnknownNative("missing".to_string())
        );
    }

    #[test]
    fn syntax_errors() {
        let engine = ExpressionScriptEngine::new();
        assert_eq!(engine.compile_expression("   ").unwrap_err(), ScriptError::Empty);
        assert!(matches!(
            engine.compile_expression("args[x]"),
            Err(ScriptError::Syntax { offset: 5, .. })
        ));
        assert!(matches!(
            engine.compile_expression("args.name"),
            Err(ScriptError::Syntax { .. })
        ));
        assert!(matches!(
            engine.compile_expression("raise(1)"),
            Err(ScriptError::Syntax { .. })
        ));
        assert!(matches!(
            engine.compile_expression("return 'ok'"),
            Err(ScriptError::Syntax { .. })
        ));
    }

    #[test]
    fn source_is_kept() {
        let engine = ExpressionScriptEngine::new();
        let script = engine.compile(" method ").unwrap();
        assert_eq!(script.source(), " method ");
    }
}
