//! JSON-like reader for fallback specs
//!
//! Fallback specs are hand-written in a live config console, so object keys
//! may be left unquoted (`{enable:true}`) and strings may use single quotes.
//! Bare keys are quoted and single-quoted strings rewritten, then the text
//! goes through serde_json. Everything else must be strict JSON.

use crate::error::ConfigError;
use serde_json::Value;

/// Parse JSON text, accepting bare identifier keys and single-quoted strings
///
/// # Errors
/// `ConfigError::Malformed` if the text is not valid after key quoting
pub fn parse_json_like(text: &str) -> Result<Value, ConfigError> {
    serde_json::from_str(&quote_bare_keys(text))
        .map_err(|e| ConfigError::Malformed(format!("{e} in {text:?}")))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || c == '@'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '@' | '.' | '-')
}

/// Quote identifiers that sit in key position and are followed by `:`
///
/// Quoted regions of either style are copied without key detection;
/// single-quoted ones are re-emitted with double quotes.
fn quote_bare_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    // Delimiter of the string being copied
    let mut quote: Option<char> = None;
    let mut escaped = false;
    // Key position: right after `{` or `,`, whitespace aside
    let mut key_position = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(delimiter) = quote {
            if escaped {
                escaped = false;
                if delimiter == '\'' && c == '\'' {
                    // `\'` has no JSON meaning; drop the backslash
                    out.pop();
                }
                out.push(c);
            } else if c == '\\' {
                escaped = true;
                out.push(c);
            } else if c == delimiter {
                quote = None;
                out.push('"');
            } else if c == '"' {
                out.push_str("\\\"");
            } else {
                out.push(c);
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                key_position = false;
                out.push('"');
            }
            '{' | ',' => {
                key_position = true;
                out.push(c);
            }
            c if c.is_whitespace() => out.push(c),
            c if key_position && is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();

                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if chars.get(j) == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                key_position = false;
                continue;
            }
            _ => {
                key_position = false;
                out.push(c);
            }
        }
        i += 1;
    }

    out
}

/// Short type label of a JSON value, for error messages
#[must_use]
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
