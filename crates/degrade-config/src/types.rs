//! Named types for fallback content
//!
//! Fallback specs name the type of their `content` (`returnClass`,
//! `keyClass`, `valueClass`, `componentClass`). [`TypeRegistry`] resolves
//! those names to a [`TypeShape`] and coerces parsed content into it.

use crate::error::ConfigError;
use crate::json::{kind_of, parse_json_like};
use degrade_core::ExceptionDescriptor;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Shape a named type requires of its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    /// JSON string
    String,
    /// Integral number
    Integer,
    /// Any number
    Float,
    /// Boolean
    Boolean,
    /// Any value
    Any,
    /// Any JSON object
    Object,
    /// Object with mandatory fields
    Record {
        /// Fields that must be present
        required: Vec<String>,
    },
    /// Ordered collection
    List,
    /// Collection without duplicates (first occurrence kept)
    Set,
    /// String-keyed map
    Map,
    /// Business exception
    Exception,
}

impl TypeShape {
    fn is_collection(&self) -> bool {
        matches!(self, Self::List | Self::Set)
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Shape(TypeShape),
    Alias(String),
}

/// Registry of named types
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Entry>,
}

impl TypeRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Create registry with built-in types
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("string", TypeShape::String);
        registry.register("int", TypeShape::Integer);
        registry.register("float", TypeShape::Float);
        registry.register("bool", TypeShape::Boolean);
        registry.register("json", TypeShape::Any);
        registry.register("object", TypeShape::Object);
        registry.register("list", TypeShape::List);
        registry.register("set", TypeShape::Set);
        registry.register("map", TypeShape::Map);
        registry.register("exception", TypeShape::Exception);

        for (alias, target) in [
            ("str", "string"),
            ("i32", "int"),
            ("i64", "int"),
            ("long", "int"),
            ("f64", "float"),
            ("double", "float"),
            ("boolean", "bool"),
            ("vec", "list"),
            ("hash_set", "set"),
            ("hash_map", "map"),
        ] {
            registry.types.insert(alias.to_string(), Entry::Alias(target.to_string()));
        }
        registry
    }

    /// Register a named type
    pub fn register(&mut self, name: impl Into<String>, shape: TypeShape) {
        self.types.insert(name.into(), Entry::Shape(shape));
    }

    /// Register a business exception type
    pub fn register_exception(&mut self, name: impl Into<String>) {
        self.register(name, TypeShape::Exception);
    }

    /// Register a record type with mandatory fields
    pub fn register_record<I, S>(&mut self, name: impl Into<String>, required: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required = required.into_iter().map(Into::into).collect();
        self.register(name, TypeShape::Record { required });
    }

    /// Make `alias` resolve to the already registered `target`
    ///
    /// # Errors
    /// `UnknownType` if `target` is not registered
    pub fn alias(&mut self, alias: impl Into<String>, target: &str) -> Result<(), ConfigError> {
        let (canonical, _) = self.resolve(target)?;
        let canonical = canonical.to_string();
        self.types.insert(alias.into(), Entry::Alias(canonical));
        Ok(())
    }

    /// Resolve a type name to its canonical name and shape
    ///
    /// # Errors
    /// `UnknownType` if not registered
    pub fn resolve<'a>(&'a self, name: &'a str) -> Result<(&'a str, &'a TypeShape), ConfigError> {
        let name = name.trim();
        match self.types.get_key_value(name) {
            Some((key, Entry::Shape(shape))) => Ok((key.as_str(), shape)),
            Some((_, Entry::Alias(target))) => match self.types.get_key_value(target.as_str()) {
                Some((key, Entry::Shape(shape))) => Ok((key.as_str(), shape)),
                _ => Err(ConfigError::UnknownType(target.clone())),
            },
            None => Err(ConfigError::UnknownType(name.to_string())),
        }
    }

    /// Whether a type name is known
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Coerce a parsed value into the named type
    ///
    /// # Errors
    /// Unknown type or content that does not fit the shape
    pub fn coerce(&self, type_name: &str, value: Value) -> Result<Value, ConfigError> {
        let (canonical, shape) = self.resolve(type_name)?;
        coerce_shape(canonical, shape, value)
    }

    /// Deserialize content as a plain value of the named type
    ///
    /// Absent or blank content yields `None`.
    ///
    /// # Errors
    /// Malformed content, unknown type, or shape mismatch
    pub fn deserialize_value(
        &self,
        type_name: &str,
        content: Option<&str>,
    ) -> Result<Option<Value>, ConfigError> {
        let Some(value) = parse_content(content)? else {
            return Ok(None);
        };
        self.coerce(type_name, value).map(Some)
    }

    /// Deserialize content as a typed map
    ///
    /// `map_type` defaults to `map` when absent.
    ///
    /// # Errors
    /// Malformed content, unknown types, non-map container, bad keys or values
    pub fn deserialize_map(
        &self,
        map_type: Option<&str>,
        key_type: &str,
        value_type: &str,
        content: Option<&str>,
    ) -> Result<Option<Value>, ConfigError> {
        let container = map_type.filter(|t| !t.trim().is_empty()).unwrap_or("map");
        let (canonical, shape) = self.resolve(container)?;
        if *shape != TypeShape::Map {
            return Err(ConfigError::type_mismatch("map type", canonical));
        }
        let (key_name, key_shape) = self.resolve(key_type)?;
        // Resolve eagerly so an unknown value type fails even for empty maps
        self.resolve(value_type)?;

        let Some(value) = parse_content(content)? else {
            return Ok(None);
        };
        let Value::Object(entries) = value else {
            return Err(ConfigError::type_mismatch("object", kind_of(&value)));
        };

        let mut out = Map::with_capacity(entries.len());
        for (key, value) in entries {
            check_key(key_name, key_shape, &key)?;
            out.insert(key, self.coerce(value_type, value)?);
        }
        Ok(Some(Value::Object(out)))
    }

    /// Deserialize content as a typed collection
    ///
    /// `collection_type` defaults to `list` when absent.
    ///
    /// # Errors
    /// Malformed content, unknown types, non-collection container, bad elements
    pub fn deserialize_collection(
        &self,
        collection_type: Option<&str>,
        element_type: &str,
        content: Option<&str>,
    ) -> Result<Option<Value>, ConfigError> {
        let container = collection_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("list");
        let (canonical, shape) = self.resolve(container)?;
        if !shape.is_collection() {
            return Err(ConfigError::type_mismatch("collection type", canonical));
        }
        self.resolve(element_type)?;

        let Some(value) = parse_content(content)? else {
            return Ok(None);
        };
        let Value::Array(items) = value else {
            return Err(ConfigError::type_mismatch("array", kind_of(&value)));
        };

        let mut out: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            let item = self.coerce(element_type, item)?;
            if *shape == TypeShape::Set && out.contains(&item) {
                continue;
            }
            out.push(item);
        }
        Ok(Some(Value::Array(out)))
    }

    /// Deserialize content as an instance of the named exception type
    ///
    /// Content may be a string (the message), an object (`message` plus
    /// extra fields) or absent.
    ///
    /// # Errors
    /// `NotAnException` if the type is not an exception type
    pub fn deserialize_exception(
        &self,
        type_name: &str,
        content: Option<&str>,
    ) -> Result<ExceptionDescriptor, ConfigError> {
        let (canonical, shape) = self.resolve(type_name)?;
        if *shape != TypeShape::Exception {
            return Err(ConfigError::NotAnException(canonical.to_string()));
        }
        let mut exception = ExceptionDescriptor::new(canonical);

        match parse_content(content)? {
            None | Some(Value::Null) => {}
            Some(Value::String(message)) => exception.message = Some(message),
            Some(Value::Object(mut fields)) => {
                match fields.remove("message") {
                    Some(Value::String(message)) => exception.message = Some(message),
                    Some(Value::Null) | None => {}
                    Some(other) => {
                        return Err(ConfigError::type_mismatch("string message", kind_of(&other)))
                    }
                }
                exception.fields = fields;
            }
            Some(other) => {
                return Err(ConfigError::type_mismatch("exception object", kind_of(&other)))
            }
        }
        Ok(exception)
    }
}

fn parse_content(content: Option<&str>) -> Result<Option<Value>, ConfigError> {
    match content.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_json_like(text).map(Some),
    }
}

fn coerce_shape(name: &str, shape: &TypeShape, value: Value) -> Result<Value, ConfigError> {
    if value.is_null() {
        return Ok(value);
    }
    match shape {
        TypeShape::Set => {
            let Value::Array(items) = value else {
                return Err(ConfigError::type_mismatch(name, kind_of(&value)));
            };
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            return Ok(Value::Array(unique));
        }
        TypeShape::Exception => {
            let exception = exception_from_value(name, value)?;
            return serde_json::to_value(exception)
                .map_err(|e| ConfigError::Deserialize(e.to_string()));
        }
        TypeShape::Record { required } => {
            if let Value::Object(fields) = &value {
                if let Some(missing) = required.iter().find(|f| !fields.contains_key(f.as_str())) {
                    return Err(ConfigError::type_mismatch(
                        format!("{name} with field '{missing}'"),
                        "object without it",
                    ));
                }
            }
        }
        _ => {}
    }

    let ok = match (shape, &value) {
        (TypeShape::Any, _)
        | (TypeShape::String, Value::String(_))
        | (TypeShape::Float, Value::Number(_))
        | (TypeShape::Boolean, Value::Bool(_))
        | (TypeShape::Object | TypeShape::Map | TypeShape::Record { .. }, Value::Object(_))
        | (TypeShape::List, Value::Array(_)) => true,
        (TypeShape::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        _ => false,
    };

    if ok {
        Ok(value)
    } else {
        Err(ConfigError::type_mismatch(name, kind_of(&value)))
    }
}

fn exception_from_value(name: &str, value: Value) -> Result<ExceptionDescriptor, ConfigError> {
    let mut exception = ExceptionDescriptor::new(name);
    match value {
        Value::String(message) => exception.message = Some(message),
        Value::Object(mut fields) => {
            if let Some(Value::String(message)) = fields.remove("message") {
                exception.message = Some(message);
            }
            exception.fields = fields;
        }
        other => return Err(ConfigError::type_mismatch("exception object", kind_of(&other))),
    }
    Ok(exception)
}

fn check_key(key_type: &str, shape: &TypeShape, key: &str) -> Result<(), ConfigError> {
    let ok = match shape {
        TypeShape::String | TypeShape::Any => true,
        TypeShape::Integer => key.trim().parse::<i64>().is_ok(),
        TypeShape::Float => key.trim().parse::<f64>().is_ok(),
        TypeShape::Boolean => matches!(key.trim(), "true" | "false"),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidKey {
            key: key.to_string(),
            key_type: key_type.to_string(),
        })
    }
}
