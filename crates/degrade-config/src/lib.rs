//! Degrade Config
//!
//! Live-reloadable fallback configuration:
//! - [`DegradeActionCompiler`]: methods list + per-method specs → actions
//! - [`DegradeActionRegistry`]: atomically swapped snapshot of actions
//! - [`ProxyCache`]: compiled script proxies, invalidated per generation
//! - [`TypeRegistry`]: named types used to deserialize fallback content
//! - [`ExpressionScriptEngine`]: expression sandbox for script fallbacks
//! - [`MemoryConfigStore`]: in-memory [`degrade_core::ConfigStore`]
//!
//! # Example
//!
//! ```rust
//! use degrade_config::prelude::*;
//! use std::sync::Arc;
//!
//! let store = MemoryConfigStore::with_values([(
//!     format!("{KEY_DEGRADE_METHOD_PREFIX}svcA#m1"),
//!     r#"{enable:true, returnClass:"string", content:"\"ok\""}"#.to_string(),
//! )]);
//! let compiler = DegradeActionCompiler::new(Arc::new(store));
//! let registry = DegradeActionRegistry::new();
//! registry.install(compiler.compile("svcA#m1=svcA#m1").unwrap().actions);
//! assert_eq!(
//!     registry.get("svcA#m1").unwrap().literal_value(),
//!     Some(&serde_json::json!("ok"))
//! );
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod action;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod json;
pub mod registry;
pub mod script;
pub mod store;
pub mod types;

pub use action::{DegradeAction, FallbackStrategy};
pub use cache::ProxyCache;
pub use compiler::{
    CompiledActions, DegradeActionCompiler, SkipReason, SkippedEntry, KEY_DEGRADE_METHODS,
    KEY_DEGRADE_METHOD_PREFIX,
};
pub use config::DegradeActionConfig;
pub use error::{CompileError, ConfigError};
pub use json::parse_json_like;
pub use registry::{DegradeActionRegistry, RegistrySnapshot};
pub use script::{CompiledExpression, ExpressionScriptEngine, NativeFn};
pub use store::MemoryConfigStore;
pub use types::{TypeRegistry, TypeShape};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for compiling and serving degrade actions
    pub use crate::action::{DegradeAction, FallbackStrategy};
    pub use crate::compiler::{DegradeActionCompiler, KEY_DEGRADE_METHODS, KEY_DEGRADE_METHOD_PREFIX};
    pub use crate::error::{CompileError, ConfigError};
    pub use crate::registry::DegradeActionRegistry;
    pub use crate::script::ExpressionScriptEngine;
    pub use crate::store::MemoryConfigStore;
    pub use crate::types::TypeRegistry;
}
