//! Degrade Core
//!
//! Data model and collaborator contracts of the invoker-side degradation
//! layer:
//! - Calling conventions and per-service invoker settings
//! - The per-call [`InvocationContext`] with its [`DegradeInfo`]
//! - Responses, completable futures and callbacks
//! - The error taxonomy (transport, business, fallback)
//! - Traits for the decision engine, config store, quality tracker,
//!   monitoring, delegate targets and script engines
//!
//! # Example
//!
//! ```rust
//! use degrade_core::prelude::*;
//! use std::sync::Arc;
//!
//! let settings = InvokerSettings::new("svcA").with_call_method(CallMethod::Future);
//! let ctx = InvocationContext::new(Arc::new(settings), "m1");
//! assert_eq!(ctx.call_method(), CallMethod::Future);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod collaborators;
pub mod context;
pub mod error;
pub mod future;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use collaborators::{
    CompiledScript, ConfigListener, ConfigStore, DecisionEngine, FallbackTarget, InvocationCallback,
    InvocationHandler, Monitor, MonitorTransaction, NoopMonitor, QualityTracker, ScriptEngine,
    ScriptScope,
};
pub use context::{DegradeInfo, InvocationContext, InvocationOverrides};
pub use error::{
    exception_kinds, ConfigStoreError, ExceptionDescriptor, FailureCause, FallbackError, RpcError,
    RpcErrorKind, ScriptError,
};
pub use future::InvocationFuture;
pub use response::{InvocationResponse, MessageType, ResponsePayload};
pub use types::{CallMethod, InvokerSettings, MonitorData, TimePhase, TimePoint};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with invocation contexts
    pub use crate::collaborators::{
        DecisionEngine, FallbackTarget, InvocationCallback, InvocationHandler, QualityTracker,
    };
    pub use crate::context::{DegradeInfo, InvocationContext, InvocationOverrides};
    pub use crate::error::{ExceptionDescriptor, FailureCause, FallbackError, RpcError, RpcErrorKind};
    pub use crate::response::{InvocationResponse, MessageType};
    pub use crate::types::{CallMethod, InvokerSettings};
}
