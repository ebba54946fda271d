//! Degrade Filter
//!
//! The invocation pipeline stage that applies degradation policies:
//! - [`DegradationFilter`]: proactive and reactive degrade around dispatch
//! - [`DegradeActionManager`]: startup compilation and live reloads
//! - [`FilterChain`]: stacks filters around a terminal handler
//! - [`PropertiesFile`]: TOML-backed properties for the CLI and tests
//!
//! # Example
//!
//! ```rust
//! use degrade_filter::prelude::*;
//! use degrade_core::{CallMethod, DecisionEngine, InvocationContext, InvocationHandler, InvokerSettings};
//! use degrade_core::{ExceptionDescriptor, FailureCause, InvocationResponse, QualityTracker, RpcError};
//! use std::sync::Arc;
//!
//! struct AlwaysDegrade;
//! impl DecisionEngine for AlwaysDegrade {
//!     fn need_proactive_degrade(&self, _: &InvocationContext) -> bool { true }
//!     fn need_reactive_degrade(&self, _: &InvocationContext) -> bool { false }
//!     fn is_opted_into_reactive_degrade(&self, _: &ExceptionDescriptor) -> bool { false }
//!     fn report_normal(&self, _: &InvocationContext) {}
//!     fn report_failed(&self, _: &InvocationContext, _: &FailureCause) {}
//!     fn report_degraded(&self, _: &InvocationContext, _: Option<&FailureCause>) {}
//! }
//!
//! struct Ignore;
//! impl QualityTracker for Ignore {
//!     fn report_client_request(&self, _: &InvocationContext, _: bool) {}
//! }
//!
//! struct Offline;
//! impl InvocationHandler for Offline {
//!     fn handle(&self, _: &mut InvocationContext) -> Result<InvocationResponse, RpcError> {
//!         Err(RpcError::unavailable("offline"))
//!     }
//! }
//!
//! let store = Arc::new(MemoryConfigStore::with_values([
//!     (KEY_DEGRADE_METHODS.to_string(), "svcA#m1=svcA#m1".to_string()),
//!     (
//!         format!("{KEY_DEGRADE_METHOD_PREFIX}svcA#m1"),
//!         r#"{returnClass:"string", content:"\"cached\""}"#.to_string(),
//!     ),
//! ]));
//! let registry = Arc::new(DegradeActionRegistry::new());
//! let _manager = DegradeActionManager::start(store, Arc::clone(&registry), FilterSettings::default()).unwrap();
//!
//! let executor = Arc::new(FallbackExecutor::new(registry, Arc::new(AlwaysDegrade)));
//! let chain = FilterChain::new(Arc::new(Offline))
//!     .with_filter(Arc::new(DegradationFilter::new(executor, Arc::new(Ignore))));
//!
//! let settings = InvokerSettings::new("svcA").with_call_method(CallMethod::Sync);
//! let mut ctx = InvocationContext::new(Arc::new(settings), "m1");
//! let response = chain.handle(&mut ctx).unwrap();
//! assert_eq!(response.return_value(), Some(&serde_json::json!("cached")));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod chain;
pub mod error;
pub mod filter;
pub mod manager;
pub mod properties;
pub mod settings;

pub use chain::{FilterChain, InvocationFilter};
pub use error::FilterError;
pub use filter::DegradationFilter;
pub use manager::DegradeActionManager;
pub use properties::PropertiesFile;
pub use settings::FilterSettings;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring the degradation stage
    pub use crate::chain::{FilterChain, InvocationFilter};
    pub use crate::error::FilterError;
    pub use crate::filter::DegradationFilter;
    pub use crate::manager::DegradeActionManager;
    pub use crate::properties::PropertiesFile;
    pub use crate::settings::FilterSettings;
    pub use degrade_config::prelude::*;
    pub use degrade_fallback::FallbackExecutor;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
