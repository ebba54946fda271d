//! Degrade Fallback
//!
//! Synthesizes substitute responses for degraded calls:
//! - [`FallbackExecutor`]: per-convention synthesis and outcome reporting
//! - [`DelegateInvoker`]: invokes mock objects and script proxies by method name
//! - [`ScriptProxy`]: a [`degrade_core::FallbackTarget`] over a compiled script
//! - [`MockService`]: closure-per-method mock object

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod delegate;
pub mod executor;

pub use delegate::{DelegateInvoker, MockService, ScriptProxy};
pub use executor::{FallbackExecutor, CURRENT_TIMEOUT_DATA_KEY};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
