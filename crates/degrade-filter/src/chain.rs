//! Invocation pipeline plumbing
//!
//! A [`FilterChain`] wraps a terminal handler in filters. The filter added
//! last runs first.

use degrade_core::{InvocationContext, InvocationHandler, InvocationResponse, RpcError};
use std::sync::Arc;

/// A pipeline stage that may short-circuit or post-process a call
pub trait InvocationFilter: Send + Sync {
    /// Handle the call, delegating to `next` when it should proceed
    ///
    /// # Errors
    /// Transport failures that no stage substituted
    fn invoke(
        &self,
        next: &dyn InvocationHandler,
        ctx: &mut InvocationContext,
    ) -> Result<InvocationResponse, RpcError>;
}

struct Link {
    filter: Arc<dyn InvocationFilter>,
    next: Arc<dyn InvocationHandler>,
}

impl InvocationHandler for Link {
    fn handle(&self, ctx: &mut InvocationContext) -> Result<InvocationResponse, RpcError> {
        self.filter.invoke(self.next.as_ref(), ctx)
    }
}

/// Filters stacked around a terminal handler
#[derive(Clone)]
pub struct FilterChain {
    head: Arc<dyn InvocationHandler>,
    depth: usize,
}

impl FilterChain {
    /// Chain with no filters
    pub fn new(handler: Arc<dyn InvocationHandler>) -> Self {
        Self {
            head: handler,
            depth: 0,
        }
    }

    /// Wrap the chain in another filter
    #[must_use]
    pub fn with_filter(self, filter: Arc<dyn InvocationFilter>) -> Self {
        Self {
            head: Arc::new(Link {
                filter,
                next: self.head,
            }),
            depth: self.depth + 1,
        }
    }

    /// Number of filters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.depth
    }

    /// Whether the chain has no filters
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain").field("filters", &self.depth).finish()
    }
}

impl InvocationHandler for FilterChain {
    fn handle(&self, ctx: &mut InvocationContext) -> Result<InvocationResponse, RpcError> {
        self.head.handle(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use degrade_core::CallMethod;
    use degrade_test_utils::{context, ScriptedHandler};
    use parking_lot::Mutex;
    use serde_json::json;

    struct Tag {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl InvocationFilter for Tag {
        fn invoke(
            &self,
            next: &dyn InvocationHandler,
            ctx: &mut InvocationContext,
        ) -> Result<InvocationResponse, RpcError> {
            self.order.lock().push(self.name);
            next.handle(ctx)
        }
    }

    #[test]
    fn last_added_runs_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(ScriptedHandler::ok(json!(1)));
        let chain = FilterChain::new(Arc::clone(&handler) as Arc<dyn InvocationHandler>)
            .with_filter(Arc::new(Tag {
                name: "inner",
                order: Arc::clone(&order),
            }))
            .with_filter(Arc::new(Tag {
                name: "outer",
                order: Arc::clone(&order),
            }));

        let mut ctx = context("svcA", "m1", CallMethod::Sync);
        let response = chain.handle(&mut ctx).unwrap();
        assert_eq!(response.return_value(), Some(&json!(1)));
        assert_eq!(*order.lock(), vec!["outer", "inner"]);
        assert_eq!(chain.len(), 2);
        assert_eq!(handler.calls(), 1);
    }
}
