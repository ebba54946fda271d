//! Completable invocation futures
//!
//! Handed to future-convention callers. Completion is single-shot: the first
//! response wins. Callers may block with a timeout or `.await`.

use crate::error::RpcError;
use crate::response::InvocationResponse;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

struct FutureState {
    slot: Mutex<Slot>,
    done: Condvar,
}

#[derive(Default)]
struct Slot {
    response: Option<InvocationResponse>,
    wakers: Vec<Waker>,
}

/// Completable future carrying an [`InvocationResponse`]
#[derive(Clone)]
pub struct InvocationFuture {
    state: Arc<FutureState>,
    timeout_ms: u64,
}

impl InvocationFuture {
    /// Create a pending future
    #[must_use]
    pub fn pending(timeout_ms: u64) -> Self {
        Self {
            state: Arc::new(FutureState {
                slot: Mutex::new(Slot::default()),
                done: Condvar::new(),
            }),
            timeout_ms,
        }
    }

    /// Create a future that is already complete
    #[must_use]
    pub fn completed(response: InvocationResponse, timeout_ms: u64) -> Self {
        let future = Self::pending(timeout_ms);
        future.complete(response);
        future
    }

    /// Complete the future
    ///
    /// Returns `false` if it was already complete; the first response is kept.
    pub fn complete(&self, response: InvocationResponse) -> bool {
        let wakers = {
            let mut slot = self.state.slot.lock();
            if slot.response.is_some() {
                return false;
            }
            slot.response = Some(response);
            std::mem::take(&mut slot.wakers)
        };
        self.state.done.notify_all();
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Whether a response is available
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.slot.lock().response.is_some()
    }

    /// Response if already available
    #[must_use]
    pub fn try_get(&self) -> Option<InvocationResponse> {
        self.state.slot.lock().response.clone()
    }

    /// Timeout this future was created with
    #[inline]
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Block until complete or the timeout elapses
    ///
    /// # Errors
    /// `RequestTimeout` if no response arrived in time
    pub fn get(&self) -> Result<InvocationResponse, RpcError> {
        let deadline = Duration::from_millis(self.timeout_ms);
        let mut slot = self.state.slot.lock();
        if slot.response.is_none() {
            let _ = self.state.done.wait_while_for(&mut slot, |s| s.response.is_none(), deadline);
        }
        slot.response.clone().ok_or_else(|| {
            RpcError::timeout(format!("no response within {}ms", self.timeout_ms))
        })
    }
}

impl std::future::Future for InvocationFuture {
    type Output = InvocationResponse;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.state.slot.lock();
        match &slot.response {
            Some(response) => Poll::Ready(response.clone()),
            None => {
                if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    slot.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for InvocationFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationFuture")
            .field("done", &self.is_done())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn completed_future_is_done() {
        let future = InvocationFuture::completed(InvocationResponse::value(json!(1)), 100);
        assert!(future.is_done());
        assert_eq!(
            future.get().unwrap().return_value(),
            Some(&json!(1))
        );
    }

    #[test]
    fn first_completion_wins() {
        let future = InvocationFuture::pending(100);
        assert!(future.complete(InvocationResponse::value(json!("first"))));
        assert!(!future.complete(InvocationResponse::value(json!("second"))));
        assert_eq!(
            future.try_get().unwrap().return_value(),
            Some(&json!("first"))
        );
    }

    #[test]
    fn pending_future_times_out() {
        let future = InvocationFuture::pending(10);
        let err = future.get().unwrap_err();
        assert!(err.to_string().contains("10ms"));
    }

    #[test]
    fn completion_from_another_thread() {
        let future = InvocationFuture::pending(2_000);
        let producer = future.clone();
        let handle = std::thread::spawn(move || {
            producer.complete(InvocationResponse::no_return());
        });
        assert!(future.get().unwrap().is_no_return());
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn future_can_be_awaited() {
        let future = InvocationFuture::pending(1_000);
        let producer = future.clone();
        tokio::spawn(async move {
            producer.complete(InvocationResponse::value(json!("late")));
        });
        let response = future.await;
        assert_eq!(response.return_value(), Some(&json!("late")));
    }
}
