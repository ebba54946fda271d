//! Invocation responses
//!
//! A response pairs a message type with its payload. Message types decide how
//! the filter classifies an outcome: transport exceptions and business
//! exceptions travel as ordinary responses, not as `Err`.

use crate::error::{ExceptionDescriptor, RpcError};
use crate::future::InvocationFuture;
use serde_json::Value;

/// Response message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Normal service result
    Service,
    /// Transport-level exception
    Exception,
    /// Business exception raised by the service (or a fallback)
    ServiceException,
    /// Acknowledgment with no value
    NoReturn,
    /// Result will be delivered through a future
    Future,
}

impl MessageType {
    /// Stable wire code
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Service => 2,
            Self::Exception => 3,
            Self::ServiceException => 4,
            Self::NoReturn => 5,
            Self::Future => 6,
        }
    }
}

/// Response payload
#[derive(Debug, Clone)]
pub enum ResponsePayload {
    /// No value
    Empty,
    /// Service value
    Value(Value),
    /// Transport failure
    Transport(RpcError),
    /// Business exception
    Exception(ExceptionDescriptor),
    /// Pending or completed future
    Future(InvocationFuture),
}

/// A response flowing back through the pipeline
#[derive(Debug, Clone)]
pub struct InvocationResponse {
    message_type: MessageType,
    payload: ResponsePayload,
}

impl InvocationResponse {
    /// Normal response carrying a value
    #[inline]
    #[must_use]
    pub fn value(value: Value) -> Self {
        Self {
            message_type: MessageType::Service,
            payload: ResponsePayload::Value(value),
        }
    }

    /// Business-exception response
    #[inline]
    #[must_use]
    pub fn service_exception(exception: ExceptionDescriptor) -> Self {
        Self {
            message_type: MessageType::ServiceException,
            payload: ResponsePayload::Exception(exception),
        }
    }

    /// Transport-exception response
    #[inline]
    #[must_use]
    pub fn transport(err: RpcError) -> Self {
        Self {
            message_type: MessageType::Exception,
            payload: ResponsePayload::Transport(err),
        }
    }

    /// Fixed no-return acknowledgment
    #[inline]
    #[must_use]
    pub fn no_return() -> Self {
        Self {
            message_type: MessageType::NoReturn,
            payload: ResponsePayload::Empty,
        }
    }

    /// Response handing out a future
    #[inline]
    #[must_use]
    pub fn future(future: InvocationFuture) -> Self {
        Self {
            message_type: MessageType::Future,
            payload: ResponsePayload::Future(future),
        }
    }

    /// Message type
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Payload
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &ResponsePayload {
        &self.payload
    }

    /// Whether the response carries a non-null return
    #[must_use]
    pub fn has_return(&self) -> bool {
        !matches!(
            self.payload,
            ResponsePayload::Empty | ResponsePayload::Value(Value::Null)
        )
    }

    /// Service value, if any
    #[must_use]
    pub fn return_value(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Transport error, if any
    #[must_use]
    pub fn transport_error(&self) -> Option<&RpcError> {
        match &self.payload {
            ResponsePayload::Transport(err) => Some(err),
            _ => None,
        }
    }

    /// Business exception, if any
    #[must_use]
    pub fn exception(&self) -> Option<&ExceptionDescriptor> {
        match &self.payload {
            ResponsePayload::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    /// Future, if any
    #[must_use]
    pub fn as_future(&self) -> Option<&InvocationFuture> {
        match &self.payload {
            ResponsePayload::Future(future) => Some(future),
            _ => None,
        }
    }

    /// Whether this is the no-return acknowledgment
    #[inline]
    #[must_use]
    pub fn is_no_return(&self) -> bool {
        self.message_type == MessageType::NoReturn
    }
}
