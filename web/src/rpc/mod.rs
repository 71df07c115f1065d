//! Transport-independent RPC plumbing: methods, metadata, status,
//! cancellation and the typed request/response streams handlers work on.

pub mod cancel;
pub mod metadata;
pub mod method;
pub mod status;
pub mod stream;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use metadata::Metadata;
pub use method::{BANK_SERVICE, CallShape, Method, RESILIENCY_SERVICE};
pub use status::{Code, FieldViolation, HelpLink, PreconditionViolation, Status, StatusDetail};
pub use stream::{Outgoing, RequestStream, ResponseSink};

use uuid::Uuid;

/// What is known about a call before any message is read.
#[derive(Debug, Clone)]
pub struct Call {
    /// Method being called
    pub method: Method,
    /// Request headers
    pub request_metadata: Metadata,
    /// Correlation id assigned by the transport
    pub correlation_id: Uuid,
}

impl Call {
    /// A call with no request metadata and a fresh correlation id.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self::with_metadata(method, Metadata::new())
    }

    /// A call carrying `request_metadata`.
    #[must_use]
    pub fn with_metadata(method: Method, request_metadata: Metadata) -> Self {
        Self {
            method,
            request_metadata,
            correlation_id: Uuid::new_v4(),
        }
    }
}

/// A unary reply: response headers plus the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    /// Response headers
    pub metadata: Metadata,
    /// Response message
    pub message: T,
}
