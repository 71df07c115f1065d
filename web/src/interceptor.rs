//! Request/response rewriting around every call.
//!
//! An [`InterceptorChain`] runs its hooks in a fixed order:
//!
//! ```text
//! on_call      first → last   (once, before any message; may add response headers)
//! on_request   first → last   (each inbound message)
//! on_response  last → first   (each outbound message)
//! ```
//!
//! Hooks only touch payloads and metadata. They cannot short-circuit a call
//! or change which messages are sent.

use crate::messages::{RequestMut, ResponseMut};
use crate::rpc::{Call, Metadata};
use std::sync::Arc;

/// A set of hooks around a call. Every hook defaults to doing nothing.
pub trait Interceptor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Runs once per call; may add response headers.
    fn on_call(&self, _call: &Call, _response_metadata: &mut Metadata) {}

    /// Runs on each inbound message before the handler sees it.
    fn on_request(&self, _call: &Call, _request: RequestMut<'_>) {}

    /// Runs on each outbound message before it is sent.
    fn on_response(&self, _call: &Call, _response: ResponseMut<'_>) {}
}

/// Ordered interceptors.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor.
    #[must_use]
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Names in order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.interceptors.iter().map(|i| i.name())
    }

    /// Run every `on_call`, first to last.
    pub fn on_call(&self, call: &Call, response_metadata: &mut Metadata) {
        for interceptor in &self.interceptors {
            interceptor.on_call(call, response_metadata);
        }
    }

    /// Run every `on_request`, first to last.
    pub fn on_request(&self, call: &Call, mut request: RequestMut<'_>) {
        for interceptor in &self.interceptors {
            interceptor.on_request(call, reborrow_request(&mut request));
        }
    }

    /// Run every `on_response`, last to first.
    pub fn on_response(&self, call: &Call, mut response: ResponseMut<'_>) {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.on_response(call, reborrow_response(&mut response));
        }
    }
}

fn reborrow_request<'a>(request: &'a mut RequestMut<'_>) -> RequestMut<'a> {
    match request {
        RequestMut::CurrentBalance(r) => RequestMut::CurrentBalance(r),
        RequestMut::ExchangeRate(r) => RequestMut::ExchangeRate(r),
        RequestMut::Transaction(r) => RequestMut::Transaction(r),
        RequestMut::Transfer(r) => RequestMut::Transfer(r),
        RequestMut::Resiliency(r) => RequestMut::Resiliency(r),
    }
}

fn reborrow_response<'a>(response: &'a mut ResponseMut<'_>) -> ResponseMut<'a> {
    match response {
        ResponseMut::CurrentBalance(r) => ResponseMut::CurrentBalance(r),
        ResponseMut::ExchangeRate(r) => ResponseMut::ExchangeRate(r),
        ResponseMut::TransactionSummary(r) => ResponseMut::TransactionSummary(r),
        ResponseMut::Transfer(r) => ResponseMut::Transfer(r),
        ResponseMut::Resiliency(r) => ResponseMut::Resiliency(r),
    }
}

/// Logs every call and message kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn on_call(&self, call: &Call, _response_metadata: &mut Metadata) {
        tracing::info!(
            method = %call.method,
            shape = call.method.shape().as_str(),
            correlation_id = %call.correlation_id,
            "RPC call"
        );
        tracing::debug!(metadata = ?call.request_metadata, "Request metadata");
    }

    fn on_request(&self, call: &Call, request: RequestMut<'_>) {
        tracing::debug!(
            method = %call.method,
            correlation_id = %call.correlation_id,
            kind = request.kind(),
            "Inbound message"
        );
    }

    fn on_response(&self, call: &Call, response: ResponseMut<'_>) {
        tracing::debug!(
            method = %call.method,
            correlation_id = %call.correlation_id,
            kind = response.kind(),
            "Outbound message"
        );
    }
}

/// Adds fixed key/value pairs to every call's response headers.
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadataInterceptor {
    pairs: Metadata,
}

impl ResponseMetadataInterceptor {
    /// Adds `pairs` to every response.
    #[must_use]
    pub const fn new(pairs: Metadata) -> Self {
        Self { pairs }
    }
}

impl Interceptor for ResponseMetadataInterceptor {
    fn name(&self) -> &'static str {
        "response_metadata"
    }

    fn on_call(&self, _call: &Call, response_metadata: &mut Metadata) {
        response_metadata.merge(&self.pairs);
    }
}

/// Rewrites inbound currency codes to trimmed upper case.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrencyNormalizer;

fn normalize(currency: &mut String) {
    let normalized = currency.trim().to_ascii_uppercase();
    *currency = normalized;
}

impl Interceptor for CurrencyNormalizer {
    fn name(&self) -> &'static str {
        "currency_normalizer"
    }

    fn on_request(&self, _call: &Call, request: RequestMut<'_>) {
        match request {
            RequestMut::ExchangeRate(r) => {
                normalize(&mut r.from_currency);
                normalize(&mut r.to_currency);
            },
            RequestMut::Transfer(r) => normalize(&mut r.currency),
            RequestMut::CurrentBalance(_)
            | RequestMut::Transaction(_)
            | RequestMut::Resiliency(_) => {},
        }
    }
}

/// Prefixes every outbound resiliency message with a tag.
#[derive(Debug, Clone)]
pub struct ResponseTagInterceptor {
    tag: String,
}

impl ResponseTagInterceptor {
    /// Prefix resiliency messages with `tag`.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl Interceptor for ResponseTagInterceptor {
    fn name(&self) -> &'static str {
        "response_tag"
    }

    fn on_response(&self, _call: &Call, response: ResponseMut<'_>) {
        if let ResponseMut::Resiliency(r) = response {
            r.message.insert_str(0, &self.tag);
        }
    }
}
