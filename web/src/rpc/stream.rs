//! Typed request and response streams handed to streaming handlers.
//!
//! Both ends run the interceptor chain, so handlers only ever see
//! rewritten requests and only ever emit rewritten responses.

use super::{Call, Code, Metadata, Status};
use crate::interceptor::InterceptorChain;
use crate::messages::{Inbound, Outbound};
use ledger_rpc_runtime::metrics::RpcMetrics;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What a [`ResponseSink`] hands to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing<T> {
    /// Response headers; sent at most once, before any message.
    Headers(Metadata),
    /// One response message.
    Message(T),
}

/// Inbound messages of a call.
///
/// Yields `Ok(None)` on half-close and `Err` when the transport could not
/// decode a frame.
pub struct RequestStream<T> {
    rx: mpsc::Receiver<Result<T, Status>>,
    call: Arc<Call>,
    chain: Arc<InterceptorChain>,
}

impl<T: Inbound> RequestStream<T> {
    /// A stream and the sender the transport feeds it from.
    #[must_use]
    pub fn channel(
        buffer: usize,
        call: Arc<Call>,
        chain: Arc<InterceptorChain>,
    ) -> (mpsc::Sender<Result<T, Status>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx, call, chain })
    }

    /// Next message, after interceptors ran on it.
    ///
    /// # Errors
    ///
    /// The decode error reported by the transport.
    pub async fn message(&mut self) -> Result<Option<T>, Status> {
        match self.rx.recv().await {
            None => Ok(None),
            Some(Err(status)) => Err(status),
            Some(Ok(mut message)) => {
                self.chain.on_request(&self.call, message.as_request_mut());
                Ok(Some(message))
            },
        }
    }

    /// The first message of a server-streaming call.
    ///
    /// # Errors
    ///
    /// [`Code::InvalidArgument`] when the client half-closes without sending one.
    pub async fn single(&mut self) -> Result<T, Status> {
        self.message()
            .await?
            .ok_or_else(|| Status::new(Code::InvalidArgument, "missing request message"))
    }
}

/// Outbound messages of a call.
pub struct ResponseSink<T> {
    tx: mpsc::Sender<Outgoing<T>>,
    headers: Option<Metadata>,
    call: Arc<Call>,
    chain: Arc<InterceptorChain>,
}

impl<T: Outbound> ResponseSink<T> {
    /// A sink holding `headers` until the first send, and the receiver the
    /// transport drains.
    #[must_use]
    pub fn channel(
        buffer: usize,
        call: Arc<Call>,
        chain: Arc<InterceptorChain>,
        headers: Metadata,
    ) -> (Self, mpsc::Receiver<Outgoing<T>>) {
        let (tx, rx) = mpsc::channel(buffer);
        let sink = Self {
            tx,
            headers: Some(headers),
            call,
            chain,
        };
        (sink, rx)
    }

    /// Pending headers; `None` once they have been sent.
    pub fn headers_mut(&mut self) -> Option<&mut Metadata> {
        self.headers.as_mut()
    }

    /// Send the headers now. Does nothing if already sent.
    ///
    /// # Errors
    ///
    /// [`Code::Cancelled`] when the transport has gone away.
    pub async fn send_headers(&mut self) -> Result<(), Status> {
        if let Some(headers) = self.headers.take() {
            self.push(Outgoing::Headers(headers)).await?;
        }
        Ok(())
    }

    /// Run interceptors on `message` and send it, preceded by the headers
    /// if they are still pending.
    ///
    /// # Errors
    ///
    /// [`Code::Cancelled`] when the transport has gone away.
    pub async fn send(&mut self, mut message: T) -> Result<(), Status> {
        self.send_headers().await?;
        self.chain.on_response(&self.call, message.as_response_mut());
        self.push(Outgoing::Message(message)).await?;
        RpcMetrics::record_message_sent(self.call.method.name());
        Ok(())
    }

    async fn push(&self, item: Outgoing<T>) -> Result<(), Status> {
        self.tx
            .send(item)
            .await
            .map_err(|_| Status::new(Code::Cancelled, "response stream closed"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::interceptor::ResponseTagInterceptor;
    use crate::messages::{ResiliencyRequest, ResiliencyResponse};
    use crate::rpc::Method;

    fn call() -> Arc<Call> {
        Arc::new(Call::new(Method::BidirectionalStreamResiliency))
    }

    #[tokio::test]
    async fn test_headers_precede_first_message_once() {
        let chain = Arc::new(InterceptorChain::new().with(ResponseTagInterceptor::new("#")));
        let headers: Metadata = [("k", "v")].into_iter().collect();
        let (mut sink, mut rx) = ResponseSink::channel(8, call(), chain, headers.clone());

        sink.send(ResiliencyResponse { message: "a".into() }).await.unwrap();
        sink.send(ResiliencyResponse { message: "b".into() }).await.unwrap();
        drop(sink);

        assert_eq!(rx.recv().await, Some(Outgoing::Headers(headers)));
        assert_eq!(
            rx.recv().await,
            Some(Outgoing::Message(ResiliencyResponse { message: "#a".into() }))
        );
        assert_eq!(
            rx.recv().await,
            Some(Outgoing::Message(ResiliencyResponse { message: "#b".into() }))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_closed_transport_is_cancelled() {
        let (mut sink, rx) =
            ResponseSink::<ResiliencyResponse>::channel(1, call(), Arc::default(), Metadata::new());
        drop(rx);

        let err = sink.send(ResiliencyResponse { message: "x".into() }).await.unwrap_err();

        assert_eq!(err.code, Code::Cancelled);
    }

    #[tokio::test]
    async fn test_request_stream_end_and_errors() {
        let (tx, mut requests) = RequestStream::<ResiliencyRequest>::channel(4, call(), Arc::default());
        tx.send(Err(Status::new(Code::InvalidArgument, "bad frame"))).await.unwrap();
        drop(tx);

        assert_eq!(requests.message().await.unwrap_err().code, Code::InvalidArgument);
        assert!(requests.message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_requires_a_message() {
        let (tx, mut requests) = RequestStream::<ResiliencyRequest>::channel(1, call(), Arc::default());
        drop(tx);

        assert_eq!(requests.single().await.unwrap_err().code, Code::InvalidArgument);
    }
}
