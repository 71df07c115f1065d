//! Streaming calls over WebSocket.
//!
//! # Frames
//!
//! **Client → Server:**
//! ```json
//! { "type": "message", "payload": { ... } }
//! { "type": "end" }
//! { "type": "cancel" }
//! ```
//!
//! **Server → Client:**
//! ```json
//! { "type": "headers", "metadata": { ... } }
//! { "type": "message", "payload": { ... } }
//! { "type": "status", "code": 0, "message": "", "details": [] }
//! ```
//!
//! `end` half-closes the request stream. `cancel`, a closed socket or server
//! shutdown cancel the call; a cancelled call sends no further frames. The
//! `status` frame is the trailer of every call that was not cancelled.

use crate::extractors::RpcCall;
use crate::messages::{Inbound, Outbound};
use crate::rpc::{
    Call, CancelHandle, CancelSignal, Code, Metadata, Method, Outgoing, RequestStream,
    ResponseSink, Status, cancellation,
};
use crate::service::LedgerRpcService;
use crate::state::RpcState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Frame sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// One request message
    Message {
        /// The request, decoded per method
        payload: serde_json::Value,
    },
    /// No more request messages
    End,
    /// Stop the call
    Cancel,
}

/// Frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame<T> {
    /// Response headers, before any message
    Headers {
        /// Header pairs
        metadata: Metadata,
    },
    /// One response message
    Message {
        /// The response
        payload: T,
    },
    /// Trailer: final status of the call
    Status(Status),
}

impl<T> From<Outgoing<T>> for ServerFrame<T> {
    fn from(item: Outgoing<T>) -> Self {
        match item {
            Outgoing::Headers(metadata) => Self::Headers { metadata },
            Outgoing::Message(payload) => Self::Message { payload },
        }
    }
}

/// Upgrade a streaming call.
///
/// # Errors
///
/// `UNIMPLEMENTED` for unary methods, which are served over `POST`.
#[allow(clippy::unused_async)]
pub async fn handle(
    State(state): State<RpcState>,
    RpcCall(call): RpcCall,
    ws: WebSocketUpgrade,
) -> Result<Response, Status> {
    let method = call.method;
    if !method.shape().is_streaming() {
        return Err(Status::new(
            Code::Unimplemented,
            format!("{method} is a unary call; POST the request instead"),
        ));
    }
    info!(%method, "Streaming call requested");
    Ok(ws.on_upgrade(move |socket| dispatch(socket, state, call)))
}

async fn dispatch(socket: WebSocket, state: RpcState, call: Call) {
    use crate::messages::{
        ExchangeRateRequest, ExchangeRateResponse, ResiliencyRequest, ResiliencyResponse,
        TransactionRequest, TransactionSummaryResponse, TransferRequest, TransferResponse,
    };

    match call.method {
        Method::FetchExchangeRates => {
            session::<ExchangeRateRequest, ExchangeRateResponse, _, _>(
                socket,
                state,
                call,
                |service, requests, sink, cancel| async move {
                    service.fetch_exchange_rates(requests, sink, cancel).await
                },
            )
            .await;
        },
        Method::SummarizeTransactions => {
            session::<TransactionRequest, TransactionSummaryResponse, _, _>(
                socket,
                state,
                call,
                |service, requests, sink, _cancel| async move {
                    service.summarize_transactions(requests, sink).await
                },
            )
            .await;
        },
        Method::TransferMultiple => {
            session::<TransferRequest, TransferResponse, _, _>(
                socket,
                state,
                call,
                |service, requests, sink, cancel| async move {
                    service.transfer_multiple(requests, sink, cancel).await
                },
            )
            .await;
        },
        Method::ServerStreamResiliency => {
            session::<ResiliencyRequest, ResiliencyResponse, _, _>(
                socket,
                state,
                call,
                |service, requests, sink, cancel| async move {
                    service.server_stream_resiliency(requests, sink, cancel).await
                },
            )
            .await;
        },
        Method::ClientStreamResiliency => {
            session::<ResiliencyRequest, ResiliencyResponse, _, _>(
                socket,
                state,
                call,
                |service, requests, sink, _cancel| async move {
                    service.client_stream_resiliency(requests, sink).await
                },
            )
            .await;
        },
        Method::BidirectionalStreamResiliency => {
            session::<ResiliencyRequest, ResiliencyResponse, _, _>(
                socket,
                state,
                call,
                |service, requests, sink, cancel| async move {
                    service.bidirectional_stream_resiliency(requests, sink, cancel).await
                },
            )
            .await;
        },
        Method::GetCurrentBalance | Method::UnaryResiliency => {
            warn!(method = %call.method, "Unary method reached the streaming transport");
        },
    }
}

/// Run one streaming call on `socket`.
///
/// A reader task turns client frames into request messages and cancellation;
/// the handler runs on its own task; this task forwards its output as frames
/// and finishes with the trailer.
async fn session<Req, Res, F, Fut>(socket: WebSocket, state: RpcState, call: Call, handler: F)
where
    Req: Inbound + DeserializeOwned,
    Res: Outbound,
    F: FnOnce(Arc<LedgerRpcService>, RequestStream<Req>, ResponseSink<Res>, CancelSignal) -> Fut,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    let started = Instant::now();
    let service = Arc::clone(&state.service);
    let call = Arc::new(call);
    let buffer = service.settings().stream_buffer;

    let headers = service.open_call(&call);
    let (in_tx, requests) =
        RequestStream::channel(buffer, Arc::clone(&call), Arc::clone(service.chain()));
    let (sink, mut out_rx) =
        ResponseSink::channel(buffer, Arc::clone(&call), Arc::clone(service.chain()), headers);
    let (handle, cancel) = cancellation();

    let (mut sender, receiver) = socket.split();
    let reader = tokio::spawn(read_frames(receiver, in_tx, handle, state.shutdown.clone()));
    let mut work = tokio::spawn(handler(Arc::clone(&service), requests, sink, cancel.clone()));

    let mut watch = cancel;
    let finished = loop {
        tokio::select! {
            biased;
            () = watch.cancelled() => break false,
            item = out_rx.recv() => {
                // The sink is dropped once the handler returns.
                let Some(item) = item else { break true };
                if let Err(e) = send_frame(&mut sender, &ServerFrame::from(item)).await {
                    warn!(error = %e, "WebSocket send failed");
                    break false;
                }
                debug!(method = %call.method, "Frame sent");
            },
        }
    };
    reader.abort();

    let result = if finished {
        match (&mut work).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Streaming handler failed");
                Err(Status::new(Code::Internal, "An internal error occurred"))
            },
        }
    } else {
        work.abort();
        info!(method = %call.method, "Streaming call cancelled");
        Ok(())
    };
    service.finish_call(&call, started, result.as_ref().map(|_| ()));

    if finished {
        let trailer = ServerFrame::<()>::Status(result.err().unwrap_or_else(Status::ok));
        if let Err(e) = send_frame(&mut sender, &trailer).await {
            debug!(error = %e, "Trailer not delivered");
        }
    }
    if let Err(e) = sender.send(Message::Close(None)).await {
        debug!(error = %e, "Close frame not delivered");
    }
}

/// Feed client frames into the request stream until the call is cancelled
/// or the client goes away, then fire `handle`.
async fn read_frames<Req>(
    mut receiver: SplitStream<WebSocket>,
    in_tx: mpsc::Sender<Result<Req, Status>>,
    handle: CancelHandle,
    mut shutdown: CancelSignal,
) where
    Req: Inbound + DeserializeOwned,
{
    let mut in_tx = Some(in_tx);
    loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                info!("Server shutting down, cancelling call");
                break;
            },
            frame = receiver.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                debug!("Client closed the stream");
                break;
            },
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket receive failed");
                break;
            },
        };

        let inbound = match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Cancel) => {
                info!("Client cancelled call");
                break;
            },
            Ok(ClientFrame::End) => {
                in_tx = None;
                continue;
            },
            Ok(ClientFrame::Message { payload }) => serde_json::from_value::<Req>(payload)
                .map_err(|e| Status::invalid_field("payload", e.to_string())),
            Err(e) => Err(Status::new(Code::InvalidArgument, format!("malformed frame: {e}"))),
        };

        match &in_tx {
            Some(tx) => {
                if tx.send(inbound).await.is_err() {
                    in_tx = None;
                }
            },
            None => warn!("Frame after half-close ignored"),
        }
    }
    handle.cancel();
}

async fn send_frame<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame<T>,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(Message::Text(json)).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::messages::ResiliencyResponse;

    #[test]
    fn test_client_frames() {
        assert_eq!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"message","payload":{"x":1}}"#).unwrap(),
            ClientFrame::Message {
                payload: serde_json::json!({"x": 1})
            }
        );
        assert_eq!(serde_json::from_str::<ClientFrame>(r#"{"type":"end"}"#).unwrap(), ClientFrame::End);
        assert_eq!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"cancel"}"#).unwrap(),
            ClientFrame::Cancel
        );
    }

    #[test]
    fn test_server_frames() {
        let headers: Metadata = [("k", "v")].into_iter().collect();
        let json = serde_json::to_value(ServerFrame::<ResiliencyResponse>::from(Outgoing::Headers(headers))).unwrap();
        assert_eq!(json, serde_json::json!({"type": "headers", "metadata": {"k": "v"}}));

        let json = serde_json::to_value(ServerFrame::from(Outgoing::Message(ResiliencyResponse {
            message: "m".into(),
        })))
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "message", "payload": {"message": "m"}}));

        let json = serde_json::to_value(ServerFrame::<()>::Status(Status::ok())).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["code"], 0);
    }
}
