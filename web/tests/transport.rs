//! End-to-end tests of the axum transport: unary calls over HTTP and
//! streaming calls over a real WebSocket connection.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use ledger_rpc_core::{Clock, LedgerStorage};
use ledger_rpc_testing::fixtures::{seed_account, seed_rate};
use ledger_rpc_testing::{InMemoryLedgerStorage, init_test_tracing, test_clock};
use ledger_rpc_web::rpc::{CancelHandle, cancellation};
use ledger_rpc_web::{LedgerRpcService, RpcSettings, RpcState, router};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn seeded() -> (InMemoryLedgerStorage, LedgerRpcService) {
    init_test_tracing();
    let storage = InMemoryLedgerStorage::new();
    let clock = Arc::new(test_clock());
    let at = clock.now();
    seed_account(&storage, "A", "USD", dec!(100), at).await.unwrap();
    seed_account(&storage, "B", "USD", dec!(10), at).await.unwrap();
    seed_rate(
        &storage,
        "USD",
        "BRL",
        dec!(5.10),
        at - chrono::Duration::hours(1),
        at + chrono::Duration::hours(1),
    )
    .await
    .unwrap();

    let settings = RpcSettings {
        exchange_rate_interval: Duration::from_millis(20),
        ..RpcSettings::default()
    };
    let storage_port: Arc<dyn LedgerStorage> = Arc::new(storage.clone());
    let service = LedgerRpcService::new(storage_port, clock).with_settings(settings);
    (storage, service)
}

struct TestServer {
    addr: SocketAddr,
    storage: InMemoryLedgerStorage,
    shutdown: CancelHandle,
}

impl TestServer {
    async fn start() -> Self {
        let (storage, service) = seeded().await;
        let (shutdown, signal) = cancellation();
        let app = router(RpcState::new(service, signal));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Self {
            addr,
            storage,
            shutdown,
        }
    }

    async fn connect(&self, path: &str) -> Ws {
        let (ws, _) = connect_async(format!("ws://{}/rpc/{path}", self.addr)).await.unwrap();
        ws
    }
}

async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_frame(ws: &mut Ws) -> Option<Value> {
    loop {
        let message = timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("frame in time")?;
        match message {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {},
        }
    }
}

async fn remaining_frames(ws: &mut Ws) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = next_frame(ws).await {
        frames.push(frame);
    }
    frames
}

fn kinds(frames: &[Value]) -> Vec<&str> {
    frames.iter().map(|f| f["type"].as_str().unwrap()).collect()
}

async fn post(path: &str, body: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
    let (_, service) = seeded().await;
    let (_shutdown, signal) = cancellation();
    let response = router(RpcState::new(service, signal))
        .oneshot(
            Request::post(format!("/rpc/{path}"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    (status, headers, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_unary_balance_over_http() {
    let (status, headers, body) =
        post("bank.BankService/GetCurrentBalance", r#"{"account_number":"A"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["grpc-status"], "0");
    assert_eq!(headers["grpc-server-location"], "Uberlandia, Brazil");
    assert!(headers.contains_key("x-correlation-id"));
    assert_eq!(body["amount"], "100");
    assert_eq!(body["current_date"], "2025-01-01");
}

#[tokio::test]
async fn test_unary_not_found_carries_details() {
    let (status, headers, body) =
        post("bank.BankService/GetCurrentBalance", r#"{"account_number":"ZZ"}"#).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers["grpc-status"], "5");
    assert_eq!(body["code"], 5);
    assert_eq!(body["details"][0]["type"], "error_info");
    assert_eq!(body["details"][0]["reason"], "ACCOUNT_NOT_FOUND");
}

#[tokio::test]
async fn test_unary_rejects_bad_body_and_streaming_methods() {
    let (status, _, body) = post("bank.BankService/GetCurrentBalance", "{oops").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 3);

    let (status, _, body) = post("bank.BankService/TransferMultiple", "{}").await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["code"], 12);

    let (status, _, _) = post("resiliency.ResiliencyService/UnaryResiliency", r#"{"status_codes":[]}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let (_, service) = seeded().await;
    let (_shutdown, signal) = cancellation();
    let response = router(RpcState::new(service, signal))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_stream_until_client_cancel() {
    let server = TestServer::start().await;
    let mut ws = server.connect("bank.BankService/FetchExchangeRates").await;

    send(&mut ws, json!({"type": "message", "payload": {"from_currency": "USD", "to_currency": "BRL"}}))
        .await;

    assert_eq!(next_frame(&mut ws).await.unwrap()["type"], "headers");
    for _ in 0..2 {
        let frame = next_frame(&mut ws).await.unwrap();
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["payload"]["rate"], "5.10");
        assert_eq!(frame["payload"]["timestamp"], "2025-01-01T00:00:00Z");
    }

    send(&mut ws, json!({"type": "cancel"})).await;

    let rest = remaining_frames(&mut ws).await;
    assert!(kinds(&rest).iter().all(|kind| *kind == "message"));
}

#[tokio::test]
async fn test_transfers_pair_with_requests_then_trailer() {
    let server = TestServer::start().await;
    let mut ws = server.connect("bank.BankService/TransferMultiple").await;

    for amount in ["10", "15"] {
        send(
            &mut ws,
            json!({"type": "message", "payload": {
                "from_account_number": "A",
                "to_account_number": "B",
                "currency": "USD",
                "amount": amount,
            }}),
        )
        .await;
    }
    send(&mut ws, json!({"type": "end"})).await;

    let frames = remaining_frames(&mut ws).await;
    assert_eq!(kinds(&frames), ["headers", "message", "message", "status"]);
    assert_eq!(frames[1]["payload"]["amount"], "10");
    assert_eq!(frames[1]["payload"]["status"], "SUCCESS");
    assert_eq!(frames[2]["payload"]["amount"], "15");
    assert_eq!(frames[3]["code"], 0);

    assert_eq!(server.storage.account("A").unwrap().current_balance, dec!(75));
    assert_eq!(server.storage.account("B").unwrap().current_balance, dec!(35));
}

#[tokio::test]
async fn test_summary_client_stream() {
    let server = TestServer::start().await;
    let mut ws = server.connect("bank.BankService/SummarizeTransactions").await;

    for (kind, amount) in [("IN", "5"), ("OUT", "3")] {
        send(
            &mut ws,
            json!({"type": "message", "payload": {"account_number": "B", "type": kind, "amount": amount}}),
        )
        .await;
    }
    send(&mut ws, json!({"type": "end"})).await;

    let frames = remaining_frames(&mut ws).await;
    assert_eq!(kinds(&frames), ["headers", "message", "status"]);
    assert_eq!(frames[1]["payload"]["sum_in"], "5");
    assert_eq!(frames[1]["payload"]["sum_out"], "3");
    assert_eq!(frames[1]["payload"]["sum_total"], "2");
    assert_eq!(server.storage.account("B").unwrap().current_balance, dec!(12));
}

#[tokio::test]
async fn test_finished_session_sends_trailer_then_close() {
    let server = TestServer::start().await;
    let mut ws = server.connect("resiliency.ResiliencyService/ClientStreamResiliency").await;

    send(&mut ws, json!({"type": "message", "payload": {"status_codes": [0]}})).await;
    send(&mut ws, json!({"type": "end"})).await;

    let mut last_text = None;
    let closed = loop {
        match timeout(Duration::from_secs(10), ws.next()).await.expect("frame in time") {
            Some(Ok(Message::Text(text))) => last_text = Some(text),
            Some(Ok(Message::Close(_))) => break true,
            Some(Ok(_)) => {},
            Some(Err(_)) | None => break false,
        }
    };

    assert!(closed);
    let trailer: Value = serde_json::from_str(&last_text.unwrap()).unwrap();
    assert_eq!(trailer["type"], "status");
    assert_eq!(trailer["code"], 0);
}

#[tokio::test]
async fn test_undecodable_payload_ends_with_invalid_argument() {
    let server = TestServer::start().await;
    let mut ws = server.connect("resiliency.ResiliencyService/ClientStreamResiliency").await;

    send(&mut ws, json!({"type": "message", "payload": {"status_codes": "nope"}})).await;

    let frames = remaining_frames(&mut ws).await;
    assert_eq!(kinds(&frames), ["status"]);
    assert_eq!(frames[0]["code"], 3);
    assert_eq!(frames[0]["details"][0]["field_violations"][0]["field"], "payload");
}

#[tokio::test]
async fn test_server_shutdown_cancels_open_streams() {
    let server = TestServer::start().await;
    let mut ws = server.connect("bank.BankService/FetchExchangeRates").await;
    send(&mut ws, json!({"type": "message", "payload": {"from_currency": "USD", "to_currency": "BRL"}}))
        .await;
    assert_eq!(next_frame(&mut ws).await.unwrap()["type"], "headers");

    server.shutdown.cancel();

    let rest = remaining_frames(&mut ws).await;
    assert!(!kinds(&rest).contains(&"status"));
}

#[tokio::test]
async fn test_unary_method_refuses_upgrade() {
    let server = TestServer::start().await;

    let result =
        connect_async(format!("ws://{}/rpc/bank.BankService/GetCurrentBalance", server.addr)).await;

    assert!(result.is_err());
}
