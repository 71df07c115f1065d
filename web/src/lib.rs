//! RPC surface of the ledger service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Transport (axum)                │  ← HTTP for unary calls
//! │  - handlers::unary / handlers::streaming│  ← WebSocket frames for streams
//! ├─────────────────────────────────────────┤
//! │         Adapter (LedgerRpcService)      │
//! │  - call shapes, cancellation            │  ← Interceptor chain
//! │  - error → wire status                  │  ← Response metadata
//! ├─────────────────────────────────────────┤
//! │         Runtime services                │  ← ledger, rates, transfers,
//! │                                         │    fault injection
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ledger_rpc_web::{LedgerRpcService, RpcState, router, rpc::cancellation};
//!
//! let (shutdown, signal) = cancellation();
//! let service = LedgerRpcService::new(storage, clock);
//! let app = router(RpcState::new(service, signal));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod adapter;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod interceptor;
pub mod messages;
pub mod middleware;
pub mod rpc;
pub mod service;
pub mod state;

pub use error::classify;
pub use interceptor::{Interceptor, InterceptorChain};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};
pub use rpc::{Call, Code, Metadata, Method, Status};
pub use service::{LedgerRpcService, RpcSettings};
pub use state::RpcState;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Routes for both services plus `/health`.
///
/// Unary methods are `POST /rpc/:service/:method`; streaming methods are a
/// WebSocket upgrade on `GET` of the same path.
pub fn router(state: RpcState) -> Router {
    Router::new()
        .route(
            "/rpc/:service/:method",
            post(handlers::unary::handle).get(handlers::streaming::handle),
        )
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
