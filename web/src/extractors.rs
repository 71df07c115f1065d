//! Extractor turning an HTTP request into a [`Call`].
//!
//! ```ignore
//! async fn handler(RpcCall(call): RpcCall, body: Bytes) -> Response {
//!     tracing::info!(method = %call.method, "Processing call");
//!     ...
//! }
//! ```

use crate::middleware::CorrelationId;
use crate::rpc::{Call, Code, Metadata, Method, Status};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use uuid::Uuid;

/// The call addressed by `/rpc/:service/:method`, with request headers as
/// metadata and the correlation id set by the middleware.
#[derive(Debug, Clone)]
pub struct RpcCall(pub Call);

#[async_trait]
impl<S> FromRequestParts<S> for RpcCall
where
    S: Send + Sync,
{
    type Rejection = Status;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((service, name)) = Path::<(String, String)>::from_request_parts(parts, state)
            .await
            .map_err(|e| Status::new(Code::InvalidArgument, e.body_text()))?;

        let method = Method::resolve(&service, &name).ok_or_else(|| {
            Status::new(Code::Unimplemented, format!("unknown method /{service}/{name}"))
        })?;

        let mut call = Call::with_metadata(method, Metadata::from_headers(&parts.headers));
        call.correlation_id = parts
            .extensions
            .get::<CorrelationId>()
            .map_or_else(Uuid::new_v4, |id| id.0);

        Ok(Self(call))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::middleware::correlation_id_layer;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    async fn describe(RpcCall(call): RpcCall) -> String {
        format!(
            "{} {} {}",
            call.method,
            call.request_metadata.get("x-client").unwrap_or("-"),
            call.correlation_id
        )
    }

    fn app() -> Router {
        Router::new()
            .route("/rpc/:service/:method", get(describe))
            .layer(correlation_id_layer())
    }

    async fn body_of(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_method_metadata_and_correlation_id() {
        let id = Uuid::new_v4();
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/rpc/bank.BankService/GetCurrentBalance")
                    .header("x-client", "tests")
                    .header("x-correlation-id", id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            body_of(response).await,
            format!("/bank.BankService/GetCurrentBalance tests {id}")
        );
    }

    #[tokio::test]
    async fn test_unknown_method_is_unimplemented() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/rpc/bank.BankService/Nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::NOT_IMPLEMENTED);
        assert_eq!(response.headers()["grpc-status"], "12");
    }
}
