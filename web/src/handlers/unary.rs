//! Unary calls over plain HTTP.
//!
//! `POST /rpc/:service/:method` with the JSON request as body. The reply is
//! the JSON response message; response metadata travels as headers next to
//! `grpc-status: 0`. Failures are a JSON [`Status`] with the matching HTTP
//! status.

use crate::error::GRPC_STATUS_HEADER;
use crate::extractors::RpcCall;
use crate::rpc::{Code, Method, Reply, Status};
use crate::state::RpcState;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

/// Dispatch a unary call.
///
/// # Errors
///
/// `UNIMPLEMENTED` for streaming methods, `INVALID_ARGUMENT` for a body that
/// does not decode, otherwise whatever the method returns.
pub async fn handle(
    State(state): State<RpcState>,
    RpcCall(call): RpcCall,
    body: Bytes,
) -> Result<Response, Status> {
    let service = &state.service;
    match call.method {
        Method::GetCurrentBalance => {
            Ok(reply(service.get_current_balance(&call, decode(&body)?).await?))
        },
        Method::UnaryResiliency => Ok(reply(service.unary_resiliency(&call, decode(&body)?).await?)),
        method => Err(Status::new(
            Code::Unimplemented,
            format!("{method} is a {} call; open it as a WebSocket", method.shape().as_str()),
        )),
    }
}

/// Request message from a JSON body; an empty body is an empty object.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, Status> {
    let body = if body.is_empty() { b"{}".as_slice() } else { body };
    serde_json::from_slice(body)
        .map_err(|e| Status::new(Code::InvalidArgument, format!("invalid request body: {e}")))
}

fn reply<T: Serialize>(reply: Reply<T>) -> Response {
    let mut response = Json(reply.message).into_response();
    let headers = response.headers_mut();
    reply.metadata.write_headers(headers);
    headers.insert(GRPC_STATUS_HEADER, HeaderValue::from(Code::Ok.as_u32()));
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::messages::CurrentBalanceRequest;

    #[test]
    fn test_decode_empty_body_and_garbage() {
        let err = decode::<CurrentBalanceRequest>(b"").unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);

        let err = decode::<CurrentBalanceRequest>(b"{not json").unwrap_err();
        assert!(err.message.starts_with("invalid request body"));

        let ok = decode::<CurrentBalanceRequest>(br#"{"account_number":"A"}"#).unwrap();
        assert_eq!(ok.account_number, "A");
    }
}
