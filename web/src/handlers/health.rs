//! Liveness endpoint for load balancers.

use axum::http::StatusCode;

/// `GET /health`: 200 while the process serves requests. Does not touch
/// storage.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, (StatusCode::OK, "ok"));
    }
}
