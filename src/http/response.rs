//! Plain-text responses and the route handlers.
//!
//! Responses follow the classic "error-style" plain-text shape: the message
//! plus a trailing newline, `text/plain; charset=utf-8` and `nosniff`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::config::ServerConfig;
use crate::observability::metrics;

/// Route answering with the configured payload.
pub const HELLO_ROUTE: &str = "/hello";

/// Build a plain-text response with the given status. The message is sent
/// as-is, whatever its encoding.
pub fn plain_text(status: StatusCode, message: &[u8]) -> Response {
    let mut body = Vec::with_capacity(message.len() + 1);
    body.extend_from_slice(message);
    body.push(b'\n');

    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Serves the payload of the instance's own configuration.
pub async fn hello(State(config): State<Arc<ServerConfig>>) -> Response {
    metrics::record_request(HELLO_ROUTE, StatusCode::OK.as_u16());
    plain_text(StatusCode::OK, &config.payload)
}

/// Fallback for every other route.
pub async fn not_found() -> Response {
    metrics::record_request("fallback", StatusCode::NOT_FOUND.as_u16());
    plain_text(StatusCode::NOT_FOUND, b"404 page not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn plain_text_appends_newline_and_headers() {
        let response = plain_text(StatusCode::OK, b"v1");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[tokio::test]
    async fn hello_serves_payload() {
        let config = Arc::new(ServerConfig {
            bind_address: "127.0.0.1:0".into(),
            payload: Bytes::from_static(b"v1"),
        });
        let response = hello(State(config)).await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"v1\n");
    }

    #[tokio::test]
    async fn hello_serves_raw_bytes() {
        let config = Arc::new(ServerConfig {
            bind_address: "127.0.0.1:0".into(),
            payload: Bytes::from_static(b"v\xff1"),
        });
        let response = hello(State(config)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"v\xff1\n");
    }
}
