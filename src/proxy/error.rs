//! Proxy Error Types
//!
//! Errors raised while forwarding a request to the backend, and their
//! conversion to gateway-style HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Proxy error types
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Backend refused the connection or could not be resolved
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    /// Backend did not answer in time
    #[error("Upstream timed out: {0}")]
    Timeout(String),

    /// Request body exceeds the configured limit
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Request body could not be read from the client
    #[error("Failed to read request body: {0}")]
    Body(String),

    /// Target URL cannot be used for this request
    #[error("Invalid upstream target: {0}")]
    InvalidTarget(String),

    /// Any other failure talking to the backend
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::Timeout(e.to_string())
        } else if e.is_connect() {
            ProxyError::Unreachable(e.to_string())
        } else {
            ProxyError::Upstream(e.to_string())
        }
    }
}

impl From<tungstenite::Error> for ProxyError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Io(io) => ProxyError::Unreachable(io.to_string()),
            tungstenite::Error::Url(url) => ProxyError::InvalidTarget(url.to_string()),
            tungstenite::Error::Http(response) => ProxyError::Upstream(format!(
                "WebSocket handshake rejected with {}",
                response.status()
            )),
            other => ProxyError::Upstream(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ProxyError {
    /// HTTP status and machine-readable code for this error
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ProxyError::Unreachable(_) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY"),
            ProxyError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT"),
            ProxyError::BodyTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ProxyError::Body(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ProxyError::InvalidTarget(_) => (StatusCode::BAD_GATEWAY, "INVALID_TARGET"),
            ProxyError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let request_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            request_id = %request_id,
            error_code = %code,
            error_message = %self,
            "Proxy error occurred"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::Unreachable("refused".into()).status().0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::Timeout("30s".into()).status().0,
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::BodyTooLarge { limit: 10 }.status().0,
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(ProxyError::Body("reset".into()).status().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_into_response_status() {
        let response = ProxyError::Unreachable("connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
