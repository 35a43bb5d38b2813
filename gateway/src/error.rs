// gateway/src/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Failures surfaced to clients as gateway-originated responses.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("upstream is unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("upstream did not respond in time")]
    UpstreamTimeout,
    #[error("cannot proxy to upstream URL `{0}`")]
    InvalidUpstreamUrl(String),
    #[error("websocket bridge failed: {0}")]
    WebSocket(String),
}

impl From<awc::error::SendRequestError> for GatewayError {
    fn from(e: awc::error::SendRequestError) -> Self {
        match e {
            awc::error::SendRequestError::Timeout => GatewayError::UpstreamTimeout,
            other => GatewayError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = match self {
            GatewayError::UpstreamUnavailable(_) => "upstream_unavailable",
            GatewayError::UpstreamTimeout => "upstream_timeout",
            GatewayError::InvalidUpstreamUrl(_) => "invalid_upstream_url",
            GatewayError::WebSocket(_) => "websocket_failed",
        };
        HttpResponse::build(self.status_code()).json(json!({
            "error": code,
            "message": self.to_string(),
        }))
    }
}
