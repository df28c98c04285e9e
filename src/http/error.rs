//! Error taxonomy for the forwarding engine.
//!
//! Every failure maps to exactly one status code and a short JSON body
//! `{"detail": "..."}`. Errors only exist before the response head is sent;
//! once a body is streaming, failures end the stream instead.

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::upstream::{DispatchError, PoolError};

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Method outside GET/POST/PUT/DELETE.
    #[error("Method {0} not allowed")]
    MethodNotAllowed(Method),

    /// POST body with a content type the engine does not forward.
    #[error("Unsupported Content-Type for POST request: {0}")]
    UnsupportedContentType(String),

    /// Inbound body could not be parsed for its declared content type.
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// Inbound body exceeded the configured limit.
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Target host is not in the allowlist.
    #[error("Target host '{0}' is not allowed")]
    HostNotAllowed(String),

    /// Could not connect to the target.
    #[error("Unable to connect to target server")]
    UpstreamUnavailable,

    /// Target did not answer in time.
    #[error("Request timed out")]
    UpstreamTimeout,

    /// No free outbound slot within the pool timeout.
    #[error("Connection pool exhausted")]
    PoolTimeout,

    /// Any other outbound transport failure.
    #[error("Request failed: {0}")]
    UpstreamProtocol(String),

    /// The outbound pool has not been created yet.
    #[error("HTTP client not initialized")]
    NotReady,

    /// Unexpected failure inside the proxy.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::UnsupportedContentType(_) | ProxyError::MalformedBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::HostNotAllowed(_) => StatusCode::FORBIDDEN,
            ProxyError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout | ProxyError::PoolTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamProtocol(_) | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Client input errors are the caller's fault and never logged as errors.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl From<DispatchError> for ProxyError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Pool(PoolError::Exhausted(_)) => ProxyError::PoolTimeout,
            DispatchError::Pool(PoolError::NotInitialized) => ProxyError::NotReady,
            DispatchError::Pool(other) => ProxyError::Internal(other.to_string()),
            DispatchError::Deadline(_) => ProxyError::UpstreamTimeout,
            DispatchError::Transport(e) => e.into(),
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        // A connect timeout is reported as both; timeouts win.
        if err.is_timeout() {
            ProxyError::UpstreamTimeout
        } else if err.is_connect() {
            ProxyError::UpstreamUnavailable
        } else {
            ProxyError::UpstreamProtocol(error_chain(&err))
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// Render an error with its sources, e.g. `builder error: relative URL without a base`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
