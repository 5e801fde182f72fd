use std::sync::Arc;
use thiserror::Error;

/// Errors produced by the remote API client.
///
/// `Clone` so one failure can be reported to several observers; the
/// underlying `reqwest::Error` is shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The server rejected the credentials (HTTP 401), after at most one
    /// reauthorization attempt
    #[error("Not authorized")]
    Unauthorized,
    /// The client is suspended; no request was sent
    #[error("Network access is suspended")]
    Suspended,
    /// No credentials are configured
    #[error("No credentials available")]
    MissingCredentials,
    /// The requested remote resource does not exist (HTTP 404)
    #[error("Remote resource not found: {0}")]
    NotFound(String),
    /// HTTP response with another non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body did not match the expected shape
    #[error("Unexpected response body: {0}")]
    Decode(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(Arc<reqwest::Error>),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(Arc::new(e))
        }
    }
}
