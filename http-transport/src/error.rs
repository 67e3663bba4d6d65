//! Error types for the HTTP transport layers

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while sending a request through a transport stack
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, TLS failure and similar
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The request did not complete within its timeout
    #[error("Request timed out")]
    Timeout,

    /// Reading the response body failed part way through
    #[error("Body read error: {0}")]
    Body(String),

    /// The request could not be built (bad URL, invalid header value, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The exchange did not have the shape the layer expects
    ///
    /// Raised by the digest layer when the unauthenticated request is not
    /// answered with `401 Unauthorized`.
    #[error("Unexpected status: expected {expected}, got {actual}")]
    UnexpectedStatus {
        /// Status the layer was waiting for
        expected: StatusCode,
        /// Status the server actually returned
        actual: StatusCode,
    },

    /// Every attempt completed but none returned a success status
    #[error("Exceeds retry count: {attempts} attempts, last status {last_status}")]
    RetryExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Status of the final attempt
        last_status: StatusCode,
    },
}

impl TransportError {
    /// Whether this error came from the network rather than from a response.
    pub fn is_transport_level(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_) | TransportError::Timeout | TransportError::Body(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Convenience type alias for transport results.
pub type Result<T> = std::result::Result<T, TransportError>;
