use amcrest_stream::StreamError;
use http_transport::{StatusCode, TransportError};
use thiserror::Error;

/// High-level API errors for Amcrest operations
///
/// This enum wraps the lower transport and stream layers and adds the
/// failures that only make sense at the device level, such as talking to the
/// wrong kind of device.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport stack error
    ///
    /// Network failures, timeouts, rejected digest exchanges and exhausted
    /// retries all surface here.
    #[error("Network error: {0}")]
    NetworkError(#[from] TransportError),

    /// Event stream error
    ///
    /// The event stream could not be opened or its configuration is invalid.
    #[error("Stream error: {0}")]
    StreamError(#[from] StreamError),

    /// The device answered with a non-success HTTP status
    #[error("HTTP error {0}")]
    HttpStatus(StatusCode),

    /// Response parsing error
    ///
    /// The device returned a response whose content could not be interpreted,
    /// such as a missing or non-numeric storage figure.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The device is not the model this client expects
    #[error("Unexpected device type: expected {expected}, got {actual}")]
    UnexpectedDevice { expected: String, actual: String },

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;
