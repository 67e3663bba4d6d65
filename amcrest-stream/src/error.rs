//! Error types for the amcrest-stream crate.

use http_transport::{StatusCode, TransportError};

/// Errors that prevent an event stream from being opened or configured.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The request to open the stream failed in the transport stack
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device answered the stream request with a non-success status
    #[error("Unexpected status opening event stream: {0}")]
    UnexpectedStatus(StatusCode),

    /// The response carried no usable multipart boundary
    #[error("Missing multipart boundary in content type: {0:?}")]
    MissingBoundary(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A background task could not be joined
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Problems with a single multipart segment.
///
/// These are logged and the segment is skipped; they never end the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// The segment had no `Content-Length` header
    #[error("Segment is missing a content-length header")]
    MissingLength,

    /// The `Content-Length` header was not a number
    #[error("Invalid content-length {0:?}")]
    InvalidLength(String),

    /// Fewer payload bytes arrived than the segment declared
    #[error("Short segment: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Declared length
        expected: usize,
        /// Bytes received before the next boundary or end of stream
        actual: usize,
    },
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_display() {
        let error = StreamError::UnexpectedStatus(StatusCode::UNAUTHORIZED);
        assert_eq!(
            error.to_string(),
            "Unexpected status opening event stream: 401 Unauthorized"
        );

        let error = StreamError::MissingBoundary("text/plain".to_string());
        assert_eq!(
            error.to_string(),
            "Missing multipart boundary in content type: \"text/plain\""
        );

        let error = StreamError::Configuration("event buffer size must be greater than 0".into());
        assert!(error.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_framing_error_display() {
        assert_eq!(
            FramingError::ShortRead {
                expected: 39,
                actual: 12
            }
            .to_string(),
            "Short segment: expected 39 bytes, got 12"
        );
        assert_eq!(
            FramingError::InvalidLength("abc".into()).to_string(),
            "Invalid content-length \"abc\""
        );
    }

    #[test]
    fn test_error_conversion_from_transport_error() {
        let error: StreamError = TransportError::Timeout.into();
        match error {
            StreamError::Transport(TransportError::Timeout) => {}
            other => panic!("Expected Transport variant, got {other:?}"),
        }
    }
}
