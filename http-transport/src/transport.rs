//! The single-method transport capability and its reqwest-backed implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{Result, TransportError};
use crate::request::{Body, Request, Response};

/// Default timeout for short request/response exchanges
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can send a request and hand back a response.
///
/// Implementations must not retry, authenticate or interpret status codes;
/// those concerns are layered on top by wrapping one transport in another.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> Result<Response> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&self, request: Request) -> Result<Response> {
        (**self).send(request).await
    }
}

/// Transport backed by a real `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with the default 5 second timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a transport whose requests time out after `timeout` unless the
    /// request carries its own timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let timeout = request.timeout().unwrap_or(self.timeout);

        let response = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(TransportError::from)?;

        tracing::trace!(
            "Request to {} returns {}",
            request.url(),
            response.status()
        );

        let status = response.status();
        let headers = response.headers().clone();
        let body = Body::from_stream(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(TransportError::from)),
        );

        Ok(Response::new(status, headers, body))
    }
}
