//! In-process transport for exercising the layers without a network.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `test-support` feature.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;

use crate::error::Result;
use crate::request::{Body, Request, Response};
use crate::transport::Transport;

type Handler = dyn Fn(&Request) -> Result<Response> + Send + Sync;

/// A transport that answers every request with a caller-supplied closure and
/// records what it was sent.
pub struct MockTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        (self.handler)(&request)
    }
}

/// Build a response with a fixed body
pub fn response(status: StatusCode, body: impl Into<Bytes>) -> Response {
    Response::new(status, HeaderMap::new(), Body::from_bytes(body))
}

/// Build a response carrying a single header
pub fn response_with_header(
    status: StatusCode,
    name: &'static str,
    value: &str,
    body: impl Into<Bytes>,
) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
    Response::new(status, headers, Body::from_bytes(body))
}
