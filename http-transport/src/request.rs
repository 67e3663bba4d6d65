//! Request, response and streaming body types shared by every transport layer.
//!
//! These are deliberately small: the layers only look at the method, URL,
//! headers, status code and body, so that is all they carry.

use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};

use crate::error::{Result, TransportError};

/// An outgoing HTTP request.
///
/// Requests are cheap to clone so decorators such as [`crate::Retry`] can
/// re-issue the same request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl Request {
    /// Create a request for an already parsed URL
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            timeout: None,
        }
    }

    /// Create a `GET` request, parsing `url`
    pub fn get(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| TransportError::InvalidRequest(format!("{url}: {e}")))?;
        Ok(Self::new(Method::GET, url))
    }

    /// Set a per-request timeout, overriding the transport default
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a header, replacing any existing value
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<()> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Path plus query string, as sent on the request line
    pub fn request_uri(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

/// A response body that may still be arriving from the network.
pub struct Body {
    inner: BoxStream<'static, Result<Bytes>>,
}

impl Body {
    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self::from_stream(stream::once(futures::future::ready(Ok(bytes))))
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// Collect the whole body into memory
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read the body and discard it, releasing the underlying connection
    pub async fn drain(mut self) {
        while let Some(chunk) = self.inner.next().await {
            if chunk.is_err() {
                break;
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes>> {
        self.inner
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Body { .. }")
    }
}

/// A response as returned by a [`crate::Transport`].
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header as a string, if present and valid UTF-8
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Split into status, headers and body
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Body) {
        (self.status, self.headers, self.body)
    }

    /// Read the body as UTF-8 text
    pub async fn text(self) -> Result<String> {
        let bytes = self.body.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| TransportError::Body(e.to_string()))
    }

    pub async fn drain(self) {
        self.body.drain().await
    }
}
