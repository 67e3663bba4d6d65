//! Private HTTP transport stack for Amcrest device communication
//!
//! Every layer implements the same single-method [`Transport`] trait, so the
//! layers compose as decorators and their order is a construction-time
//! choice:
//!
//! - [`HttpTransport`]: the real network, backed by `reqwest`
//! - [`DigestAuth`]: answers `401` digest challenges transparently
//! - [`Retry`]: re-issues requests on failure or unexpected status
//!
//! ```rust,no_run
//! use http_transport::{DigestAuth, HttpTransport, Request, Retry, RetryPolicy, Transport};
//!
//! # async fn run() -> http_transport::Result<()> {
//! let transport = Retry::new(
//!     DigestAuth::new(HttpTransport::new(), "admin", "password"),
//!     RetryPolicy::default(),
//! );
//! let request = Request::get("http://192.168.1.108/cgi-bin/magicBox.cgi?action=getSerialNo")?;
//! let serial = transport.send(request).await?.text().await?;
//! # Ok(())
//! # }
//! ```

mod digest;
mod error;
mod request;
mod retry;
mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use digest::{
    compute_ha1, compute_ha2, compute_response, md5_hex, Authorization, DigestAuth,
    DigestChallenge,
};
pub use error::{Result, TransportError};
pub use request::{Body, Request, Response};
pub use retry::{Retry, RetryPolicy};
pub use transport::{HttpTransport, Transport, DEFAULT_TIMEOUT};

pub use reqwest::{header, Method, StatusCode, Url};
