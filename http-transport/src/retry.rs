//! Bounded retry decorator.
//!
//! [`Retry`] re-issues a request until it completes with one of the
//! configured success codes or the attempt budget is spent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{Result, TransportError};
use crate::request::{Request, Response};
use crate::transport::Transport;

/// Immutable retry configuration, applied per outer request.
///
/// # Example
///
/// ```rust
/// use http_transport::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_max_attempts(3)
///     .with_delay(Duration::from_millis(250));
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    /// Default: 5
    pub max_attempts: u32,

    /// Status codes that end the loop successfully
    /// Default: [200]
    pub success_codes: Vec<StatusCode>,

    /// Pause between attempts
    /// Default: 500 milliseconds
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            success_codes: vec![StatusCode::OK],
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_success_codes(mut self, codes: Vec<StatusCode>) -> Self {
        self.success_codes = codes;
        self
    }

    pub fn is_success(&self, status: StatusCode) -> bool {
        self.success_codes.contains(&status)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TransportError::InvalidRequest(
                "Retry policy needs at least one attempt".to_string(),
            ));
        }
        if self.success_codes.is_empty() {
            return Err(TransportError::InvalidRequest(
                "Retry policy needs at least one success code".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transport decorator that retries failed or unsuccessful requests.
#[derive(Debug)]
pub struct Retry<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> Retry<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Retry up to `attempts` times with the default delay and success codes
    pub fn with_attempts(inner: T, attempts: u32) -> Self {
        Self::new(inner, RetryPolicy::default().with_max_attempts(attempts))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for Retry<T> {
    async fn send(&self, request: Request) -> Result<Response> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match self.inner.send(request.clone()).await {
                Ok(response) if self.policy.is_success(response.status()) => {
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    // Dropped unread: the body may be a stream that never ends
                    drop(response);
                    tracing::debug!(
                        "{} {} returned {} (attempt {}/{})",
                        request.method(),
                        request.url(),
                        status,
                        attempt,
                        max_attempts
                    );
                    TransportError::RetryExhausted {
                        attempts: attempt,
                        last_status: status,
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        "{} {} failed: {} (attempt {}/{})",
                        request.method(),
                        request.url(),
                        e,
                        attempt,
                        max_attempts
                    );
                    e
                }
            };

            if attempt >= max_attempts {
                return Err(failure);
            }

            if !self.policy.delay.is_zero() {
                tokio::time::sleep(self.policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Body;
    use crate::testing::{response, MockTransport};
    use reqwest::header::HeaderMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(attempts)
            .with_delay(Duration::ZERO)
    }

    fn request() -> Request {
        Request::get("http://10.0.0.5/cgi-bin/magicBox.cgi?action=getDeviceType").unwrap()
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.success_codes, vec![StatusCode::OK]);
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert!(policy.validate().is_ok());
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().with_max_attempts(0).validate().is_err());
        assert!(RetryPolicy::default()
            .with_success_codes(Vec::new())
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_wrong_status_exhausts_after_exact_attempts() {
        let transport = MockTransport::new(|_| Ok(response(StatusCode::SERVICE_UNAVAILABLE, "busy")));
        let retry = Retry::new(transport, fast_policy(3));

        let err = retry.send(request()).await.unwrap_err();
        match err {
            TransportError::RetryExhausted {
                attempts,
                last_status,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_status, StatusCode::SERVICE_UNAVAILABLE);
            }
            other => panic!("Expected RetryExhausted, got {other:?}"),
        }
        assert_eq!(retry.inner().request_count(), 3);
    }

    #[tokio::test]
    async fn test_transport_error_on_last_attempt_is_returned() {
        let transport = MockTransport::new(|_| Err(TransportError::Network("refused".into())));
        let retry = Retry::new(transport, fast_policy(4));

        let err = retry.send(request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(ref msg) if msg == "refused"));
        assert_eq!(retry.inner().request_count(), 4);
    }

    #[tokio::test]
    async fn test_last_outcome_decides_error_kind() {
        // Status failures first, then a timeout on the final attempt
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let transport = MockTransport::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(response(StatusCode::INTERNAL_SERVER_ERROR, ""))
            } else {
                Err(TransportError::Timeout)
            }
        });
        let retry = Retry::new(transport, fast_policy(3));

        assert!(matches!(
            retry.send(request()).await.unwrap_err(),
            TransportError::Timeout
        ));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let transport = MockTransport::new(move |_| match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(TransportError::Timeout),
            1 => Ok(response(StatusCode::BAD_GATEWAY, "")),
            _ => Ok(response(StatusCode::OK, "type=AD410")),
        });
        let retry = Retry::new(transport, fast_policy(5));

        let response = retry.send(request()).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "type=AD410");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_custom_success_codes() {
        let transport = MockTransport::new(|_| Ok(response(StatusCode::NO_CONTENT, "")));
        let retry = Retry::new(
            transport,
            fast_policy(2).with_success_codes(vec![StatusCode::OK, StatusCode::NO_CONTENT]),
        );

        let response = retry.send(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(retry.inner().request_count(), 1);
    }

    #[tokio::test]
    async fn test_wrong_status_with_endless_body_does_not_block() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let transport = MockTransport::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Response::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    HeaderMap::new(),
                    Body::from_stream(futures::stream::pending()),
                ))
            } else {
                Ok(response(StatusCode::OK, "ok"))
            }
        });
        let retry = Retry::new(transport, fast_policy(2));

        let response = tokio::time::timeout(Duration::from_secs(5), retry.send(request()))
            .await
            .expect("retry blocked on the first response body")
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delay_between_attempts() {
        let transport = MockTransport::new(|_| Err(TransportError::Timeout));
        let retry = Retry::new(
            transport,
            RetryPolicy::default()
                .with_max_attempts(3)
                .with_delay(Duration::from_millis(20)),
        );

        let started = std::time::Instant::now();
        let _ = retry.send(request()).await;
        // Two pauses for three attempts
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
