//! Retry interceptor.
//!
//! The interceptor asks its [`RetryPolicy`] after every attempt whether to go
//! again and how long to wait first. The default policy, [`NeverRetry`],
//! makes it a plain passthrough. Only requests whose body is buffered can be
//! replayed; anything else gets exactly one attempt whatever the policy says.

use crate::client::{exponential_backoff, is_retryable_status};
use crate::error::TransportError;
use crate::transport::{try_clone_request, HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use http::Method;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether an attempt is retried.
pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt, or `None` to return `outcome`.
    ///
    /// `attempt` counts from 0 for the first try.
    fn retry_after(
        &self,
        method: &Method,
        attempt: u32,
        outcome: &Result<HttpResponse, TransportError>,
    ) -> Option<Duration>;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn retry_after(
        &self,
        _method: &Method,
        _attempt: u32,
        _outcome: &Result<HttpResponse, TransportError>,
    ) -> Option<Duration> {
        None
    }
}

/// Backoff settings for [`IdempotentBackoff`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each one.
    pub base_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
        }
    }
}

/// Retries idempotent requests on transport failures and retryable statuses.
#[derive(Debug, Clone, Default)]
pub struct IdempotentBackoff {
    config: BackoffConfig,
}

impl IdempotentBackoff {
    /// Policy with the given settings.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }
}

impl RetryPolicy for IdempotentBackoff {
    fn retry_after(
        &self,
        method: &Method,
        attempt: u32,
        outcome: &Result<HttpResponse, TransportError>,
    ) -> Option<Duration> {
        if attempt >= self.config.max_retries || !method.is_idempotent() {
            return None;
        }
        let retryable = match outcome {
            Ok(response) => is_retryable_status(response.status().as_u16()),
            Err(_) => true,
        };
        retryable.then(|| exponential_backoff(attempt, self.config.base_delay_ms))
    }
}

/// Replays requests as its policy decides.
pub struct RetryInterceptor {
    next: Arc<dyn Transport>,
    policy: Arc<dyn RetryPolicy>,
}

impl RetryInterceptor {
    /// Wrap `next` without retrying.
    pub fn new(next: Arc<dyn Transport>) -> Self {
        Self::with_policy(next, Arc::new(NeverRetry))
    }

    /// Wrap `next` with a retry policy.
    pub fn with_policy(next: Arc<dyn Transport>, policy: Arc<dyn RetryPolicy>) -> Self {
        Self { next, policy }
    }
}

#[async_trait]
impl Transport for RetryInterceptor {
    async fn round_trip(&self, mut request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut attempt = 0;
        loop {
            let method = request.method().clone();
            let replay = try_clone_request(&request);
            let outcome = self.next.round_trip(request).await;

            let Some(replay) = replay else {
                return outcome;
            };
            let Some(delay) = self.policy.retry_after(&method, attempt, &outcome) else {
                return outcome;
            };

            match &outcome {
                Ok(response) => tracing::warn!(
                    attempt = attempt + 1,
                    status = response.status().as_u16(),
                    delay = ?delay,
                    "retrying request"
                ),
                Err(err) => tracing::warn!(
                    attempt = attempt + 1,
                    error = %err,
                    delay = ?delay,
                    "retrying request"
                ),
            }
            drop(outcome);
            tokio::time::sleep(delay).await;
            request = replay;
            attempt += 1;
        }
    }
}

impl fmt::Debug for RetryInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryInterceptor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::transport::{MockResponse, MockTransport};
    use bytes::Bytes;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(method: &str, body: Body) -> HttpRequest {
        http::Request::builder()
            .method(method)
            .uri("http://localhost/items")
            .body(body)
            .unwrap()
    }

    fn flaky(failures: usize) -> Arc<MockTransport> {
        let seen = AtomicUsize::new(0);
        Arc::new(MockTransport::new(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) < failures {
                Ok(MockResponse::new(503, "busy"))
            } else {
                Ok(MockResponse::new(200, "ok"))
            }
        }))
    }

    fn backoff(max_retries: u32) -> Arc<dyn RetryPolicy> {
        Arc::new(IdempotentBackoff::new(BackoffConfig {
            max_retries,
            base_delay_ms: 1,
        }))
    }

    #[tokio::test]
    async fn test_default_is_passthrough() {
        let mock = flaky(1);
        let retry = RetryInterceptor::new(mock.clone());
        let response = retry.round_trip(request("GET", Body::empty())).await.unwrap();
        assert_eq!(response.status(), 503);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_backoff_retries_until_success() {
        let mock = flaky(2);
        let retry = RetryInterceptor::with_policy(mock.clone(), backoff(3));
        let response = retry
            .round_trip(request("PUT", Body::from("payload")))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(mock.calls(), 3);
        assert!(mock.requests().iter().all(|r| r.body == "payload"));
    }

    #[tokio::test]
    async fn test_backoff_gives_up() {
        let mock = flaky(10);
        let retry = RetryInterceptor::with_policy(mock.clone(), backoff(2));
        let response = retry.round_trip(request("GET", Body::empty())).await.unwrap();
        assert_eq!(response.status(), 503);
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_idempotent_and_streamed_not_retried() {
        let mock = flaky(10);
        let retry = RetryInterceptor::with_policy(mock.clone(), backoff(3));
        retry.round_trip(request("POST", Body::empty())).await.unwrap();
        assert_eq!(mock.calls(), 1);

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![Ok(Bytes::from_static(b"x"))];
        retry
            .round_trip(request("PUT", Body::from_stream(stream::iter(chunks))))
            .await
            .unwrap();
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_transport_failures_retried() {
        let mock = Arc::new(MockTransport::fail("connection reset"));
        let retry = RetryInterceptor::with_policy(mock.clone(), backoff(1));
        let err = retry
            .round_trip(request("DELETE", Body::empty()))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "connection reset");
        assert_eq!(mock.calls(), 2);
    }
}
