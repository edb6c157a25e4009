//! Request/response logging interceptor.
//!
//! Every request gets an `X-Request-ID` (a fresh UUID v4 unless the caller
//! set one) that is attached to each log line for it:
//!
//! | Event | Level | Fields |
//! |-------|-------|--------|
//! | `outgoing request` | INFO | `request_id`, `method`, `url` |
//! | `request headers` / `response headers` | DEBUG | `headers` (credentials redacted) |
//! | `request body` / `response body` | DEBUG | `body` (size capped) |
//! | `received response` | INFO | `status`, `duration`, `content_type`, `content_size` |
//! | `request failed` | ERROR | `duration`, `error` |
//!
//! Bodies are buffered in place before they are logged, so whatever reads
//! them afterwards sees the same bytes.

use crate::body::Body;
use crate::client::truncate_body;
use crate::error::TransportError;
use crate::protocol::constants::headers::REQUEST_ID;
use crate::protocol::header_map;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// What the logging interceptor records besides the request line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Log request and response bodies at DEBUG.
    pub log_body: bool,
    /// Log request and response headers at DEBUG.
    pub log_headers: bool,
    /// Cap on logged body bytes; 0 logs bodies whole.
    pub max_body_size: usize,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_body: true,
            log_headers: true,
            max_body_size: 4096,
        }
    }
}

/// Logs every round trip through `tracing`.
pub struct LoggingInterceptor {
    next: Arc<dyn Transport>,
    options: LoggingOptions,
}

impl LoggingInterceptor {
    /// Wrap `next`.
    pub fn new(next: Arc<dyn Transport>, options: LoggingOptions) -> Self {
        Self { next, options }
    }

    /// Options in effect.
    pub fn options(&self) -> &LoggingOptions {
        &self.options
    }

    async fn log_body(&self, request_id: &str, label: &'static str, body: &mut Body) {
        if !self.options.log_body || body.is_empty() {
            return;
        }
        match body.buffer().await {
            Ok(bytes) => tracing::debug!(
                request_id,
                body = %truncate_body(&bytes, self.options.max_body_size),
                "{label}"
            ),
            Err(err) => tracing::debug!(request_id, error = %err, "{label} unreadable"),
        }
    }
}

#[async_trait]
impl Transport for LoggingInterceptor {
    async fn round_trip(&self, mut request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let request_id = match request.headers().get(&REQUEST_ID) {
            Some(value) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            None => {
                let id = Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    request.headers_mut().insert(REQUEST_ID, value);
                }
                id
            }
        };
        let request_id = request_id.as_str();
        let method = request.method().clone();
        let url = request.uri().to_string();

        tracing::info!(request_id, method = %method, url = %url, "outgoing request");
        if self.options.log_headers {
            tracing::debug!(request_id, headers = ?header_map(request.headers()), "request headers");
        }
        self.log_body(request_id, "request body", request.body_mut())
            .await;

        let start = Instant::now();
        let mut response = match self.next.round_trip(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(
                    request_id,
                    method = %method,
                    url = %url,
                    duration = ?start.elapsed(),
                    error = %err,
                    "request failed"
                );
                return Err(TransportError::with_source("request failed", err));
            }
        };

        if self.options.log_headers {
            tracing::debug!(request_id, headers = ?header_map(response.headers()), "response headers");
        }
        self.log_body(request_id, "response body", response.body_mut())
            .await;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        tracing::info!(
            request_id,
            status = response.status().as_u16(),
            duration = ?start.elapsed(),
            content_type,
            content_size = ?response.body().size_hint(),
            "received response"
        );

        Ok(response)
    }
}

impl fmt::Debug for LoggingInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingInterceptor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockResponse, MockTransport};
    use bytes::Bytes;
    use futures::stream;
    use parking_lot::Mutex;
    use std::io;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_logs() -> (Capture, tracing::subscriber::DefaultGuard) {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    fn post(body: Body) -> HttpRequest {
        http::Request::builder()
            .method("POST")
            .uri("http://localhost/items")
            .header("authorization", "Bearer secret")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_bodies_survive_logging() {
        let mock = Arc::new(MockTransport::respond(
            MockResponse::json(201, r#"{"id":7,"name":"widget"}"#).streamed(3),
        ));
        let logging = LoggingInterceptor::new(mock.clone(), LoggingOptions::default());

        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"name\":")),
            Ok(Bytes::from_static(b"\"widget\"}")),
        ];
        let response = logging
            .round_trip(post(Body::from_stream(stream::iter(chunks))))
            .await
            .unwrap();

        assert_eq!(mock.last_request().unwrap().body, r#"{"name":"widget"}"#);
        let body = response.into_body().collect().await.unwrap();
        assert_eq!(body, r#"{"id":7,"name":"widget"}"#);
    }

    #[tokio::test]
    async fn test_request_id_added_once() {
        let mock = Arc::new(MockTransport::respond(MockResponse::new(200, "")));
        let logging = LoggingInterceptor::new(mock.clone(), LoggingOptions::default());

        logging.round_trip(post(Body::empty())).await.unwrap();
        let generated = mock.last_request().unwrap();
        let id = generated.header("x-request-id").unwrap();
        assert!(Uuid::parse_str(id).is_ok());

        let mut request = post(Body::empty());
        request
            .headers_mut()
            .insert(REQUEST_ID, HeaderValue::from_static("caller-id"));
        logging.round_trip(request).await.unwrap();
        assert_eq!(
            mock.last_request().unwrap().header("x-request-id"),
            Some("caller-id")
        );
    }

    #[tokio::test]
    async fn test_log_lines_and_redaction() {
        let (logs, _guard) = capture_logs();
        let mock = Arc::new(MockTransport::respond(MockResponse::json(200, r#"{"ok":true}"#)));
        let logging = LoggingInterceptor::new(
            mock,
            LoggingOptions {
                max_body_size: 4,
                ..LoggingOptions::default()
            },
        );

        logging
            .round_trip(post(Body::from("hello world")))
            .await
            .unwrap();

        let out = logs.contents();
        assert!(out.contains("outgoing request"), "{out}");
        assert!(out.contains("received response"), "{out}");
        assert!(out.contains("status=200"), "{out}");
        assert!(out.contains("application/json"), "{out}");
        assert!(out.contains("hell... [truncated 7 bytes]"), "{out}");
        assert!(out.contains("<redacted>"), "{out}");
        assert!(!out.contains("Bearer secret"), "{out}");
    }

    #[tokio::test]
    async fn test_failure_is_logged_and_wrapped() {
        let (logs, _guard) = capture_logs();
        let logging = LoggingInterceptor::new(
            Arc::new(MockTransport::fail("connection refused")),
            LoggingOptions::default(),
        );

        let err = logging.round_trip(post(Body::empty())).await.unwrap_err();
        assert_eq!(err.message(), "request failed");
        assert_eq!(err.to_string(), "request failed: connection refused");
        assert!(logs.contents().contains("ERROR"));
    }

    #[tokio::test]
    async fn test_quiet_options_skip_buffering() {
        let mock = Arc::new(MockTransport::respond(MockResponse::new(200, "abc").streamed(1)));
        let logging = LoggingInterceptor::new(
            mock,
            LoggingOptions {
                log_body: false,
                log_headers: false,
                max_body_size: 0,
            },
        );
        let response = logging.round_trip(post(Body::empty())).await.unwrap();
        assert!(!response.body().is_buffered());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: LoggingOptions = serde_json::from_str(r#"{"log_body":false}"#).unwrap();
        assert_eq!(
            options,
            LoggingOptions {
                log_body: false,
                ..LoggingOptions::default()
            }
        );
    }
}
