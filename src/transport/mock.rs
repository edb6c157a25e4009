//! Recording stub transport for tests.
//!
//! # Example
//!
//! ```ignore
//! use fluent_http::transport::{MockResponse, MockTransport};
//! use std::sync::Arc;
//!
//! let mock = Arc::new(MockTransport::respond(MockResponse::json(200, r#"{"id":1}"#)));
//! // hand `mock.clone()` to a client, then:
//! assert_eq!(mock.calls(), 1);
//! ```

use super::{HttpRequest, HttpResponse, Transport};
use crate::body::Body;
use crate::error::{BoxError, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Handler = Box<dyn Fn(&RecordedRequest) -> Result<MockResponse, TransportError> + Send + Sync>;

/// A request as it reached the mock, body fully read.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: Method,
    /// Request URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl RecordedRequest {
    /// First value of a header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
    /// Stream the body in chunks of this size instead of buffering it.
    pub chunk_size: Option<usize>,
}

impl MockResponse {
    /// A response with the given status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: body.into(),
            chunk_size: None,
        }
    }

    /// A JSON response.
    pub fn json(status: u16, body: &'static str) -> Self {
        Self::new(status, body).with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Deliver the body as a stream of `size`-byte chunks.
    pub fn streamed(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    fn into_http(self) -> HttpResponse {
        let body = match self.chunk_size {
            Some(size) => {
                let chunks: Vec<Result<Bytes, BoxError>> = self
                    .body
                    .chunks(size)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Body::from_stream(stream::iter(chunks))
            }
            None => Body::from(self.body),
        };
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Transport that records requests and answers from a handler.
pub struct MockTransport {
    handler: Handler,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    /// Answer every request with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Result<MockResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the same response.
    pub fn respond(response: MockResponse) -> Self {
        Self::new(move |_| Ok(response.clone()))
    }

    /// Fail every request with a transport error.
    pub fn fail(message: &'static str) -> Self {
        Self::new(move |_| Err(TransportError::new(message)))
    }

    /// Wait `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of round trips started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (parts, body) = request.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TransportError::from_boxed("failed to read request body", e))?;
        let recorded = RecordedRequest {
            method: parts.method,
            url: parts.uri.to_string(),
            headers: parts.headers,
            body,
        };
        self.requests.lock().push(recorded.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.handler)(&recorded).map(MockResponse::into_http)
    }
}
