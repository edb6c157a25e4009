//! The transport seam.
//!
//! A [`Transport`] takes a fully resolved request and produces a response or
//! a [`TransportError`]. Everything between a builder and the network is a
//! transport: the terminal [`ReqwestTransport`] that actually talks HTTP, and
//! every interceptor in [`crate::interceptor`], each of which holds the next
//! transport and forwards to it.
//!
//! ```text
//! RequestBuilder ──► Logging ──► Auth ──► Retry ──► ReqwestTransport ──► network
//!                    (outer)                         (terminal)
//! ```
//!
//! [`MockTransport`] is a recording, counting stub used by the test suite and
//! available to downstream tests.

mod mock;
mod network;

pub use mock::{MockResponse, MockTransport, RecordedRequest};
pub use network::ReqwestTransport;

use crate::body::Body;
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;

/// Outgoing request as seen by transports.
pub type HttpRequest = http::Request<Body>;

/// Incoming response as seen by transports.
pub type HttpResponse = http::Response<Body>;

/// One request/response exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response head with an unread body.
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).round_trip(request).await
    }
}

/// Clone a request whose body is buffered, for replay.
pub(crate) fn try_clone_request(request: &HttpRequest) -> Option<HttpRequest> {
    let body = request.body().try_clone()?;
    let mut clone = http::Request::new(body);
    *clone.method_mut() = request.method().clone();
    *clone.uri_mut() = request.uri().clone();
    *clone.version_mut() = request.version();
    *clone.headers_mut() = request.headers().clone();
    Some(clone)
}
