//! Terminal transport backed by `reqwest`.

use super::{HttpRequest, HttpResponse, Transport};
use crate::body::{Body, Kind};
use crate::error::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// The real network transport.
///
/// DNS, TLS and connection reuse are left to the wrapped `reqwest::Client`.
/// Response bodies are handed up the chain as streams; nothing is read here.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport with a default `reqwest` client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Transport whose client gives up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TransportError::with_source("failed to build HTTP client", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let (parts, body) = request.into_parts();

        let mut builder = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers);

        builder = match body.into_kind() {
            Kind::Empty => builder,
            Kind::Full(bytes) => builder.body(bytes),
            Kind::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let response = builder.send().await.map_err(TransportError::from)?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();

        let mut out = http::Response::new(Body::from_stream(response.bytes_stream()));
        *out.status_mut() = status;
        *out.version_mut() = version;
        *out.headers_mut() = headers;
        Ok(out)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out"
        } else if err.is_connect() {
            "connection failed"
        } else if err.is_body() || err.is_decode() {
            "error reading response body"
        } else {
            "request failed"
        };
        let timeout = err.is_timeout();
        let error = TransportError::with_source(message, err);
        if timeout {
            error.timed_out()
        } else {
            error
        }
    }
}
