//! Error types and result handling.
//!
//! Every failure of a request surfaces through [`Error`], returned from
//! [`RequestBuilder::result`](crate::RequestBuilder::result) and friends. The
//! variants form a closed taxonomy so callers can tell a malformed request
//! from a dead network, an abandoned request, or an HTTP error status:
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | [`Error::UrlResolution`] | base URL and endpoint cannot be joined |
//! | [`Error::InvalidHeader`] | a header name or value is not valid HTTP |
//! | [`Error::Serialization`] | the request body cannot be encoded |
//! | [`Error::Decode`] | a response payload does not decode into the target type |
//! | [`Error::Transport`] | the transport chain failed (network, TLS, body read) |
//! | [`Error::Canceled`] | the request context was canceled or hit its deadline |
//! | [`Error::Request`] | the server answered with a status >= 400 |
//! | [`Error::PoolClosed`] | a worker pool rejected or abandoned a job |
//! | [`Error::JobPanicked`] | a pooled job panicked, e.g. inside a callback |
//!
//! `Error` is `Clone` so a builder can hand out the same outcome on every
//! call; underlying sources are shared behind `Arc`.

use crate::context::CancelReason;
use bytes::Bytes;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Result type alias for request operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used by body streams.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared, cloneable error source.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Errors produced while building, dispatching or decoding a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Base URL and endpoint could not be resolved into a valid URL.
    #[error("failed to resolve URL {endpoint:?}: {source}")]
    UrlResolution {
        /// Endpoint as given to the client.
        endpoint: String,
        /// Parser failure.
        #[source]
        source: SharedError,
    },

    /// A header name or value is not valid HTTP.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader {
        /// Offending header name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request body could not be encoded.
    #[error("failed to prepare request body: {0}")]
    Serialization(#[source] SharedError),

    /// A response or error payload could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[source] Arc<serde_json::Error>),

    /// The transport chain failed before a complete response was read.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// The request context was canceled or its deadline passed.
    #[error("request canceled or timed out: {0}")]
    Canceled(CancelReason),

    /// The server answered with an error status.
    #[error(transparent)]
    Request(Box<RequestError>),

    /// The worker pool is shut down.
    #[error("worker pool is shut down")]
    PoolClosed,

    /// A job panicked while a pool worker ran it.
    #[error("pooled job panicked: {0}")]
    JobPanicked(String),
}

impl Error {
    pub(crate) fn url_resolution<E>(endpoint: &str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::UrlResolution {
            endpoint: endpoint.to_string(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn invalid_header(name: &str, reason: impl fmt::Display) -> Self {
        Error::InvalidHeader {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(source: serde_json::Error) -> Self {
        Error::Decode(Arc::new(source))
    }

    /// True if the request was abandoned through its context.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled(_))
    }

    /// True if the transport chain failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// HTTP status of an error response, if the server answered.
    pub fn status(&self) -> Option<StatusCode> {
        self.as_request_error().map(|e| e.status)
    }

    /// The error response, if the server answered with status >= 400.
    pub fn as_request_error(&self) -> Option<&RequestError> {
        match self {
            Error::Request(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<RequestError> for Error {
    fn from(err: RequestError) -> Self {
        Error::Request(Box::new(err))
    }
}

/// Failure reported by a [`Transport`](crate::Transport).
///
/// Interceptors wrap the error of the transport they forward to with
/// [`TransportError::with_source`], so the original failure stays reachable
/// through [`std::error::Error::source`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}{}", render_source(.source))]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<SharedError>,
    timeout: bool,
}

fn render_source(source: &Option<SharedError>) -> String {
    source
        .as_ref()
        .map(|s| format!(": {s}"))
        .unwrap_or_default()
}

impl TransportError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            timeout: false,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
            timeout: false,
        }
    }

    /// Create an error wrapping a boxed cause (body stream failures).
    pub fn from_boxed(message: impl Into<String>, source: BoxError) -> Self {
        Self {
            message: message.into(),
            source: Some(Arc::from(source)),
            timeout: false,
        }
    }

    /// Mark the failure as a transport-level timeout.
    pub fn timed_out(mut self) -> Self {
        self.timeout = true;
        self
    }

    /// The message of this layer, without its causes.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if the transport gave up waiting.
    pub fn is_timeout(&self) -> bool {
        self.timeout
            || self
                .source
                .as_deref()
                .and_then(|s| s.downcast_ref::<TransportError>())
                .is_some_and(TransportError::is_timeout)
    }
}

/// An HTTP response with status >= 400.
///
/// Keeps the raw body so callers can decode error payloads themselves with
/// [`RequestError::decode`]. When the builder registered an error type via
/// [`with_error_type`](crate::RequestBuilder::with_error_type) the decoded
/// value is folded into the display form and available from
/// [`RequestError::detail`].
#[derive(Debug, Clone)]
pub struct RequestError {
    /// Response status.
    pub status: StatusCode,
    /// Resolved request URL.
    pub url: String,
    /// Request method.
    pub method: Method,
    /// Raw response body.
    pub body: Bytes,
    cause: StatusFailure,
}

impl RequestError {
    pub(crate) fn new(status: StatusCode, url: String, method: Method, body: Bytes) -> Self {
        Self {
            status,
            url,
            method,
            body,
            cause: StatusFailure {
                status: status.as_u16(),
                detail: None,
            },
        }
    }

    pub(crate) fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.cause.detail = Some(detail);
        self
    }

    /// Numeric status code.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Decode the raw error payload as JSON into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::decode)
    }

    /// The decoded error payload, if one was registered and decoded as `T`.
    pub fn detail<T: Any>(&self) -> Option<&T> {
        self.cause
            .detail
            .as_ref()
            .and_then(|d| d.value.downcast_ref::<T>())
    }

    /// Display form of the decoded error payload.
    pub fn detail_message(&self) -> Option<&str> {
        self.cause.detail.as_ref().map(|d| d.rendered.as_str())
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request failed: method={}, url={}, status={}, error={}",
            self.method,
            self.url,
            self.status.as_u16(),
            self.cause
        )
    }
}

impl StdError for RequestError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.cause)
    }
}

/// Underlying cause of a [`RequestError`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("request failed with status code {status}{}", render_detail(.detail))]
pub struct StatusFailure {
    status: u16,
    detail: Option<ErrorDetail>,
}

fn render_detail(detail: &Option<ErrorDetail>) -> String {
    detail
        .as_ref()
        .map(|d| format!(": {}", d.rendered))
        .unwrap_or_default()
}

/// A decoded error payload together with its display form.
#[derive(Clone)]
pub(crate) struct ErrorDetail {
    rendered: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl ErrorDetail {
    pub(crate) fn new<T>(value: T) -> Self
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        Self {
            rendered: format!("{value:?}"),
            value: Arc::new(value),
        }
    }
}

impl fmt::Debug for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorDetail").field(&self.rendered).finish()
    }
}
