//! The request builder.
//!
//! A [`RequestBuilder`] is handed out by a [`Client`](crate::Client) for one
//! request. It is configured by chaining `with_*` calls, executed at most
//! once, and recycled into the client's builder pool when dropped.
//!
//! # Examples
//!
//! ```ignore
//! use fluent_http::{Client, Config, Context};
//!
//! #[derive(serde::Deserialize)]
//! struct Todo { id: u64, title: String }
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct ApiError { error: String }
//!
//! let client = Client::new(Config::new("https://jsonplaceholder.typicode.com"))?;
//! let ctx = Context::background();
//!
//! let todo: Todo = client
//!     .get(&ctx, "/todos/1")
//!     .with_query_param("expand", "owner")
//!     .with_error_type::<ApiError>()
//!     .json()
//!     .await?;
//! ```
//!
//! # Execution
//!
//! The first call to [`result`](RequestBuilder::result) (or anything built on
//! it) resolves the URL, overlays the query, encodes the body, applies
//! default, global and per-request headers in that order, and runs the
//! request through the transport chain. The response body is read to the
//! end before the status is classified; the outcome is cached, the matching
//! callback fires, and every later call returns the cached outcome.

use super::fetch::ClientInner;
use super::utils;
use crate::body::{Body, RequestBody};
use crate::context::{self, Context};
use crate::error::{Error, ErrorDetail, RequestError, Result, TransportError};
use crate::protocol::constants::APPLICATION_JSON;
use crate::protocol::parse_header;
use crate::response::Response;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Uri};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type SuccessCallback = Box<dyn FnMut(&Response) + Send>;
type ErrorCallback = Box<dyn FnMut(&Error) + Send>;
type ErrorDecoder = Box<dyn Fn(&[u8]) -> Option<ErrorDetail> + Send>;
type SuccessCheck = Box<dyn Fn(&[u8]) -> serde_json::Result<()> + Send>;

/// Per-request state, recycled through the builder pool.
#[derive(Default)]
pub(crate) struct RequestState {
    method: Method,
    endpoint: String,
    ctx: Context,
    headers: HeaderMap,
    query: BTreeMap<String, String>,
    body: Option<RequestBody>,
    invalid: Option<Error>,
    error_decoder: Option<ErrorDecoder>,
    success_check: Option<SuccessCheck>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    outcome: Option<Result<Response>>,
}

impl RequestState {
    /// Clear every per-request field, keeping allocations.
    pub(crate) fn reset(&mut self) {
        self.method = Method::GET;
        self.endpoint.clear();
        self.ctx = Context::background();
        self.headers.clear();
        self.query.clear();
        self.body = None;
        self.invalid = None;
        self.error_decoder = None;
        self.success_check = None;
        self.on_success = None;
        self.on_error = None;
        self.outcome = None;
    }

    #[cfg(test)]
    pub(crate) fn is_clear(&self) -> bool {
        self.method == Method::GET
            && self.endpoint.is_empty()
            && self.ctx.deadline().is_none()
            && !self.ctx.token().is_cancelled()
            && self.headers.is_empty()
            && self.query.is_empty()
            && self.body.is_none()
            && self.invalid.is_none()
            && self.error_decoder.is_none()
            && self.success_check.is_none()
            && self.on_success.is_none()
            && self.on_error.is_none()
            && self.outcome.is_none()
    }

    #[cfg(test)]
    pub(crate) fn dirty_for_test(&mut self) {
        self.method = Method::DELETE;
        self.endpoint.push_str("/dirty");
        self.ctx = Context::background().with_timeout(std::time::Duration::from_secs(1));
        self.headers.insert("x-dirty", HeaderValue::from_static("1"));
        self.query.insert("dirty".to_string(), "1".to_string());
        self.body = Some(RequestBody::from("dirty"));
        self.invalid = Some(Error::PoolClosed);
        self.error_decoder = Some(Box::new(|_| None));
        self.success_check = Some(Box::new(|_| Ok(())));
        self.on_success = Some(Box::new(|_| {}));
        self.on_error = Some(Box::new(|_| {}));
        self.outcome = Some(Err(Error::PoolClosed));
    }
}

/// A request being configured, executed once, then recycled.
pub struct RequestBuilder {
    client: Arc<ClientInner>,
    state: RequestState,
}

impl RequestBuilder {
    pub(crate) fn new(
        client: Arc<ClientInner>,
        mut state: RequestState,
        method: Method,
        ctx: &Context,
        endpoint: &str,
    ) -> Self {
        state.method = method;
        state.endpoint.push_str(endpoint);
        state.ctx = ctx.clone();
        Self { client, state }
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.state.method
    }

    /// Endpoint as given to the client.
    pub fn endpoint(&self) -> &str {
        &self.state.endpoint
    }

    /// True once the request has run.
    pub fn is_executed(&self) -> bool {
        self.state.outcome.is_some()
    }

    /// Set a header, replacing any earlier value for the same name.
    ///
    /// Names are case-insensitive. An invalid name or value fails the
    /// request with [`Error::InvalidHeader`] when it executes.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match parse_header(name.as_ref(), value.as_ref()) {
            Ok((name, value)) => {
                self.state.headers.insert(name, value);
            }
            Err(err) if self.state.invalid.is_none() => self.state.invalid = Some(err),
            Err(_) => {}
        }
        self
    }

    /// Set several headers.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self = self.with_header(name, value);
        }
        self
    }

    /// Set a query parameter, replacing any earlier value for the key.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.state.query.insert(key.into(), value.into());
        self
    }

    /// Set several query parameters.
    pub fn with_query_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.state
            .query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.state.body = Some(body.into());
        self
    }

    /// Set a structured body, sent as JSON.
    pub fn with_json<T>(self, value: T) -> Self
    where
        T: Serialize + Send + 'static,
    {
        self.with_body(RequestBody::json(value))
    }

    /// Replace the cancellation context.
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.state.ctx = ctx;
        self
    }

    /// Decode error payloads (status >= 400) into `E`.
    ///
    /// When the payload decodes, the value is attached to the
    /// [`RequestError`] and shows up in its message.
    pub fn with_error_type<E>(mut self) -> Self
    where
        E: DeserializeOwned + fmt::Debug + Send + Sync + 'static,
    {
        self.state.error_decoder = Some(Box::new(|body: &[u8]| {
            serde_json::from_slice::<E>(body).ok().map(ErrorDetail::new)
        }));
        self
    }

    /// Require a successful body to decode into `T`.
    ///
    /// A body that does not decode turns the outcome into [`Error::Decode`].
    /// This only validates: the decoded value is discarded, and
    /// [`json`](RequestBuilder::json) decodes the cached body again.
    pub fn expect_json<T>(mut self) -> Self
    where
        T: DeserializeOwned + 'static,
    {
        self.state.success_check = Some(Box::new(|body: &[u8]| {
            serde_json::from_slice::<T>(body).map(|_| ())
        }));
        self
    }

    /// Call `callback` with the response when the request succeeds.
    ///
    /// Fires immediately if the request already succeeded.
    pub fn on_success<F>(mut self, mut callback: F) -> Self
    where
        F: FnMut(&Response) + Send + 'static,
    {
        if let Some(Ok(response)) = &self.state.outcome {
            callback(response);
        }
        self.state.on_success = Some(Box::new(callback));
        self
    }

    /// Call `callback` with the error when the request fails.
    ///
    /// Fires immediately if the request already failed.
    pub fn on_error<F>(mut self, mut callback: F) -> Self
    where
        F: FnMut(&Error) + Send + 'static,
    {
        if let Some(Err(err)) = &self.state.outcome {
            callback(err);
        }
        self.state.on_error = Some(Box::new(callback));
        self
    }

    /// Execute the request once and return its outcome.
    ///
    /// Later calls return the same outcome without touching the transport.
    pub async fn result(&mut self) -> Result<Response> {
        self.execute(None).await
    }

    /// Execute, then decode the successful body as JSON into `T`.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.result().await?.json()
    }

    /// Execute inside an additional cancellation scope.
    pub(crate) async fn result_within(&mut self, scope: &Context) -> Result<Response> {
        self.execute(Some(scope)).await
    }

    async fn execute(&mut self, scope: Option<&Context>) -> Result<Response> {
        if let Some(outcome) = &self.state.outcome {
            return outcome.clone();
        }

        let outcome = self.run(scope).await;
        self.notify(&outcome);
        self.state.outcome = Some(outcome.clone());
        outcome
    }

    async fn run(&mut self, scope: Option<&Context>) -> Result<Response> {
        if let Some(err) = self.state.invalid.take() {
            return Err(err);
        }

        let ctx = match self.client.timeout {
            Some(timeout) => self.state.ctx.with_timeout(timeout),
            None => self.state.ctx.clone(),
        };

        let mut url = utils::resolve_url(&self.client.base_url, &self.state.endpoint)?;
        utils::apply_query(&mut url, &self.state.query);
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e| Error::url_resolution(&self.state.endpoint, e))?;

        let body = match self.state.body.take() {
            Some(body) => Body::from(context::guard(&ctx, scope, body.encode()).await??),
            None => Body::empty(),
        };

        let method = self.state.method.clone();
        let mut request = http::Request::new(body);
        *request.method_mut() = method.clone();
        *request.uri_mut() = uri;
        self.apply_headers(request.headers_mut());

        tracing::debug!(method = %method, url = %url, "dispatching request");

        let transport = Arc::clone(&self.client.transport);
        let response = context::guard(&ctx, scope, transport.round_trip(request))
            .await?
            .map_err(|err| match context::first_err(&ctx, scope) {
                Some(reason) => Error::Canceled(reason),
                None => Error::Transport(err),
            })?;

        // Canceling here drops the body stream instead of draining it; the
        // transport still releases the connection when the stream drops.
        let (parts, body) = response.into_parts();
        let bytes = context::guard(&ctx, scope, body.collect())
            .await?
            .map_err(|e| {
                Error::Transport(TransportError::from_boxed("error reading response body", e))
            })?;

        self.classify(parts.status, parts.headers, bytes, method, url.to_string())
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        for (name, value) in &self.client.global_headers {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.state.headers {
            headers.insert(name.clone(), value.clone());
        }
    }

    fn classify(
        &self,
        status: http::StatusCode,
        headers: HeaderMap,
        body: Bytes,
        method: Method,
        url: String,
    ) -> Result<Response> {
        if status.as_u16() >= 400 {
            let mut error = RequestError::new(status, url, method, body);
            if let Some(decode) = &self.state.error_decoder {
                if let Some(detail) = decode(&error.body) {
                    error = error.with_detail(detail);
                }
            }
            return Err(error.into());
        }

        if let Some(check) = &self.state.success_check {
            check(&body).map_err(Error::decode)?;
        }

        Ok(Response {
            status,
            headers,
            body,
        })
    }

    fn notify(&mut self, outcome: &Result<Response>) {
        match outcome {
            Ok(response) => {
                if let Some(callback) = self.state.on_success.as_mut() {
                    callback(response);
                }
            }
            Err(err) => {
                if let Some(callback) = self.state.on_error.as_mut() {
                    callback(err);
                }
            }
        }
    }
}

impl Drop for RequestBuilder {
    fn drop(&mut self) {
        let state = std::mem::take(&mut self.state);
        self.client.builders.release(state);
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.state.method)
            .field("endpoint", &self.state.endpoint)
            .field("executed", &self.is_executed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::body::Body;
    use crate::error::TransportError;
    use crate::transport::{HttpRequest, HttpResponse, MockResponse, MockTransport, Transport};
    use crate::{CancelReason, Client, Config, Context, Error};
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn client(mock: &Arc<MockTransport>) -> Client {
        Client::new(Config::new("http://api.test/v1").with_interceptor(mock.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_result_is_idempotent() {
        let mock = Arc::new(MockTransport::respond(MockResponse::json(200, r#"{"id":1}"#)));
        let client = client(&mock);
        let mut request = client.get(&Context::background(), "/todos/1");

        let first = request.result().await.unwrap();
        let second = request.result().await.unwrap();
        assert_eq!(first.body, second.body);
        assert_eq!(first.status, second.status);
        assert_eq!(mock.calls(), 1);
        assert!(request.is_executed());
    }

    #[tokio::test]
    async fn test_header_layering() {
        let mock = Arc::new(MockTransport::respond(MockResponse::new(204, "")));
        let client = Client::new(
            Config::new("http://api.test")
                .with_interceptor(mock.clone())
                .with_global_header("X-Team", "core")
                .with_global_header("Accept", "text/plain"),
        )
        .unwrap();

        client
            .post(&Context::background(), "/items")
            .with_header("x-team", "edge")
            .with_header("Content-Type", "text/csv")
            .result()
            .await
            .unwrap();

        let seen = mock.last_request().unwrap();
        assert_eq!(seen.header("accept"), Some("text/plain"));
        assert_eq!(seen.header("content-type"), Some("text/csv"));
        assert_eq!(seen.header("x-team"), Some("edge"));
        assert_eq!(seen.method, http::Method::POST);
    }

    #[tokio::test]
    async fn test_default_headers() {
        let mock = Arc::new(MockTransport::respond(MockResponse::new(200, "")));
        client(&mock)
            .get(&Context::background(), "/")
            .result()
            .await
            .unwrap();
        let seen = mock.last_request().unwrap();
        assert_eq!(seen.header("content-type"), Some("application/json"));
        assert_eq!(seen.header("accept"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_query_overlay_on_endpoint_query() {
        let mock = Arc::new(MockTransport::respond(MockResponse::new(200, "")));
        client(&mock)
            .get(&Context::background(), "/search?q=old&lang=en")
            .with_query_param("q", "new")
            .with_query_params([("page", "2")])
            .result()
            .await
            .unwrap();
        assert_eq!(
            mock.last_request().unwrap().url,
            "http://api.test/v1/search?lang=en&page=2&q=new"
        );
    }

    #[tokio::test]
    async fn test_invalid_header_fails_without_dispatch() {
        let mock = Arc::new(MockTransport::respond(MockResponse::new(200, "")));
        let err = client(&mock)
            .get(&Context::background(), "/")
            .with_header("bad header", "x")
            .result()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_expect_json_rejects_mismatch() {
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct Todo {
            id: u64,
        }
        let mock = Arc::new(MockTransport::respond(MockResponse::json(200, r#"{"id":"x"}"#)));
        let err = client(&mock)
            .get(&Context::background(), "/todos/1")
            .expect_json::<Todo>()
            .result()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_expect_json_then_json_decodes_cached_body() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Todo {
            id: u64,
        }
        let mock = Arc::new(MockTransport::respond(MockResponse::json(200, r#"{"id":7}"#)));
        let mut request = client(&mock)
            .get(&Context::background(), "/todos/7")
            .expect_json::<Todo>();

        assert_eq!(request.result().await.unwrap().body, r#"{"id":7}"#);
        assert_eq!(request.json::<Todo>().await.unwrap(), Todo { id: 7 });
        assert_eq!(mock.calls(), 1);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Sends one chunk of the body and then stalls forever.
    struct StalledBody {
        dropped: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl Transport for StalledBody {
        async fn round_trip(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let flag = DropFlag(Arc::clone(&self.dropped));
            let chunks = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"{"))])
                .chain(stream::pending())
                .map(move |chunk| {
                    let _held = &flag;
                    chunk
                });
            Ok(http::Response::new(Body::from_stream(chunks)))
        }
    }

    #[tokio::test]
    async fn test_cancel_during_body_read_drops_stream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = Arc::new(StalledBody {
            dropped: Arc::clone(&dropped),
        });
        let client = Client::new(Config::new("http://api.test").with_interceptor(transport)).unwrap();
        let ctx = Context::background().with_timeout(Duration::from_millis(20));

        let err = client.get(&ctx, "/slow-body").result().await.unwrap_err();
        assert!(matches!(err, Error::Canceled(CancelReason::DeadlineExceeded)), "{err}");
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_callbacks_before_and_after_execution() {
        let mock = Arc::new(MockTransport::respond(MockResponse::json(200, "{}")));
        let hits = Arc::new(AtomicUsize::new(0));

        let early = hits.clone();
        let mut request = client(&mock)
            .get(&Context::background(), "/")
            .on_success(move |_| {
                early.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(|err| panic!("unexpected error: {err}"));
        request.result().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let late = hits.clone();
        let mut request = request.on_success(move |_| {
            late.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        request.result().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 11);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_error_callback_and_return_value() {
        let mock = Arc::new(MockTransport::respond(MockResponse::json(500, "{}")));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let err = client(&mock)
            .delete(&Context::background(), "/items/1")
            .on_error(move |err| {
                assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .result()
            .await
            .unwrap_err();
        assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_recycles_cleared_state() {
        let mock = Arc::new(MockTransport::respond(MockResponse::new(200, "")));
        let client = client(&mock);

        let mut request = client
            .put(&Context::background(), "/items/1")
            .with_header("x-secret", "1")
            .with_query_param("token", "abc")
            .with_body("payload");
        request.result().await.unwrap();
        drop(request);
        assert_eq!(client.idle_builders(), 1);

        let mut reused = client.get(&Context::background(), "/items/2");
        assert_eq!(client.idle_builders(), 0);
        assert!(!reused.is_executed());
        reused.result().await.unwrap();

        let seen = mock.last_request().unwrap();
        assert_eq!(seen.method, http::Method::GET);
        assert_eq!(seen.url, "http://api.test/v1/items/2");
        assert!(seen.header("x-secret").is_none());
        assert!(seen.body.is_empty());
        assert_eq!(mock.calls(), 2);
    }
}
