//! The HTTP client.
//!
//! A [`Client`] is a cheap handle over immutable shared state: base URL,
//! global headers, the transport chain, the request timeout and the builder
//! pool. Mutators such as [`Client::with_bearer_token`] return a new client
//! that shares the transport and pool; the original is never changed.
//!
//! # Examples
//!
//! ## Simple GET request
//!
//! ```ignore
//! use fluent_http::{Client, Config, Context};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(Config::new("https://jsonplaceholder.typicode.com"))?;
//!     let response = client.get(&Context::background(), "/todos/1").result().await?;
//!     println!("Status: {}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Authenticated client
//!
//! ```ignore
//! use fluent_http::{Client, Context};
//!
//! let client = Client::default().with_bearer_token("secret")?;
//! let me: serde_json::Value = client
//!     .get(&Context::background(), "https://api.example.com/me")
//!     .json()
//!     .await?;
//! ```

use super::builder::RequestBuilder;
use super::config::Config;
use super::recycle::BuilderPool;
use super::utils;
use crate::context::Context;
use crate::dispatch::{Batch, WorkerPool};
use crate::error::Result;
use crate::protocol::{basic_auth, bearer, parse_header};
use crate::transport::{ReqwestTransport, Transport};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// State shared by a client and every builder it hands out.
pub(crate) struct ClientInner {
    pub(crate) base_url: String,
    pub(crate) global_headers: HeaderMap,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) builders: Arc<BuilderPool>,
}

/// HTTP client handing out [`RequestBuilder`]s.
///
/// Cloning is cheap and clones share everything.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client from `config`.
    ///
    /// Fails if a global header is not valid HTTP or a non-empty base URL
    /// cannot serve as a base for endpoints.
    pub fn new(config: Config) -> Result<Self> {
        if !config.base_url.is_empty() {
            utils::resolve_url(&config.base_url, "")?;
        }

        let mut global_headers = HeaderMap::with_capacity(config.global_headers.len());
        for (name, value) in &config.global_headers {
            let (name, value) = parse_header(name, value)?;
            global_headers.insert(name, value);
        }

        let transport = config
            .interceptor
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));

        tracing::debug!(
            base_url = %config.base_url,
            global_headers = global_headers.len(),
            timeout = ?config.timeout,
            "client created"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url: config.base_url,
                global_headers,
                transport,
                timeout: config.timeout,
                builders: Arc::new(BuilderPool::new(config.max_idle_builders)),
            }),
        })
    }

    /// Start a `GET` request.
    pub fn get(&self, ctx: &Context, endpoint: &str) -> RequestBuilder {
        self.request(Method::GET, ctx, endpoint)
    }

    /// Start a `POST` request.
    pub fn post(&self, ctx: &Context, endpoint: &str) -> RequestBuilder {
        self.request(Method::POST, ctx, endpoint)
    }

    /// Start a `PUT` request.
    pub fn put(&self, ctx: &Context, endpoint: &str) -> RequestBuilder {
        self.request(Method::PUT, ctx, endpoint)
    }

    /// Start a `PATCH` request.
    pub fn patch(&self, ctx: &Context, endpoint: &str) -> RequestBuilder {
        self.request(Method::PATCH, ctx, endpoint)
    }

    /// Start a `DELETE` request.
    pub fn delete(&self, ctx: &Context, endpoint: &str) -> RequestBuilder {
        self.request(Method::DELETE, ctx, endpoint)
    }

    /// Start a `HEAD` request.
    pub fn head(&self, ctx: &Context, endpoint: &str) -> RequestBuilder {
        self.request(Method::HEAD, ctx, endpoint)
    }

    /// Start a request with any method.
    pub fn request(&self, method: Method, ctx: &Context, endpoint: &str) -> RequestBuilder {
        let state = self.inner.builders.acquire();
        RequestBuilder::new(Arc::clone(&self.inner), state, method, ctx, endpoint)
    }

    /// Start an ordered batch.
    pub fn batch(&self) -> Batch {
        Batch::new()
    }

    /// Start a worker pool. Zero workers means the default size.
    pub fn pool(&self, workers: usize) -> WorkerPool {
        WorkerPool::new(workers)
    }

    /// A client that also sends `name: value` on every request.
    pub fn with_global_header(&self, name: &str, value: &str) -> Result<Self> {
        let (name, value) = parse_header(name, value)?;
        Ok(self.with_header_value(name, value))
    }

    /// A client that authenticates with a bearer token.
    pub fn with_bearer_token(&self, token: &str) -> Result<Self> {
        Ok(self.with_header_value(AUTHORIZATION, bearer(token)?))
    }

    /// A client that authenticates with HTTP basic auth.
    pub fn with_basic_auth(&self, user: &str, password: &str) -> Result<Self> {
        Ok(self.with_header_value(AUTHORIZATION, basic_auth(user, password)?))
    }

    fn with_header_value(&self, name: HeaderName, value: HeaderValue) -> Self {
        let mut global_headers = self.inner.global_headers.clone();
        global_headers.insert(name, value);
        Self {
            inner: Arc::new(ClientInner {
                base_url: self.inner.base_url.clone(),
                global_headers,
                transport: Arc::clone(&self.inner.transport),
                timeout: self.inner.timeout,
                builders: Arc::clone(&self.inner.builders),
            }),
        }
    }

    /// Base URL endpoints are resolved against.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Per-request deadline.
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    /// Headers sent on every request.
    pub fn global_headers(&self) -> &HeaderMap {
        &self.inner.global_headers
    }

    /// Builders parked for reuse.
    pub fn idle_builders(&self) -> usize {
        self.inner.builders.idle()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self {
            inner: Arc::new(ClientInner {
                base_url: String::new(),
                global_headers: HeaderMap::new(),
                transport: Arc::new(ReqwestTransport::new()),
                timeout: None,
                builders: Arc::new(BuilderPool::new(Config::default().max_idle_builders)),
            }),
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("global_headers", &crate::protocol::header_map(&self.inner.global_headers))
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}
