//! Interceptors wrapping a [`Transport`](crate::Transport).
//!
//! Each interceptor holds the next transport and is itself a transport, so
//! chains nest by construction:
//!
//! ```ignore
//! use fluent_http::interceptor::{AuthInterceptor, LoggingInterceptor, LoggingOptions, RetryInterceptor};
//! use fluent_http::transport::ReqwestTransport;
//! use fluent_http::{Client, Config};
//! use std::sync::Arc;
//!
//! let terminal = Arc::new(ReqwestTransport::new());
//! let retry = Arc::new(RetryInterceptor::new(terminal));
//! let auth = Arc::new(AuthInterceptor::bearer(retry, "secret")?);
//! let chain = Arc::new(LoggingInterceptor::new(auth, LoggingOptions::default()));
//!
//! let client = Client::new(Config::new("https://api.example.com").with_interceptor(chain))?;
//! ```
//!
//! | Interceptor | Effect |
//! |-------------|--------|
//! | [`AuthInterceptor`] | sets `Authorization` on every request |
//! | [`LoggingInterceptor`] | request id, request/response logs, bodies kept readable |
//! | [`RetryInterceptor`] | replays buffered requests as its [`RetryPolicy`] decides |

mod auth;
mod logging;
mod retry;

pub use auth::AuthInterceptor;
pub use logging::{LoggingInterceptor, LoggingOptions};
pub use retry::{BackoffConfig, IdempotentBackoff, NeverRetry, RetryInterceptor, RetryPolicy};
