//! HTTP client and request builder.
//!
//! This module provides the fluent request surface:
//!
//! - **Build requests** by chaining headers, query parameters and bodies
//! - **Decode results** into typed success and error payloads
//! - **Recycle builders** through a pool that clears them between uses
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── fetch   - Client and its builder factories
//! ├── builder - RequestBuilder and the execution path
//! ├── recycle - pool of cleared builder state
//! ├── config  - Client configuration
//! └── utils   - URL resolution and small helpers
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Shared handle that hands out builders |
//! | [`RequestBuilder`] | One request, executed at most once |
//! | [`Config`] | Client configuration options |
//!
//! # Examples
//!
//! ## Utility Functions
//!
//! ```
//! use fluent_http::client::{exponential_backoff, is_retryable_status, resolve_url};
//! use std::time::Duration;
//!
//! let url = resolve_url("http://localhost:8080/api/", "/items?page=2").unwrap();
//! assert_eq!(url.as_str(), "http://localhost:8080/api/items?page=2");
//!
//! assert!(is_retryable_status(503));
//! assert!(!is_retryable_status(404));
//!
//! assert_eq!(exponential_backoff(2, 100), Duration::from_millis(400));
//! ```

mod builder;
mod config;
mod fetch;
mod recycle;
mod utils;

pub use builder::RequestBuilder;
pub use config::{Config, DEFAULT_MAX_IDLE_BUILDERS};
pub use fetch::Client;
pub use utils::*;
