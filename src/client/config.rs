//! Client configuration.

use crate::transport::Transport;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default number of idle builders kept for reuse.
pub const DEFAULT_MAX_IDLE_BUILDERS: usize = 64;

/// Configuration bundle for [`Client::new`](crate::Client::new).
///
/// # Examples
///
/// ```ignore
/// use fluent_http::{Client, Config};
/// use std::time::Duration;
///
/// let client = Client::new(
///     Config::new("https://jsonplaceholder.typicode.com")
///         .with_global_header("X-Api-Version", "2")
///         .with_timeout(Duration::from_secs(10)),
/// )?;
/// ```
#[derive(Clone)]
pub struct Config {
    /// Prefix for relative endpoints. Empty means endpoints are absolute.
    pub base_url: String,

    /// Headers applied to every request unless overridden per request.
    pub global_headers: BTreeMap<String, String>,

    /// Root of the transport chain. `None` uses a default
    /// [`ReqwestTransport`](crate::transport::ReqwestTransport).
    pub interceptor: Option<Arc<dyn Transport>>,

    /// Overall deadline for each request, on top of the caller's context.
    pub timeout: Option<Duration>,

    /// Idle builders kept for reuse.
    pub max_idle_builders: usize,
}

impl Config {
    /// Configuration with a base URL and defaults for everything else.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Add a global header.
    pub fn with_global_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_headers.insert(name.into(), value.into());
        self
    }

    /// Set the transport chain.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Transport>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Set the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how many idle builders are kept.
    pub fn with_max_idle_builders(mut self, max: usize) -> Self {
        self.max_idle_builders = max;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            global_headers: BTreeMap::new(),
            interceptor: None,
            timeout: None,
            max_idle_builders: DEFAULT_MAX_IDLE_BUILDERS,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("global_headers", &self.global_headers)
            .field("interceptor", &self.interceptor.is_some())
            .field("timeout", &self.timeout)
            .field("max_idle_builders", &self.max_idle_builders)
            .finish()
    }
}
