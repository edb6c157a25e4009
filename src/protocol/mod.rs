//! Protocol constants and header helpers shared by the client and the
//! interceptors.

pub mod headers;

pub use headers::{basic_auth, bearer, header_map, parse_header};

/// Protocol constants.
pub mod constants {
    /// Header names used by this crate.
    pub mod headers {
        use http::HeaderName;

        /// Correlation identifier set by the logging interceptor.
        pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
    }

    /// Media type used for default `Content-Type` and `Accept` headers.
    pub const APPLICATION_JSON: &str = "application/json";

    /// Placeholder logged instead of sensitive header values.
    pub const REDACTED: &str = "<redacted>";
}
