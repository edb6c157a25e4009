//! Header parsing and formatting.
//!
//! | Helper | Produces |
//! |--------|----------|
//! | [`parse_header`] | validated `(HeaderName, HeaderValue)` pair |
//! | [`bearer`] | `Bearer <token>` value, marked sensitive |
//! | [`basic_auth`] | `Basic <base64(user:password)>` value, marked sensitive |
//! | [`header_map`] | loggable map with sensitive values redacted |
//!
//! # Examples
//!
//! ```
//! use fluent_http::protocol::{basic_auth, parse_header};
//!
//! let (name, value) = parse_header("X-Api-Key", "abc").unwrap();
//! assert_eq!(name.as_str(), "x-api-key");
//! assert_eq!(value, "abc");
//!
//! let auth = basic_auth("Aladdin", "open sesame").unwrap();
//! assert_eq!(auth, "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
//! assert!(auth.is_sensitive());
//! ```

use super::constants::REDACTED;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::header::{AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

/// Parse a header name and value.
///
/// Names are case-insensitive and stored lowercase.
pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::invalid_header(name, e))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| Error::invalid_header(name, e))?;
    Ok((header_name, header_value))
}

/// `Authorization` value for a bearer token.
pub fn bearer(token: &str) -> Result<HeaderValue> {
    sensitive(&format!("Bearer {token}"))
}

/// `Authorization` value for HTTP basic auth.
pub fn basic_auth(user: &str, password: &str) -> Result<HeaderValue> {
    let encoded = STANDARD.encode(format!("{user}:{password}"));
    sensitive(&format!("Basic {encoded}"))
}

fn sensitive(value: &str) -> Result<HeaderValue> {
    let mut value =
        HeaderValue::from_str(value).map_err(|e| Error::invalid_header(AUTHORIZATION.as_str(), e))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Render headers for logging, redacting credentials.
pub fn header_map(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let rendered = if is_secret(name, value) {
            REDACTED.to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        map.entry(name.as_str().to_string()).or_default().push(rendered);
    }
    map
}

fn is_secret(name: &HeaderName, value: &HeaderValue) -> bool {
    value.is_sensitive()
        || *name == AUTHORIZATION
        || *name == PROXY_AUTHORIZATION
        || *name == COOKIE
        || *name == SET_COOKIE
}
