//! Utility functions for the client.
//!
//! This module provides helper functions for:
//! - Resolving endpoints against a base URL
//! - Overlaying query parameters
//! - Truncating bodies for logs
//! - Status code classification and backoff delays for retries

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Resolve `endpoint` against `base`.
///
/// An empty `base` means `endpoint` must already be an absolute URL.
/// Otherwise the paths are joined with exactly one `/` between them, no
/// matter how many slashes either side carries. A query string in
/// `endpoint` is kept; an empty endpoint path resolves to `base` itself.
/// Fragments are never sent to a server, so any fragment on either side is
/// dropped.
///
/// # Examples
///
/// ```
/// use fluent_http::client::resolve_url;
///
/// let url = resolve_url("https://api.example.com/v1/", "/todos/1").unwrap();
/// assert_eq!(url.as_str(), "https://api.example.com/v1/todos/1");
/// ```
pub fn resolve_url(base: &str, endpoint: &str) -> Result<Url> {
    if base.is_empty() {
        let mut url = Url::parse(endpoint).map_err(|e| Error::url_resolution(endpoint, e))?;
        url.set_fragment(None);
        return Ok(url);
    }

    let mut url = Url::parse(base).map_err(|e| Error::url_resolution(endpoint, e))?;
    if url.cannot_be_a_base() {
        return Err(Error::url_resolution(
            endpoint,
            url::ParseError::RelativeUrlWithCannotBeABaseBase,
        ));
    }

    url.set_fragment(None);

    let rest = endpoint.split_once('#').map_or(endpoint, |(rest, _)| rest);
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let path = path.trim_start_matches('/');
    if !path.is_empty() {
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
    }

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        let merged = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
            _ => query.to_string(),
        };
        url.set_query(Some(&merged));
    }

    Ok(url)
}

/// Overlay `params` onto the query of `url`.
///
/// Overlay values replace every existing value of the same key. When
/// anything is overlaid the resulting pairs are ordered by key.
pub fn apply_query(url: &mut Url, params: &BTreeMap<String, String>) {
    if params.is_empty() {
        return;
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !params.contains_key(&k[..]))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    url.query_pairs_mut().clear().extend_pairs(pairs);
}

/// Render a body for logs, capped at `max_size` bytes (0 = no cap).
pub fn truncate_body(body: &[u8], max_size: usize) -> String {
    if max_size == 0 || body.len() <= max_size {
        return String::from_utf8_lossy(body).into_owned();
    }
    format!(
        "{}... [truncated {} bytes]",
        String::from_utf8_lossy(&body[..max_size]),
        body.len() - max_size
    )
}

/// Check if status code indicates retryable error
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 502 | 503 | 504)
}

/// Exponential backoff delay calculation
///
/// Returns `base_ms * 2^attempt`, with the exponent capped at 10.
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}
