//! URL validation and normalization.
//!
//! The normalized form is both the identity of a stored record and the
//! `url` field of every product the pipeline emits:
//!
//! - scheme and host lowercased, default ports dropped
//! - fragment dropped
//! - trailing slash dropped (the bare root becomes `https://host`)
//! - query kept, minus tracking parameters, pairs sorted by key

use url::Url;

use crate::error::{FetchError, FetchResult};

/// Query parameters that never change page content.
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "mc_cid", "mc_eid"];

/// Parse `input` as an absolute http(s) URL with a host.
pub fn parse_http_url(input: &str) -> FetchResult<Url> {
    let trimmed = input.trim();
    let url = Url::parse(trimmed).map_err(|e| FetchError::InvalidUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FetchError::InvalidUrl {
            url: input.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(FetchError::InvalidUrl {
            url: input.to_string(),
            reason: "missing host".to_string(),
        }),
    }
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Normalize an already-parsed URL.
pub fn normalize(url: &Url) -> String {
    let mut out = format!("{}://", url.scheme());
    if let Some(host) = url.host_str() {
        out.push_str(&host.to_lowercase());
    }
    if let Some(port) = url.port() {
        out.push_str(&format!(":{port}"));
    }

    let path = url.path().trim_end_matches('/');
    out.push_str(path);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if !pairs.is_empty() {
        pairs.sort();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        out.push('?');
        out.push_str(&query);
    }

    out
}

/// Validate and normalize a raw URL string.
pub fn normalize_url(input: &str) -> FetchResult<String> {
    parse_http_url(input).map(|url| normalize(&url))
}
