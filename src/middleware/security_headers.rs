//! Hardening headers and per-content cache policy for every response.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};

const DEFAULT_HSTS_MAX_AGE: u64 = 31_536_000;

/// Sent on every response. CORP is `same-site` so a frontend on another port
/// of the same host can still embed covers and portraits.
const STATIC_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
    ("cross-origin-resource-policy", "same-site"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CachePolicy {
    /// API payloads change on every write.
    NoStore,
    /// Uploaded media: names are unique per write, but a row may point
    /// elsewhere after an update.
    ShortLived,
    Untouched,
}

fn cache_policy(is_upload: bool, headers: &HeaderMap) -> CachePolicy {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    match (is_json, is_upload) {
        (true, _) => CachePolicy::NoStore,
        (false, true) => CachePolicy::ShortLived,
        _ => CachePolicy::Untouched,
    }
}

fn apply_optional(headers: &mut HeaderMap, sec: &SecurityConfig) {
    if sec.enable_hsts.unwrap_or(false) {
        let mut value = format!("max-age={}", sec.hsts_max_age.unwrap_or(DEFAULT_HSTS_MAX_AGE));
        if sec.hsts_include_subdomains.unwrap_or(false) {
            value.push_str("; includeSubDomains");
        }
        if let Ok(v) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static("strict-transport-security"), v);
        }
    }
    let csp = sec.csp.as_deref().map(str::trim).filter(|c| !c.is_empty());
    if let Some(v) = csp.and_then(|c| HeaderValue::from_str(c).ok()) {
        headers.insert(HeaderName::from_static("content-security-policy"), v);
    }
}

/// Adds [`STATIC_HEADERS`], optional HSTS/CSP from `[security]`, and a
/// `Cache-Control` chosen by content type and path.
pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let is_upload = req.uri().path().starts_with("/uploads/");
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    for (name, value) in STATIC_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    if let Some(sec) = cfg.security.as_ref() {
        apply_optional(headers, sec);
    }

    match cache_policy(is_upload, headers) {
        CachePolicy::NoStore => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        CachePolicy::ShortLived => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));
            headers.remove(PRAGMA);
        }
        CachePolicy::Untouched => {}
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_policy() {
        let mut json = HeaderMap::new();
        json.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut png = HeaderMap::new();
        png.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));

        assert_eq!(cache_policy(false, &json), CachePolicy::NoStore);
        // A JSON 404 under /uploads is still an API payload
        assert_eq!(cache_policy(true, &json), CachePolicy::NoStore);
        assert_eq!(cache_policy(true, &png), CachePolicy::ShortLived);
        assert_eq!(cache_policy(false, &png), CachePolicy::Untouched);
    }

    #[test]
    fn test_optional_headers() {
        let mut headers = HeaderMap::new();
        let sec = SecurityConfig {
            enable_hsts: Some(true),
            hsts_max_age: Some(600),
            hsts_include_subdomains: Some(true),
            csp: Some("default-src 'self'".to_string()),
        };
        apply_optional(&mut headers, &sec);
        assert_eq!(headers["strict-transport-security"], "max-age=600; includeSubDomains");
        assert_eq!(headers["content-security-policy"], "default-src 'self'");

        let mut headers = HeaderMap::new();
        apply_optional(&mut headers, &SecurityConfig::default());
        assert!(headers.is_empty());
    }
}
