//! Cheap request checks that run before routing.

use axum::{
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, header::USER_AGENT, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::{config::AppConfig, error::AppError};

const SCANNER_AGENTS: [&str; 5] = ["scanner", "nikto", "sqlmap", "havij", "acunetix"];
const KNOWN_CRAWLERS: [&str; 2] = ["googlebot", "bingbot"];

/// Rejects a request whose path escapes its directory (400) or whose declared
/// POST/PUT body is above `uploads.max_body_bytes` (413). Suspicious user agents
/// are only logged.
pub async fn validate_request_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    if contains_path_traversal(req.uri().path()) {
        tracing::warn!("Path traversal rejected: {}", sanitize_for_logging(req.uri().path()));
        return AppError::BadRequest("Path traversal detected in request".to_string()).into_response();
    }

    if let Some(ua) = req.headers().get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        if is_suspicious_user_agent(ua) {
            tracing::warn!("Suspicious user agent: {}", sanitize_for_logging(ua));
        }
    }

    if matches!(*req.method(), Method::POST | Method::PUT) {
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<usize>().ok());
        let max = cfg.uploads.max_body_bytes;
        if declared.is_some_and(|len| len > max) {
            return AppError::PayloadTooLarge(format!("Request body exceeds maximum size of {} bytes", max))
                .into_response();
        }
    }

    next.run(req).await
}

/// Undoes the percent-encodings used to smuggle dots and separators
/// (`%2e`, `%2f`, `%5c`, and `%25` for double encoding).
fn decode_separators(path: &str) -> String {
    let mut out = path.to_ascii_lowercase();
    // Twice, so `%252e` becomes `%2e` and then `.`
    for _ in 0..2 {
        out = out.replace("%25", "%").replace("%2e", ".").replace("%2f", "/").replace("%5c", "\\");
    }
    out
}

/// `true` if any segment of the decoded path is `.` or `..`, or the path
/// carries a NUL byte (raw or `%00`).
fn contains_path_traversal(path: &str) -> bool {
    let decoded = decode_separators(path);
    if decoded.contains('\0') || decoded.contains("%00") {
        return true;
    }
    decoded.split(['/', '\\']).any(|segment| segment == "." || segment == "..")
}

fn is_suspicious_user_agent(ua: &str) -> bool {
    let ua = ua.to_lowercase();
    if SCANNER_AGENTS.iter().any(|s| ua.contains(s)) {
        return true;
    }
    ua.contains("crawler") && !KNOWN_CRAWLERS.iter().any(|c| ua.contains(c))
}

/// Makes user-controlled text safe for a single log line: control characters
/// dropped, quotes and backslashes escaped, at most 200 chars kept.
pub fn sanitize_for_logging(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(200));
    for ch in input.chars().filter(|c| !c.is_control() || *c == ' ').take(200) {
        if matches!(ch, '\\' | '"' | '\'') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
