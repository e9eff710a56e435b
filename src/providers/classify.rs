//! Failure classification shared by all adapters
//!
//! Maps HTTP statuses, transport errors and provider-specific error bodies onto
//! [`ErrorKind`]. Messages produced here are safe to return to API clients:
//! they describe the kind and status code only. Raw bodies go to debug logs,
//! truncated.

use crate::error::{ErrorKind, ProviderError};
use reqwest::StatusCode;

/// Maximum number of characters of a backend body kept for debug logging
pub const BODY_PREVIEW_CHARS: usize = 200;

/// Classify a non-success HTTP status
///
/// - 401, 403 → Auth
/// - 429, 402 (quota/credits exhausted) → RateLimit
/// - 502, 503, 504, 529 (overloaded) → Unavailable
/// - 408 → Timeout
/// - everything else → Unknown
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 | 403 => ErrorKind::Auth,
        402 | 429 => ErrorKind::RateLimit,
        502 | 503 | 504 | 529 => ErrorKind::Unavailable,
        408 => ErrorKind::Timeout,
        _ => ErrorKind::Unknown,
    }
}

/// Classify a transport-level reqwest failure
pub fn classify_reqwest_error(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        return ErrorKind::Timeout;
    }

    // Connection refused/reset and failures while sending are network problems
    if error.is_connect() || error.is_request() {
        return ErrorKind::Timeout;
    }

    if let Some(status) = error.status() {
        return classify_status(status);
    }

    ErrorKind::Unknown
}

/// Classify a Google RPC status string found in Gemini error bodies
///
/// Returns `None` for statuses that carry no extra signal beyond the HTTP code.
pub fn classify_google_status(status: &str) -> Option<ErrorKind> {
    match status {
        "UNAUTHENTICATED" | "PERMISSION_DENIED" => Some(ErrorKind::Auth),
        "RESOURCE_EXHAUSTED" => Some(ErrorKind::RateLimit),
        "UNAVAILABLE" => Some(ErrorKind::Unavailable),
        "DEADLINE_EXCEEDED" => Some(ErrorKind::Timeout),
        _ => None,
    }
}

/// Client-safe description of a failure
pub fn describe(kind: ErrorKind, status: Option<u16>) -> String {
    let what = match kind {
        ErrorKind::Auth => "authentication rejected",
        ErrorKind::RateLimit => "rate limited",
        ErrorKind::Unavailable => "temporarily unavailable",
        ErrorKind::Timeout => "request timed out",
        ErrorKind::Unknown => "request failed",
    };
    match status {
        Some(code) => format!("{} (HTTP {})", what, code),
        None => what.to_string(),
    }
}

/// Build the error for a non-success HTTP response
///
/// `body_kind` lets an adapter override the status-based kind when the body
/// carries a more precise signal.
pub fn from_response(
    provider_id: &str,
    status: StatusCode,
    body: &str,
    body_kind: Option<ErrorKind>,
) -> ProviderError {
    let kind = body_kind.unwrap_or_else(|| classify_status(status));

    tracing::debug!(
        provider_id = %provider_id,
        status = status.as_u16(),
        error_kind = kind.as_str(),
        body = %preview(body),
        "Provider returned error response"
    );

    ProviderError::new(provider_id, kind, describe(kind, Some(status.as_u16())))
        .with_status(status.as_u16())
}

/// Build the error for a transport failure
pub fn from_reqwest(provider_id: &str, error: &reqwest::Error) -> ProviderError {
    let kind = classify_reqwest_error(error);

    tracing::debug!(
        provider_id = %provider_id,
        error_kind = kind.as_str(),
        error = %error,
        "Provider transport error"
    );

    let mut err = ProviderError::new(provider_id, kind, describe(kind, None));
    err.http_status = error.status().map(|s| s.as_u16());
    err
}

/// Build the error for a 2xx response the adapter could not use
pub fn malformed(provider_id: &str, detail: &str) -> ProviderError {
    tracing::debug!(
        provider_id = %provider_id,
        detail = %detail,
        "Provider returned unusable success body"
    );
    ProviderError::new(
        provider_id,
        ErrorKind::Unknown,
        format!("malformed response: {}", detail),
    )
}

/// First [`BODY_PREVIEW_CHARS`] characters of a body (char-boundary safe)
pub fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(BODY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
