//! Error types for chatrelay
//!
//! Three layers of errors:
//! - [`ProviderError`]: a single failed provider call, already classified into an [`ErrorKind`]
//! - [`StoreError`]: priority store load/persist failures
//! - [`AppError`]: everything that can reach an Axum handler (implements `IntoResponse`)

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed provider call
///
/// Adapters map every backend failure onto one of these kinds before the error
/// leaves the adapter. The fallback orchestrator only ever looks at the kind,
/// never at raw backend text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials rejected by the backend. Deterministic, never retried on the same provider.
    Auth,
    /// Backend signalled rate limiting or quota exhaustion.
    RateLimit,
    /// Backend temporarily down or overloaded. Retried with a longer backoff.
    Unavailable,
    /// Network failure or per-call timeout expiry.
    Timeout,
    /// Anything else, including malformed success bodies.
    Unknown,
}

impl ErrorKind {
    /// All kinds, in a stable order (used for metrics label pre-registration)
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::Auth,
        ErrorKind::RateLimit,
        ErrorKind::Unavailable,
        ErrorKind::Timeout,
        ErrorKind::Unknown,
    ];

    /// Label used in logs, metrics and JSON error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Whether another attempt against the same provider may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Auth)
    }

    /// HTTP status the boundary layer should emit when this kind is terminal
    pub fn http_status_hint(&self) -> StatusCode {
        match self {
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from one provider call
///
/// `message` is safe to show to API clients: adapters build it from the status
/// code and kind, never from the raw response body or request headers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{provider_id}: {message}")]
pub struct ProviderError {
    pub provider_id: String,
    pub kind: ErrorKind,
    pub message: String,
    pub http_status: Option<u16>,
}

impl ProviderError {
    pub fn new(
        provider_id: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            kind,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

/// Priority store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read priority store '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Priority store '{path}' is malformed: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Priority store '{path}' is invalid: {reason}")]
    Invalid { path: String, reason: String },

    #[error("Failed to persist priority store '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown provider '{provider_id}' in priority store")]
    NotFound { provider_id: String },
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Provider '{provider_id}' is unavailable: {reason}")]
    ServiceUnavailable { provider_id: String, reason: String },

    #[error(
        "No AI provider is available: {enabled} enabled in the priority list, none with usable credentials"
    )]
    NoProviderAvailable { enabled: usize },

    #[error("All providers failed after {attempts} attempts ({kind}): {message}")]
    AllProvidersExhausted {
        kind: ErrorKind,
        message: String,
        attempts: usize,
    },

    #[error("Request cancelled after {attempts} attempts")]
    Cancelled { attempts: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error kind for JSON bodies and metrics
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => "config",
            Self::Validation(_) => "validation",
            Self::Store(StoreError::NotFound { .. }) => "not_found",
            Self::Store(_) => "store",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::NoProviderAvailable { .. } => "no_provider_available",
            Self::AllProvidersExhausted { kind, .. } => kind.as_str(),
            Self::Cancelled { .. } => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error
    ///
    /// Exhaustion follows the last provider error kind, so an outage across
    /// every provider surfaces as 503 rather than a generic 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable { .. } | Self::NoProviderAvailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::AllProvidersExhausted { kind, .. } => kind.http_status_hint(),
            // nginx convention for "client closed request"
            Self::Cancelled { .. } => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
            }
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Store(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "error_kind": self.error_kind(),
            "http_status_hint": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_status_hints() {
        assert_eq!(ErrorKind::Auth.http_status_hint(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ErrorKind::RateLimit.http_status_hint(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorKind::Unavailable.http_status_hint(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorKind::Timeout.http_status_hint(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            ErrorKind::Unknown.http_status_hint(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_only_auth_is_not_retryable() {
        for kind in ErrorKind::ALL {
            assert_eq!(kind.is_retryable(), kind != ErrorKind::Auth, "{kind}");
        }
    }

    #[test]
    fn test_error_kind_serde_labels() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::RateLimit).unwrap(),
            r#""rate_limit""#
        );
        assert_eq!(
            serde_json::from_str::<ErrorKind>(r#""unavailable""#).unwrap(),
            ErrorKind::Unavailable
        );
    }

    #[test]
    fn test_provider_error_display_includes_provider() {
        let err = ProviderError::new("groq", ErrorKind::RateLimit, "rate limited (HTTP 429)")
            .with_status(429);
        assert_eq!(err.to_string(), "groq: rate limited (HTTP 429)");
        assert_eq!(err.http_status, Some(429));
    }

    #[test]
    fn test_exhausted_unavailable_maps_to_503() {
        let err = AppError::AllProvidersExhausted {
            kind: ErrorKind::Unavailable,
            message: "temporarily unavailable".to_string(),
            attempts: 6,
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_kind(), "unavailable");
    }

    #[test]
    fn test_exhausted_auth_maps_to_401() {
        let err = AppError::AllProvidersExhausted {
            kind: ErrorKind::Auth,
            message: "rejected".to_string(),
            attempts: 1,
        };
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_no_provider_available_response_status() {
        let err = AppError::NoProviderAvailable { enabled: 2 };
        assert_eq!(err.error_kind(), "no_provider_available");
        assert_eq!(
            err.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        let err = AppError::from(StoreError::NotFound {
            provider_id: "mistral".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            err.to_string(),
            "Unknown provider 'mistral' in priority store"
        );
    }

    #[test]
    fn test_validation_error_response_status() {
        let err = AppError::Validation("test".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_cancelled_uses_client_closed_status() {
        let err = AppError::Cancelled { attempts: 1 };
        assert_eq!(err.status_code().as_u16(), 499);
    }
}
