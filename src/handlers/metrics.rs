//! Prometheus metrics endpoint
//!
//! Exposes metrics in Prometheus text format for scraping.

use axum::{extract::State, http::StatusCode};

use crate::handlers::AppState;

/// Metrics handler for Prometheus scraping
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if metrics collection fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:3000/metrics
/// # HELP chatrelay_provider_attempts_total Total provider calls, including retries, by provider
/// # TYPE chatrelay_provider_attempts_total counter
/// chatrelay_provider_attempts_total{provider="groq"} 42
/// ```
pub async fn handler(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics().gather() {
        Ok(output) => (StatusCode::OK, output),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics for Prometheus scraping");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to gather metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support;

    #[tokio::test]
    async fn test_metrics_handler_returns_prometheus_format() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(&dir).await;
        state.metrics().record_attempt("groq").unwrap();

        let (status, body) = handler(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE chatrelay_provider_attempts_total counter"));
        assert!(body.contains(r#"chatrelay_provider_attempts_total{provider="groq"} 1"#));
    }
}
