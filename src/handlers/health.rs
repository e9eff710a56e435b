//! Health check endpoint
//!
//! Reports, per configured provider, whether it is enabled in the priority
//! store and whether its credential currently passes the availability gate.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

#[derive(Debug, Serialize)]
pub struct ProviderHealth {
    pub id: String,
    pub display_name: String,
    /// `None` when the provider is configured but missing from the priority store
    pub priority: Option<i32>,
    pub enabled: bool,
    pub available: bool,
    /// Client built (at least one request has used this provider)
    pub initialized: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "OK" when at least one enabled provider is available, else "degraded"
    pub status: &'static str,
    /// "operational", or "degraded" once any metrics recording has failed
    pub metrics_status: &'static str,
    /// Providers in attempt order; unranked providers last
    pub providers: Vec<ProviderHealth>,
}

/// Health check handler
///
/// Always 200; callers read `status` to decide whether chat can succeed.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let entries = state.store().entries().await;
    let config = state.config();

    let mut providers: Vec<ProviderHealth> = entries
        .iter()
        .filter_map(|entry| {
            let descriptor = config.provider(&entry.id)?;
            Some(ProviderHealth {
                id: entry.id.clone(),
                display_name: descriptor.display_name().to_string(),
                priority: Some(entry.priority),
                enabled: entry.enabled,
                available: state.gate().is_available(descriptor),
                initialized: state.registry().is_initialized(&entry.id),
            })
        })
        .collect();

    for descriptor in &config.providers {
        if !entries.iter().any(|e| e.id == descriptor.id()) {
            providers.push(ProviderHealth {
                id: descriptor.id().to_string(),
                display_name: descriptor.display_name().to_string(),
                priority: None,
                enabled: false,
                available: state.gate().is_available(descriptor),
                initialized: state.registry().is_initialized(descriptor.id()),
            });
        }
    }

    let status = if providers.iter().any(|p| p.enabled && p.available) {
        "OK"
    } else {
        "degraded"
    };
    let metrics_status = if state.metrics().metrics_recording_failures_count() > 0 {
        "degraded"
    } else {
        "operational"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status,
            metrics_status,
            providers,
        }),
    )
}
