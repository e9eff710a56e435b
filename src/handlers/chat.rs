//! Chat endpoint handler
//!
//! Handles POST /chat requests by running the provider fallback chain.

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::middleware::RequestId;
use crate::router::{GenerationHints, GenerationResult};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;

/// Maximum allowed message length in characters (100K chars)
pub const MAX_MESSAGE_LENGTH: usize = 100_000;

/// Chat request from client
///
/// Validation is enforced during deserialization - invalid instances cannot exist.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    message: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Generation overrides carried by this request
    pub fn hints(&self) -> GenerationHints {
        GenerationHints {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl<'de> Deserialize<'de> for ChatRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawChatRequest {
            message: String,
            #[serde(default)]
            temperature: Option<f64>,
            #[serde(default)]
            max_tokens: Option<u32>,
        }

        let raw = RawChatRequest::deserialize(deserializer)?;

        if raw.message.trim().is_empty() {
            return Err(serde::de::Error::custom(
                "message cannot be empty or contain only whitespace",
            ));
        }

        // Count Unicode characters, not bytes
        let char_count = raw.message.chars().count();
        if char_count > MAX_MESSAGE_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "message exceeds maximum length of {} characters (got {})",
                MAX_MESSAGE_LENGTH, char_count
            )));
        }

        if let Some(t) = raw.temperature
            && (!t.is_finite() || t < 0.0)
        {
            return Err(serde::de::Error::custom(format!(
                "temperature must be a non-negative finite number (got {})",
                t
            )));
        }

        if raw.max_tokens == Some(0) {
            return Err(serde::de::Error::custom(
                "max_tokens must be greater than 0",
            ));
        }

        Ok(ChatRequest {
            message: raw.message,
            temperature: raw.temperature,
            max_tokens: raw.max_tokens,
        })
    }
}

/// Chat handler
///
/// The fallback chain runs in its own task. If the client disconnects, axum
/// drops this future and the drop guard cancels the token: an in-flight
/// provider call still completes, and the chain stops at its next checkpoint.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Json<GenerationResult>> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(
            request_id = %request_id,
            error = %rejection.body_text(),
            "Rejected chat request"
        );
        AppError::Validation(rejection.body_text())
    })?;

    tracing::debug!(
        request_id = %request_id,
        message_length = request.message().len(),
        temperature = request.temperature,
        max_tokens = request.max_tokens,
        "Received chat request"
    );

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let orchestrator = state.shared_orchestrator();
    let hints = request.hints();
    let task = tokio::spawn(async move {
        orchestrator
            .generate(&request.message, &hints, request_id, &cancel)
            .await
    });

    let result = task.await.map_err(|e| {
        tracing::error!(request_id = %request_id, error = %e, "Chat task failed");
        AppError::Internal(format!("chat task failed: {}", e))
    })??;

    Ok(Json(result))
}
