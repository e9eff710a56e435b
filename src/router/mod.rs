//! Provider fallback routing for chatrelay
//!
//! The [`FallbackOrchestrator`] walks the enabled providers in priority order,
//! retrying each a bounded number of times, and returns the first success.
//! This module also holds the request/response types the orchestrator shares
//! with the HTTP layer.

pub mod events;
pub mod fallback;
pub mod normalize;
pub mod retry;

pub use events::{EventSink, FallbackEvent, NoopSink, RecordingSink, SkipReason};
pub use fallback::FallbackOrchestrator;
pub use retry::RetryPolicy;

use crate::error::ErrorKind;
use crate::providers::Usage;
use serde::{Deserialize, Serialize};

/// Caller-supplied overrides of provider generation defaults
///
/// Values are clamped to each provider's legal range before use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct GenerationHints {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Per-request orchestration state, reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackState {
    /// Resolving the ordered, available candidate list
    Selecting,
    /// Sending to a candidate (possibly a retry)
    Attempting,
    Succeeded,
    /// Every candidate failed
    Exhausted,
}

impl FallbackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selecting => "selecting",
            Self::Attempting => "attempting",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Outcome of one call to one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptResult {
    pub provider_id: String,
    /// 1-based attempt number against this provider
    pub attempt: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

/// Normalized reply returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    /// Generated text
    pub response: String,
    /// Display name of the provider that answered
    pub provider: String,
    pub provider_id: String,
    pub model: String,
    /// True when the answering provider is not first in the enabled priority list
    pub fallback_used: bool,
    /// Provider calls made for this request, across all providers
    pub total_attempts: usize,
    pub usage: Usage,
    /// Every attempt made, in order (kept out of the wire format)
    #[serde(skip)]
    pub attempts: Vec<AttemptResult>,
}

impl GenerationResult {
    /// Provider ids in the order they were called, one entry per attempt
    pub fn attempted_providers(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.provider_id.as_str()).collect()
    }
}
