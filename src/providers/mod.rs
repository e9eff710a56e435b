//! Provider adapters
//!
//! Every external backend is reached through [`ProviderAdapter`], which hides
//! request shaping and maps every failure onto an [`ErrorKind`] before it
//! leaves the adapter. Adapters never retry; retry and fallback decisions
//! belong to the orchestrator.
//!
//! [`ErrorKind`]: crate::error::ErrorKind

pub mod classify;
pub mod gemini;
pub mod openai;
pub mod registry;

pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use registry::ProviderRegistry;

use crate::config::{ProviderApi, ProviderDescriptor};
use crate::error::ProviderError;
use crate::router::GenerationHints;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Token accounting reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Build usage, deriving the total when the backend omitted it
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: Option<u32>) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: total_tokens
                .unwrap_or_else(|| prompt_tokens.saturating_add(completion_tokens)),
        }
    }
}

/// Successful backend reply, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub usage: Usage,
}

/// Effective parameters for one provider call
#[derive(Debug, Clone, PartialEq)]
pub struct SendOptions {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl SendOptions {
    /// Apply caller hints over provider defaults, clamped to the provider's legal range
    ///
    /// - temperature: `[0.0, descriptor.max_temperature()]`, non-finite hints ignored
    /// - max_tokens: `[1, descriptor.max_tokens()]`
    pub fn resolve(
        descriptor: &ProviderDescriptor,
        model: impl Into<String>,
        hints: &GenerationHints,
    ) -> Self {
        let temperature = hints
            .temperature
            .filter(|t| t.is_finite())
            .unwrap_or(descriptor.temperature())
            .clamp(0.0, descriptor.max_temperature());
        let max_tokens = hints
            .max_tokens
            .unwrap_or(descriptor.max_tokens())
            .clamp(1, descriptor.max_tokens());

        Self {
            model: model.into(),
            temperature,
            max_tokens,
        }
    }
}

/// Uniform send/receive contract for one backend
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Id of the provider this adapter talks to
    fn provider_id(&self) -> &str;

    /// Issue exactly one call to the backend
    async fn send(&self, message: &str, options: &SendOptions) -> Result<Completion, ProviderError>;
}

/// Builds adapters for the registry
///
/// Injected so tests can substitute scripted adapters for real HTTP clients.
pub trait AdapterFactory: Send + Sync {
    fn build(
        &self,
        descriptor: &ProviderDescriptor,
        credential: String,
    ) -> Result<Arc<dyn ProviderAdapter>, String>;
}

/// Builds reqwest-backed adapters according to each descriptor's API family
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpAdapterFactory;

impl AdapterFactory for HttpAdapterFactory {
    fn build(
        &self,
        descriptor: &ProviderDescriptor,
        credential: String,
    ) -> Result<Arc<dyn ProviderAdapter>, String> {
        // The orchestrator enforces the per-call deadline; the client timeout
        // is a backstop in case an adapter is driven directly.
        let client = reqwest::Client::builder()
            .timeout(descriptor.request_timeout())
            .connect_timeout(Duration::from_secs(10).min(descriptor.request_timeout()))
            .user_agent(concat!("chatrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        let adapter: Arc<dyn ProviderAdapter> = match descriptor.api() {
            ProviderApi::OpenAi => Arc::new(OpenAiAdapter::new(
                descriptor.id(),
                descriptor.base_url(),
                credential,
                client,
            )),
            ProviderApi::Gemini => Arc::new(GeminiAdapter::new(
                descriptor.id(),
                descriptor.base_url(),
                credential,
                client,
            )),
        };
        Ok(adapter)
    }
}
