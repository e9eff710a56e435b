//! Google Gemini `generateContent` adapter

use super::{Completion, ProviderAdapter, SendOptions, Usage, classify};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Header carrying the API key (keeps the key out of URLs and access logs)
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiAdapter {
    provider_id: String,
    base_url: String,
    credential: String,
    client: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(
        provider_id: impl Into<String>,
        base_url: &str,
        credential: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
            client,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        // Accept both "gemini-1.5-flash" and the fully qualified "models/gemini-1.5-flash"
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("provider_id", &self.provider_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn send(
        &self,
        message: &str,
        options: &SendOptions,
    ) -> Result<Completion, ProviderError> {
        let request = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: message }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint(&options.model))
            .header(API_KEY_HEADER, &self.credential)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify::from_reqwest(&self.provider_id, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify::from_reqwest(&self.provider_id, &e))?;

        if !status.is_success() {
            let body_kind = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|env| env.error.status)
                .and_then(|s| classify::classify_google_status(&s));
            return Err(classify::from_response(
                &self.provider_id,
                status,
                &body,
                body_kind,
            ));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| classify::malformed(&self.provider_id, &e.to_string()))?;

        if parsed.candidates.is_empty() {
            let detail = match parsed.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => format!("prompt blocked ({})", reason),
                None => "no candidates".to_string(),
            };
            return Err(classify::malformed(&self.provider_id, &detail));
        }

        let content: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(classify::malformed(&self.provider_id, "candidate has no text"));
        }

        let usage = parsed.usage_metadata.unwrap_or_default();

        Ok(Completion {
            content,
            usage: Usage::new(
                usage.prompt_token_count,
                usage.candidates_token_count,
                usage.total_token_count,
            ),
        })
    }
}
