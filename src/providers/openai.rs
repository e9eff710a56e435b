//! OpenAI-compatible chat completions adapter
//!
//! Used for every backend exposing `POST {base_url}/chat/completions` with
//! bearer-token auth (Groq, OpenRouter, Hugging Face router, ...).

use super::{Completion, ProviderAdapter, SendOptions, Usage, classify};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub struct OpenAiAdapter {
    provider_id: String,
    endpoint: String,
    credential: String,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(
        provider_id: impl Into<String>,
        base_url: &str,
        credential: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            credential,
            client,
        }
    }
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("provider_id", &self.provider_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn send(
        &self,
        message: &str,
        options: &SendOptions,
    ) -> Result<Completion, ProviderError> {
        let request = ChatRequest {
            model: &options.model,
            messages: [ChatMessage {
                role: "user",
                content: message,
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.credential)
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
            return Err(classify::from_response(&self.provider_id, status, &body, None));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| classify::malformed(&self.provider_id, &e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                classify::malformed(&self.provider_id, "no message content in choices")
            })?;

        let usage = parsed.usage.unwrap_or_default();

        Ok(Completion {
            content,
            usage: Usage::new(usage.prompt_tokens, usage.completion_tokens, usage.total_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let adapter = OpenAiAdapter::new(
            "groq",
            "https://api.groq.com/openai/v1/",
            "gsk_test_credential".to_string(),
            reqwest::Client::new(),
        );
        assert_eq!(
            adapter.endpoint,
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_debug_omits_credential() {
        let adapter = OpenAiAdapter::new(
            "groq",
            "https://api.groq.com/openai/v1",
            "gsk_super_secret".to_string(),
            reqwest::Client::new(),
        );
        assert!(!format!("{adapter:?}").contains("gsk_super_secret"));
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            model: "llama-3.3-70b-versatile",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.7,
            max_tokens: 256,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama-3.3-70b-versatile");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["max_tokens"], 256);
    }
}
