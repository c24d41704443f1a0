//! Language-model gateway.
//!
//! Providers implement [`LlmProvider`]: one prompt in, raw completion text
//! out. No retries and no interpretation of the content happen here; the
//! orchestrator owns extraction and validation. All three built-in providers
//! (OpenAI, Groq, DeepSeek) speak the chat-completions wire format, so the
//! request/response types and the HTTP round-trip are shared.

pub mod deepseek;
pub mod factory;
pub mod groq;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{AgentError, AgentResult};

pub use deepseek::DeepSeekProvider;
pub use factory::create_provider;
pub use groq::GroqProvider;
pub use openai::OpenAiProvider;

/// Timeout for a single provider round-trip.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

const SYSTEM_PROMPT: &str =
    "You are an expert SQL assistant. Answer with exactly the output format the user requests.";

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name as configured, e.g. "openai".
    fn name(&self) -> &str;

    /// Send one prompt and return the raw completion text.
    async fn generate_sql(&self, prompt: &str) -> AgentResult<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// HTTP client with the shared request timeout.
pub(crate) fn build_client() -> AgentResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(AgentError::from)
}

/// One chat-completions round-trip shared by all providers.
pub(crate) async fn chat_completion(
    client: &reqwest::Client,
    endpoint: &str,
    config: &LlmConfig,
    prompt: &str,
) -> AgentResult<String> {
    let request = ChatRequest {
        model: &config.model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: prompt,
            },
        ],
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    debug!(provider = %config.provider, model = %config.model, "Sending completion request");

    let response = client
        .post(endpoint)
        .bearer_auth(&config.api_key)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AgentError::llm_generation(format!(
            "{} API returned {}: {}",
            config.provider, status, body
        )));
    }

    let parsed: ChatResponse = response.json().await?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(AgentError::llm_generation(format!(
            "{} returned an empty completion",
            config.provider
        )));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serializes_expected_shape() {
        let request = ChatRequest {
            model: "gpt-4o",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            temperature: 0.3,
            max_tokens: 512,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 512);
    }

    #[test]
    fn test_chat_response_parses_missing_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"role": "assistant"}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
