//! OpenAI chat-completions provider.

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::AgentResult;
use crate::llm::{build_client, chat_completion, LlmProvider};

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiProvider {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiProvider {
    pub fn new(config: LlmConfig) -> AgentResult<Self> {
        Ok(Self {
            client: build_client()?,
            config,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_sql(&self, prompt: &str) -> AgentResult<String> {
        chat_completion(&self.client, ENDPOINT, &self.config, prompt).await
    }
}
