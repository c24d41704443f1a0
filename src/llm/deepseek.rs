//! DeepSeek chat-completions provider. OpenAI-compatible wire format.

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::AgentResult;
use crate::llm::{build_client, chat_completion, LlmProvider};

const ENDPOINT: &str = "https://api.deepseek.com/chat/completions";

pub struct DeepSeekProvider {
    client: reqwest::Client,
    config: LlmConfig,
}

impl DeepSeekProvider {
    pub fn new(config: LlmConfig) -> AgentResult<Self> {
        Ok(Self {
            client: build_client()?,
            config,
        })
    }
}

#[async_trait]
impl LlmProvider for DeepSeekProvider {
    fn name(&self) -> &str {
        "deepseek"
    }

    async fn generate_sql(&self, prompt: &str) -> AgentResult<String> {
        chat_completion(&self.client, ENDPOINT, &self.config, prompt).await
    }
}
