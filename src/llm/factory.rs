//! Provider selection.

use std::sync::Arc;

use crate::config::{LlmConfig, SUPPORTED_PROVIDERS};
use crate::error::{AgentError, AgentResult};
use crate::llm::{DeepSeekProvider, GroqProvider, LlmProvider, OpenAiProvider};

/// Build the provider named by the config.
///
/// The config constructor already validates the provider/model pair; the
/// fallback arm here only fires for configs built by hand.
pub fn create_provider(config: &LlmConfig) -> AgentResult<Arc<dyn LlmProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        "groq" => Ok(Arc::new(GroqProvider::new(config.clone())?)),
        "deepseek" => Ok(Arc::new(DeepSeekProvider::new(config.clone())?)),
        other => Err(AgentError::config(format!(
            "Unsupported LLM provider: {}. Supported providers are: {}",
            other,
            SUPPORTED_PROVIDERS.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_each_builtin_provider() {
        let openai = LlmConfig::new("openai", "key", "gpt-4o").unwrap();
        assert_eq!(create_provider(&openai).unwrap().name(), "openai");

        let groq = LlmConfig::new("groq", "key", "llama-3.3-70b-versatile").unwrap();
        assert_eq!(create_provider(&groq).unwrap().name(), "groq");

        let deepseek = LlmConfig::new("deepseek", "key", "deepseek-chat").unwrap();
        assert_eq!(create_provider(&deepseek).unwrap().name(), "deepseek");
    }

    #[test]
    fn test_hand_built_config_with_unknown_provider() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            api_key: "key".to_string(),
            model: "gemini-pro".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
        };
        assert!(create_provider(&config).is_err());
    }
}
