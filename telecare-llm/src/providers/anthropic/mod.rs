//! Anthropic (Claude) provider implementation

pub mod client;
pub mod types;

pub use client::AnthropicClient;

use crate::provider::{AiProvider, PromptContext};
use async_trait::async_trait;
use telecare_core::LlmError;
use types::{ContentBlock, Message, MessageRequest, MessageResponse};

/// Claude-backed [`AiProvider`].
pub struct AnthropicProvider {
    client: AnthropicClient,
    model: String,
}

impl AnthropicProvider {
    pub const DEFAULT_MODEL: &'static str = "claude-3-5-sonnet-20241022";

    /// Create a new Anthropic provider.
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key
    /// * `model` - Model name (e.g., "claude-3-5-sonnet-20241022")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(AnthropicClient::new(api_key, 50), model)
    }

    pub fn with_client(client: AnthropicClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn extract_text(content: Vec<ContentBlock>) -> String {
        content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &str {
        AnthropicClient::PROVIDER
    }

    async fn complete(&self, prompt: &str, context: &PromptContext) -> Result<String, LlmError> {
        let request = MessageRequest {
            model: self.model.clone(),
            system: Some(context.system.clone()),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: context.max_tokens,
            temperature: Some(context.temperature),
        };

        let response: MessageResponse = self.client.post("messages", &request).await?;
        Ok(Self::extract_text(response.content))
    }

    async fn ping(&self) -> Result<(), LlmError> {
        self.client.get::<serde_json::Value>("models").await.map(|_| ())
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_skips_non_text_blocks() {
        let blocks = vec![
            ContentBlock::Text { text: "a".to_string() },
            ContentBlock::Other,
            ContentBlock::Text { text: "b".to_string() },
        ];
        assert_eq!(AnthropicProvider::extract_text(blocks), "a\nb");
    }

    #[test]
    fn test_debug_hides_key() {
        let provider = AnthropicProvider::new("sk-ant-secret", AnthropicProvider::DEFAULT_MODEL);
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-ant-secret"));
        assert_eq!(provider.name(), "anthropic");
    }
}
