//! OpenAI provider implementation

pub mod client;
pub mod types;

pub use client::OpenAIClient;

use crate::provider::{AiProvider, PromptContext};
use async_trait::async_trait;
use telecare_core::LlmError;
use types::{CompletionRequest, CompletionResponse, Message};

/// OpenAI chat-completions [`AiProvider`].
pub struct OpenAIProvider {
    client: OpenAIClient,
    model: String,
}

impl OpenAIProvider {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(OpenAIClient::new(api_key, 60), model)
    }

    pub fn with_client(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn build_request(&self, prompt: &str, context: &PromptContext) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: Some(context.system.clone()),
                },
                Message {
                    role: "user".to_string(),
                    content: Some(prompt.to_string()),
                },
            ],
            max_tokens: Some(context.max_tokens),
            temperature: Some(context.temperature),
        }
    }
}

#[async_trait]
impl AiProvider for OpenAIProvider {
    fn name(&self) -> &str {
        OpenAIClient::PROVIDER
    }

    async fn complete(&self, prompt: &str, context: &PromptContext) -> Result<String, LlmError> {
        let request = self.build_request(prompt, context);
        let response: CompletionResponse = self.client.post("chat/completions", &request).await?;

        // Blank output is rejected by the response parser.
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), LlmError> {
        self.client.get::<serde_json::Value>("models").await.map(|_| ())
    }
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("model", &self.model)
            .finish()
    }
}
