//! AI provider interface.

use async_trait::async_trait;
use telecare_core::LlmError;

/// Per-call generation settings sent alongside the user prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    /// System instructions
    pub system: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl PromptContext {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            max_tokens: 1024,
            temperature: 0.3,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// An external text-completion backend.
///
/// Implementations return raw model output. Normalization into a
/// [`telecare_core::ProviderResult`] is done by the orchestrator, which
/// does not trust the output to be JSON.
///
/// # Example
///
/// ```ignore
/// struct EchoProvider;
///
/// #[async_trait]
/// impl AiProvider for EchoProvider {
///     fn name(&self) -> &str { "echo" }
///
///     async fn complete(&self, prompt: &str, _ctx: &PromptContext) -> Result<String, LlmError> {
///         Ok(prompt.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Stable provider name, stamped on results and used in logs.
    fn name(&self) -> &str;

    /// Run one completion.
    async fn complete(&self, prompt: &str, context: &PromptContext) -> Result<String, LlmError>;

    /// Cheap reachability check for health probes.
    ///
    /// Default: always reachable.
    async fn ping(&self) -> Result<(), LlmError> {
        Ok(())
    }
}
