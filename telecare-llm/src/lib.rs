//! Telecare LLM - AI Provider Orchestration
//!
//! This crate defines the interface AI vendors are called through and the
//! machinery that keeps AI-backed routes answering when vendors fail:
//!
//! - [`AiProvider`]: `complete(prompt, context) -> raw text`
//! - [`AiRequest`]: the logical operations (symptom analysis, emergency
//!   guidance, health chat) with their cache keys, tags and prompts
//! - [`parse_provider_response`]: defensive JSON-or-text normalization
//! - [`local_fallback`]: deterministic rule-based answers
//! - [`ProviderOrchestrator`]: cache-aside read, ordered provider chain,
//!   guaranteed local fallback
//!
//! Concrete HTTP providers live in [`providers`].

pub mod fallback;
pub mod operation;
pub mod orchestrator;
pub mod parse;
pub mod provider;
pub mod providers;

pub use fallback::{ensure_emergency_numbers, local_fallback, FALLBACK_CONFIDENCE};
pub use operation::{
    AiRequest, ChatTurn, EmergencyGuidanceRequest, HealthChatRequest, OperationKind,
    SymptomAnalysisRequest,
};
pub use orchestrator::{
    AttemptOutcome, CacheTtls, OrchestratedResponse, OrchestratorConfig, ProviderAttempt,
    ProviderOrchestrator,
};
pub use parse::{extract_json_object, parse_provider_response};
pub use provider::{AiProvider, PromptContext};
pub use providers::{AnthropicProvider, OpenAIProvider};
