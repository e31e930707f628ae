//! Telecare Test Utilities
//!
//! Centralized test infrastructure for the Telecare workspace:
//! - Scripted AI providers with call counting
//! - Request fixtures for each AI operation
//! - Proptest generators

pub use telecare_core::{
    Clock, HealthStatus, LlmError, ManualClock, ProviderResult, ResponseSource, ServiceHealth,
    LOCAL_FALLBACK_PROVIDER,
};
pub use telecare_llm::{
    AiProvider, AiRequest, EmergencyGuidanceRequest, HealthChatRequest, PromptContext,
    SymptomAnalysisRequest,
};
pub use telecare_storage::{InMemoryPatientStore, RecordingMessenger, TtlCache};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// SCRIPTED PROVIDER
// ============================================================================

/// One scripted provider reaction.
#[derive(Debug, Clone)]
pub enum ProviderStep {
    /// Return this raw text.
    Reply(String),
    /// Fail with this error.
    Fail(LlmError),
    /// Sleep, then return the text. Use with paused tokio time.
    Delay(Duration, String),
}

/// [`AiProvider`] that plays back a script and counts calls and pings.
///
/// Once the script is exhausted the last step repeats. An empty script
/// fails every call.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<ProviderStep>>,
    last: Mutex<Option<ProviderStep>>,
    calls: AtomicUsize,
    pings: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, steps: Vec<ProviderStep>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            script: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        })
    }

    /// Always replies with `text`.
    pub fn replying(name: impl Into<String>, text: impl Into<String>) -> Arc<Self> {
        Self::new(name, vec![ProviderStep::Reply(text.into())])
    }

    /// Always fails with a 500.
    pub fn failing(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let error = LlmError::RequestFailed {
            provider: name.clone(),
            status: 500,
            message: "scripted failure".to_string(),
        };
        Self::new(name, vec![ProviderStep::Fail(error)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<ProviderStep> {
        let mut script = self.script.lock().ok()?;
        let mut last = self.last.lock().ok()?;
        if let Some(step) = script.pop_front() {
            *last = Some(step);
        }
        last.clone()
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _prompt: &str, _context: &PromptContext) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Some(ProviderStep::Reply(text)) => Ok(text),
            Some(ProviderStep::Fail(error)) => Err(error),
            Some(ProviderStep::Delay(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(LlmError::NotConfigured),
        }
    }

    async fn ping(&self) -> Result<(), LlmError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A structured provider reply in the shape providers are prompted for.
pub fn json_reply(content: &str, confidence: f32) -> String {
    serde_json::json!({
        "content": content,
        "confidence": confidence,
        "actionItems": ["Follow up with a clinician"],
        "sources": [],
    })
    .to_string()
}

pub fn symptom_request(symptoms: &[&str]) -> AiRequest {
    AiRequest::SymptomAnalysis(SymptomAnalysisRequest {
        symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
        age: Some(30),
        duration: Some("2 days".to_string()),
        severity: Some(4),
        patient_id: None,
    })
}

pub fn emergency_request(situation: &str) -> AiRequest {
    AiRequest::EmergencyGuidance(EmergencyGuidanceRequest {
        situation: situation.to_string(),
        location: None,
        patient_id: None,
        notify_contact: None,
    })
}

pub fn chat_request(message: &str) -> AiRequest {
    AiRequest::HealthChat(HealthChatRequest {
        message: message.to_string(),
        history: Vec::new(),
        patient_id: None,
    })
}

/// A manual clock shared between components under test.
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::default())
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Symptom phrases, lowercase letters and spaces.
    pub fn arb_symptom() -> impl Strategy<Value = String> {
        "[a-z]{3,12}( [a-z]{3,12})?"
    }

    pub fn arb_symptom_request() -> impl Strategy<Value = AiRequest> {
        (
            prop::collection::vec(arb_symptom(), 1..6),
            prop::option::of(1u32..100),
            prop::option::of(1u8..=10),
        )
            .prop_map(|(symptoms, age, severity)| {
                AiRequest::SymptomAnalysis(SymptomAnalysisRequest {
                    symptoms,
                    age,
                    duration: None,
                    severity,
                    patient_id: None,
                })
            })
    }

    pub fn arb_health_status() -> impl Strategy<Value = HealthStatus> {
        prop_oneof![
            Just(HealthStatus::Healthy),
            Just(HealthStatus::Degraded),
            Just(HealthStatus::Unhealthy),
        ]
    }

    /// An IPv4 address string.
    pub fn arb_ipv4() -> impl Strategy<Value = String> {
        any::<[u8; 4]>().prop_map(|o| format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3]))
    }
}
