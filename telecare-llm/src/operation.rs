//! Logical AI operations.
//!
//! Each request type knows how to validate and normalize itself, how to derive
//! its cache key and tags, and how to phrase its prompt. Prompt wording is
//! intentionally plain; callers should not depend on it.

use crate::provider::PromptContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use telecare_core::{content_digest, ValidationError};

const MAX_TEXT_LEN: usize = 4000;
const MAX_SYMPTOMS: usize = 50;
const MAX_HISTORY_TURNS: usize = 20;

/// Operation class. Used as cache tag, cache key prefix, log field and
/// metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SymptomAnalysis,
    EmergencyGuidance,
    HealthChat,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::SymptomAnalysis => "symptom_analysis",
            OperationKind::EmergencyGuidance => "emergency_guidance",
            OperationKind::HealthChat => "health_chat",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for symptom analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomAnalysisRequest {
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub duration: Option<String>,
    /// Self-reported severity, 1 to 10
    #[serde(default)]
    pub severity: Option<u8>,
    #[serde(default)]
    pub patient_id: Option<String>,
}

/// Request body for emergency guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyGuidanceRequest {
    pub situation: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    /// Phone number to text the guidance to
    #[serde(default)]
    pub notify_contact: Option<String>,
}

/// One prior exchange in a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Request body for free-form health chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub patient_id: Option<String>,
}

/// A logical AI operation routed through the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum AiRequest {
    SymptomAnalysis(SymptomAnalysisRequest),
    EmergencyGuidance(EmergencyGuidanceRequest),
    HealthChat(HealthChatRequest),
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        });
    }
    Ok(())
}

impl AiRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            AiRequest::SymptomAnalysis(_) => OperationKind::SymptomAnalysis,
            AiRequest::EmergencyGuidance(_) => OperationKind::EmergencyGuidance,
            AiRequest::HealthChat(_) => OperationKind::HealthChat,
        }
    }

    pub fn patient_id(&self) -> Option<&str> {
        let id = match self {
            AiRequest::SymptomAnalysis(r) => r.patient_id.as_deref(),
            AiRequest::EmergencyGuidance(r) => r.patient_id.as_deref(),
            AiRequest::HealthChat(r) => r.patient_id.as_deref(),
        };
        id.filter(|id| !id.trim().is_empty())
    }

    /// Reject malformed client input before any provider is called.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            AiRequest::SymptomAnalysis(r) => {
                if r.symptoms.iter().all(|s| s.trim().is_empty()) {
                    return Err(ValidationError::RequiredFieldMissing {
                        field: "symptoms".to_string(),
                    });
                }
                if r.symptoms.len() > MAX_SYMPTOMS {
                    return Err(ValidationError::InvalidValue {
                        field: "symptoms".to_string(),
                        reason: format!("at most {} symptoms allowed", MAX_SYMPTOMS),
                    });
                }
                for symptom in &r.symptoms {
                    if symptom.chars().count() > MAX_TEXT_LEN {
                        return Err(ValidationError::TooLong {
                            field: "symptoms".to_string(),
                            max: MAX_TEXT_LEN,
                        });
                    }
                }
                if let Some(severity) = r.severity {
                    if !(1..=10).contains(&severity) {
                        return Err(ValidationError::InvalidValue {
                            field: "severity".to_string(),
                            reason: "must be between 1 and 10".to_string(),
                        });
                    }
                }
                Ok(())
            }
            AiRequest::EmergencyGuidance(r) => require_text("situation", &r.situation),
            AiRequest::HealthChat(r) => {
                require_text("message", &r.message)?;
                if r.history.len() > MAX_HISTORY_TURNS {
                    return Err(ValidationError::InvalidValue {
                        field: "history".to_string(),
                        reason: format!("at most {} turns allowed", MAX_HISTORY_TURNS),
                    });
                }
                Ok(())
            }
        }
    }

    /// Canonical form of the input. Requests that differ only in case,
    /// whitespace or symptom order normalize identically.
    pub fn normalized_input(&self) -> String {
        match self {
            AiRequest::SymptomAnalysis(r) => {
                let mut symptoms: Vec<String> = r
                    .symptoms
                    .iter()
                    .map(|s| normalize_text(s))
                    .filter(|s| !s.is_empty())
                    .collect();
                symptoms.sort();
                symptoms.dedup();
                format!(
                    "symptoms={}|age={}|duration={}|severity={}",
                    symptoms.join(","),
                    r.age.map(|a| a.to_string()).unwrap_or_default(),
                    r.duration.as_deref().map(normalize_text).unwrap_or_default(),
                    r.severity.map(|s| s.to_string()).unwrap_or_default(),
                )
            }
            AiRequest::EmergencyGuidance(r) => format!(
                "situation={}|location={}",
                normalize_text(&r.situation),
                r.location.as_deref().map(normalize_text).unwrap_or_default(),
            ),
            AiRequest::HealthChat(r) => {
                let history = r
                    .history
                    .iter()
                    .map(|t| format!("{}:{}", normalize_text(&t.role), normalize_text(&t.content)))
                    .collect::<Vec<_>>()
                    .join(";");
                format!("message={}|history={}", normalize_text(&r.message), history)
            }
        }
    }

    /// Content-derived cache key: `<operation>:<sha256 of normalized input>`.
    ///
    /// The patient id is part of the key so one patient's answer is never
    /// served to another.
    pub fn cache_key(&self) -> String {
        let material = format!(
            "{}|patient={}",
            self.normalized_input(),
            self.patient_id().unwrap_or_default()
        );
        format!("{}:{}", self.kind(), content_digest(material.as_bytes()))
    }

    /// Tags attached to the cached result.
    pub fn cache_tags(&self) -> Vec<String> {
        let mut tags = vec![self.kind().as_str().to_string()];
        if let Some(id) = self.patient_id() {
            tags.push(format!("patient:{}", id));
        }
        tags
    }

    /// Free text scanned by the local fallback heuristics.
    pub fn heuristic_text(&self) -> String {
        match self {
            AiRequest::SymptomAnalysis(r) => normalize_text(&r.symptoms.join(" ")),
            AiRequest::EmergencyGuidance(r) => normalize_text(&r.situation),
            AiRequest::HealthChat(r) => normalize_text(&r.message),
        }
    }

    /// User prompt plus generation settings for providers.
    pub fn prompt(&self) -> (String, PromptContext) {
        const JSON_SHAPE: &str = "Respond with a JSON object: \
            {\"content\": string, \"confidence\": number between 0 and 1, \
            \"actionItems\": [string], \"sources\": [string]}.";

        match self {
            AiRequest::SymptomAnalysis(r) => {
                let mut prompt = format!("Symptoms: {}", r.symptoms.join(", "));
                if let Some(age) = r.age {
                    prompt.push_str(&format!("\nAge: {}", age));
                }
                if let Some(duration) = &r.duration {
                    prompt.push_str(&format!("\nDuration: {}", duration));
                }
                if let Some(severity) = r.severity {
                    prompt.push_str(&format!("\nSeverity (1-10): {}", severity));
                }
                let system = format!(
                    "You are a careful medical triage assistant. Assess the reported \
                     symptoms, list possible causes without diagnosing, and say when to \
                     seek in-person care. {}",
                    JSON_SHAPE
                );
                (prompt, PromptContext::new(system).with_temperature(0.2))
            }
            AiRequest::EmergencyGuidance(r) => {
                let mut prompt = format!("Emergency: {}", r.situation);
                if let Some(location) = &r.location {
                    prompt.push_str(&format!("\nLocation: {}", location));
                }
                let system = format!(
                    "You give immediate first-aid guidance for emergencies. Keep steps \
                     short and ordered. Always tell the user to contact emergency services. {}",
                    JSON_SHAPE
                );
                (
                    prompt,
                    PromptContext::new(system)
                        .with_temperature(0.0)
                        .with_max_tokens(600),
                )
            }
            AiRequest::HealthChat(r) => {
                let mut prompt = String::new();
                for turn in &r.history {
                    prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
                }
                prompt.push_str(&format!("user: {}", r.message));
                let system = format!(
                    "You are a friendly health information assistant. You do not diagnose. \
                     Encourage professional care where appropriate. {}",
                    JSON_SHAPE
                );
                (prompt, PromptContext::new(system).with_temperature(0.5))
            }
        }
    }
}
