//! Deterministic rule-based answers used when every provider has failed.
//!
//! The output depends only on the request and the configured emergency
//! numbers. It is never cached and never fails.

use crate::operation::{AiRequest, SymptomAnalysisRequest};
use telecare_core::{ProviderResult, LOCAL_FALLBACK_PROVIDER};

/// Confidence stamped on every fallback result. Lower than any provider
/// result so clients can tell the two apart.
pub const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Phrases that warrant immediate emergency care regardless of context.
const RED_FLAGS: &[&str] = &[
    "chest pain",
    "difficulty breathing",
    "shortness of breath",
    "can't breathe",
    "cannot breathe",
    "unconscious",
    "unresponsive",
    "severe bleeding",
    "seizure",
    "stroke",
    "slurred speech",
    "face drooping",
    "suicidal",
    "overdose",
    "anaphylaxis",
    "coughing blood",
];

/// Severity at or above which symptoms are treated as urgent.
const URGENT_SEVERITY: u8 = 8;

struct Guidance {
    keywords: &'static [&'static str],
    summary: &'static str,
    steps: &'static [&'static str],
}

const EMERGENCY_GUIDANCE: &[Guidance] = &[
    Guidance {
        keywords: &["chest pain", "heart attack", "cardiac", "not breathing", "no pulse"],
        summary: "Possible cardiac emergency.",
        steps: &[
            "Keep the person seated and calm; loosen tight clothing",
            "If they stop breathing, start chest compressions (100-120 per minute)",
            "Use an AED if one is available",
        ],
    },
    Guidance {
        keywords: &["bleeding", "cut", "wound", "laceration"],
        summary: "Severe bleeding.",
        steps: &[
            "Apply firm, direct pressure with a clean cloth",
            "Keep pressure on; add layers rather than removing soaked cloth",
            "Raise the injured area above the heart if possible",
        ],
    },
    Guidance {
        keywords: &["choking", "can't breathe", "cannot breathe", "difficulty breathing"],
        summary: "Breathing difficulty or choking.",
        steps: &[
            "If choking, give up to 5 back blows then up to 5 abdominal thrusts",
            "Help the person sit upright if they are conscious",
            "Do not give food or drink",
        ],
    },
    Guidance {
        keywords: &["burn", "scald", "fire"],
        summary: "Burn injury.",
        steps: &[
            "Cool the burn under cool running water for 20 minutes",
            "Remove jewellery near the burn unless stuck to skin",
            "Cover loosely with cling film or a clean dressing",
        ],
    },
    Guidance {
        keywords: &["seizure", "convulsion", "fit"],
        summary: "Seizure.",
        steps: &[
            "Clear the area around the person and protect their head",
            "Do not restrain them or put anything in their mouth",
            "Once it stops, place them in the recovery position",
        ],
    },
    Guidance {
        keywords: &["stroke", "slurred speech", "face drooping", "arm weakness"],
        summary: "Possible stroke.",
        steps: &[
            "Note the time symptoms started",
            "Keep the person comfortable and do not give food or drink",
        ],
    },
    Guidance {
        keywords: &["unconscious", "unresponsive", "fainted", "collapsed"],
        summary: "Unresponsive person.",
        steps: &[
            "Check for breathing",
            "If breathing, place them in the recovery position",
            "If not breathing, start CPR",
        ],
    },
    Guidance {
        keywords: &["poison", "overdose", "swallowed"],
        summary: "Possible poisoning or overdose.",
        steps: &[
            "Do not induce vomiting",
            "Keep the container or substance to show responders",
        ],
    },
];

fn has_red_flag(text: &str) -> bool {
    RED_FLAGS.iter().any(|flag| text.contains(flag))
}

fn emergency_call_item(numbers: &[String]) -> String {
    if numbers.is_empty() {
        "Call your local emergency number immediately".to_string()
    } else {
        format!("Call emergency services immediately: {}", numbers.join(" or "))
    }
}

/// Append the emergency-call item unless some action item already names a
/// configured number.
pub fn ensure_emergency_numbers(action_items: &mut Vec<String>, numbers: &[String]) {
    let present = !numbers.is_empty()
        && action_items
            .iter()
            .any(|item| numbers.iter().any(|n| item.contains(n.as_str())));
    if !present {
        action_items.insert(0, emergency_call_item(numbers));
    }
}

fn symptom_fallback(
    request: &SymptomAnalysisRequest,
    text: &str,
    numbers: &[String],
) -> (String, Vec<String>) {
    let urgent = has_red_flag(text) || request.severity.is_some_and(|s| s >= URGENT_SEVERITY);

    if urgent {
        let content = "Some of the symptoms you reported can indicate a serious condition. \
                       Seek emergency care now."
            .to_string();
        let mut items =
            vec!["Do not drive yourself; ask someone to take you or call for help".to_string()];
        ensure_emergency_numbers(&mut items, numbers);
        return (content, items);
    }

    let mut items = Vec::new();
    if text.contains("fever") {
        items.push("Rest, stay hydrated and monitor your temperature".to_string());
    }
    if text.contains("cough") || text.contains("sore throat") {
        items.push("Warm fluids and rest can ease throat irritation".to_string());
    }
    if text.contains("headache") {
        items.push("Rest in a quiet, dark room and stay hydrated".to_string());
    }
    if text.contains("nausea") || text.contains("vomit") || text.contains("diarrh") {
        items.push("Sip clear fluids often to avoid dehydration".to_string());
    }
    if text.contains("rash") {
        items.push("Avoid scratching and note any spreading or swelling".to_string());
    }
    items.push(
        "Book an appointment with a clinician if symptoms persist beyond 3 days or worsen"
            .to_string(),
    );

    let content = "AI analysis is temporarily unavailable. Based on general guidance, \
                   your symptoms do not match common emergency warning signs. \
                   This is not a diagnosis."
        .to_string();
    (content, items)
}

fn emergency_fallback(text: &str, numbers: &[String]) -> (String, Vec<String>) {
    let mut items = vec![emergency_call_item(numbers)];
    let mut summaries = Vec::new();

    for guidance in EMERGENCY_GUIDANCE {
        if guidance.keywords.iter().any(|k| text.contains(k)) {
            summaries.push(guidance.summary);
            items.extend(guidance.steps.iter().map(|s| s.to_string()));
        }
    }

    if summaries.is_empty() {
        items.push("Stay with the person and keep them still and warm".to_string());
        items.push("Follow the dispatcher's instructions".to_string());
    }
    items.push("Do not hang up until told to".to_string());

    let content = if summaries.is_empty() {
        "Contact emergency services now. General first-aid steps follow.".to_string()
    } else {
        format!(
            "{} Contact emergency services now. First-aid steps follow.",
            summaries.join(" ")
        )
    };
    (content, items)
}

fn chat_fallback(text: &str, numbers: &[String]) -> (String, Vec<String>) {
    if has_red_flag(text) {
        let mut items = Vec::new();
        ensure_emergency_numbers(&mut items, numbers);
        return (
            "What you describe may need urgent attention. Please contact emergency services."
                .to_string(),
            items,
        );
    }
    (
        "The health assistant is temporarily unavailable. Please try again shortly, \
         or contact your clinician for advice."
            .to_string(),
        vec!["Contact your clinician for personalised advice".to_string()],
    )
}

/// Compute the rule-based answer for `request`.
pub fn local_fallback(request: &AiRequest, emergency_numbers: &[String]) -> ProviderResult {
    let text = request.heuristic_text();
    let (content, action_items) = match request {
        AiRequest::SymptomAnalysis(r) => symptom_fallback(r, &text, emergency_numbers),
        AiRequest::EmergencyGuidance(_) => emergency_fallback(&text, emergency_numbers),
        AiRequest::HealthChat(_) => chat_fallback(&text, emergency_numbers),
    };

    ProviderResult {
        content,
        confidence: FALLBACK_CONFIDENCE,
        sources: vec!["Telecare first-aid and triage rules".to_string()],
        action_items,
        provider_name: LOCAL_FALLBACK_PROVIDER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{EmergencyGuidanceRequest, HealthChatRequest};

    fn numbers() -> Vec<String> {
        vec!["112".to_string(), "911".to_string()]
    }

    fn symptoms(list: &[&str], severity: Option<u8>) -> AiRequest {
        AiRequest::SymptomAnalysis(SymptomAnalysisRequest {
            symptoms: list.iter().map(|s| s.to_string()).collect(),
            age: None,
            duration: None,
            severity,
            patient_id: None,
        })
    }

    #[test]
    fn test_red_flag_symptoms_are_urgent() {
        let result = local_fallback(&symptoms(&["Chest pain", "sweating"], None), &numbers());
        assert!(result.content.contains("emergency"));
        assert!(result.action_items.iter().any(|i| i.contains("112")));
        assert_eq!(result.provider_name, LOCAL_FALLBACK_PROVIDER);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_high_severity_is_urgent() {
        let result = local_fallback(&symptoms(&["back ache"], Some(9)), &numbers());
        assert!(result.action_items.iter().any(|i| i.contains("911")));
    }

    #[test]
    fn test_mild_symptoms_get_self_care() {
        let result = local_fallback(&symptoms(&["fever", "cough"], Some(3)), &numbers());
        assert!(result.action_items.iter().any(|i| i.contains("hydrated")));
        assert!(!result.action_items.iter().any(|i| i.contains("112")));
    }

    #[test]
    fn test_emergency_always_contains_numbers() {
        let request = AiRequest::EmergencyGuidance(EmergencyGuidanceRequest {
            situation: "something happened".to_string(),
            location: None,
            patient_id: None,
            notify_contact: None,
        });
        let result = local_fallback(&request, &numbers());
        assert!(result.action_items[0].contains("112"));
        assert!(result.action_items[0].contains("911"));
    }

    #[test]
    fn test_emergency_matches_category() {
        let request = AiRequest::EmergencyGuidance(EmergencyGuidanceRequest {
            situation: "My son has a bad burn from boiling water".to_string(),
            location: None,
            patient_id: None,
            notify_contact: None,
        });
        let result = local_fallback(&request, &numbers());
        assert!(result.content.contains("Burn"));
        assert!(result.action_items.iter().any(|i| i.contains("20 minutes")));
    }

    #[test]
    fn test_emergency_without_configured_numbers() {
        let request = AiRequest::EmergencyGuidance(EmergencyGuidanceRequest {
            situation: "fall".to_string(),
            location: None,
            patient_id: None,
            notify_contact: None,
        });
        let result = local_fallback(&request, &[]);
        assert!(result.action_items[0].contains("local emergency number"));
    }

    #[test]
    fn test_chat_red_flag() {
        let request = AiRequest::HealthChat(HealthChatRequest {
            message: "I have crushing chest pain".to_string(),
            history: vec![],
            patient_id: None,
        });
        let result = local_fallback(&request, &numbers());
        assert!(result.action_items.iter().any(|i| i.contains("112")));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let request = symptoms(&["headache"], None);
        assert_eq!(local_fallback(&request, &numbers()), local_fallback(&request, &numbers()));
    }

    #[test]
    fn test_ensure_emergency_numbers_is_idempotent() {
        let mut items = vec!["Call 112 now".to_string()];
        ensure_emergency_numbers(&mut items, &numbers());
        assert_eq!(items.len(), 1);

        let mut items = vec!["Stay calm".to_string()];
        ensure_emergency_numbers(&mut items, &numbers());
        assert_eq!(items.len(), 2);
        assert!(items[0].contains("112"));
    }
}
