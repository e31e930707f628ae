//! Defensive normalization of raw provider output.
//!
//! Models are asked for JSON but routinely wrap it in prose or code fences,
//! or ignore the instruction entirely. Parsing tries, in order:
//!
//! 1. the first balanced `{...}` object that deserializes with usable content
//! 2. the whole text as plain prose, with bullet lines as action items
//!
//! Only an empty response is rejected.

use serde::Deserialize;
use telecare_core::{LlmError, ProviderResult};

use crate::fallback::FALLBACK_CONFIDENCE;

/// Confidence assumed when a structured response omits it.
pub const DEFAULT_STRUCTURED_CONFIDENCE: f32 = 0.8;

/// Confidence assigned to unstructured prose responses.
pub const PLAIN_TEXT_CONFIDENCE: f32 = 0.6;

/// Floor for self-reported provider confidence. Always above
/// [`FALLBACK_CONFIDENCE`].
pub const MIN_PROVIDER_CONFIDENCE: f32 = FALLBACK_CONFIDENCE + 0.05;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawAiPayload {
    #[serde(alias = "response", alias = "answer", alias = "analysis", alias = "guidance")]
    content: String,
    confidence: Option<f32>,
    #[serde(alias = "sources_list")]
    sources: Vec<String>,
    #[serde(alias = "action_items", alias = "recommendations", alias = "steps")]
    action_items: Vec<String>,
}

/// Find the first balanced JSON object in `text`.
///
/// String literals are tracked so braces inside them do not affect nesting.
/// Returns the candidate slice; it is not guaranteed to be valid JSON.
pub fn extract_json_object(text: &str) -> Option<&str> {
    json_object_candidates(text).next()
}

/// Non-overlapping balanced objects, left to right.
///
/// Scanning resumes after each object and stops at the first `{` that never
/// closes, so every byte is visited at most once.
fn json_object_candidates(text: &str) -> impl Iterator<Item = &str> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        let start = offset + text.get(offset..)?.find('{')?;
        match balanced_object_end(&text[start..]) {
            Some(len) => {
                offset = start + len;
                Some(&text[start..offset])
            }
            None => {
                offset = text.len();
                None
            }
        }
    })
}

fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_structured(raw: &str) -> Option<RawAiPayload> {
    json_object_candidates(raw)
        .filter_map(|candidate| serde_json::from_str::<RawAiPayload>(candidate).ok())
        .find(|payload| !payload.content.trim().is_empty())
}

fn bullet_text(line: &str) -> Option<&str> {
    let line = line.trim();
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    // Numbered items: "1. ", "2) "
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }
    None
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalize raw provider output into a [`ProviderResult`].
pub fn parse_provider_response(provider: &str, raw: &str) -> Result<ProviderResult, LlmError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "empty response".to_string(),
        });
    }

    if let Some(payload) = parse_structured(trimmed) {
        let confidence = payload
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_STRUCTURED_CONFIDENCE)
            .clamp(MIN_PROVIDER_CONFIDENCE, 1.0);
        return Ok(ProviderResult {
            content: payload.content.trim().to_string(),
            confidence,
            sources: clean_list(payload.sources),
            action_items: clean_list(payload.action_items),
            provider_name: provider.to_string(),
        });
    }

    let action_items = trimmed
        .lines()
        .filter_map(bullet_text)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ProviderResult {
        content: trimmed.to_string(),
        confidence: PLAIN_TEXT_CONFIDENCE,
        sources: Vec::new(),
        action_items,
        provider_name: provider.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_bare_json() {
        let raw = r#"{"content": "Likely a cold", "confidence": 0.7, "actionItems": ["Rest"]}"#;
        let result = parse_provider_response("anthropic", raw).unwrap();
        assert_eq!(result.content, "Likely a cold");
        assert!((result.confidence - 0.7).abs() < f32::EPSILON);
        assert_eq!(result.action_items, vec!["Rest"]);
        assert_eq!(result.provider_name, "anthropic");
    }

    #[test]
    fn test_parses_fenced_json_with_prose() {
        let raw = concat!(
            "Here is my answer:\n```json\n",
            r#"{"answer": "Hydrate", "recommendations": ["Drink water"]}"#,
            "\n```\nStay safe."
        );
        let result = parse_provider_response("openai", raw).unwrap();
        assert_eq!(result.content, "Hydrate");
        assert_eq!(result.action_items, vec!["Drink water"]);
        assert!((result.confidence - DEFAULT_STRUCTURED_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_extraction() {
        let raw = r#"note {"content": "use {braces} carefully", "confidence": 2.5}"#;
        let result = parse_provider_response("p", raw).unwrap();
        assert_eq!(result.content, "use {braces} carefully");
        assert_eq!(result.confidence, 1.0, "confidence is clamped");
    }

    #[test]
    fn test_low_self_reported_confidence_stays_above_fallback() {
        let raw = r#"{"content": "Rest", "confidence": 0.05}"#;
        let result = parse_provider_response("p", raw).unwrap();
        assert!(result.confidence > FALLBACK_CONFIDENCE);
        assert_eq!(result.confidence, MIN_PROVIDER_CONFIDENCE);
    }

    #[test]
    fn test_brace_heavy_output_is_scanned_once() {
        let raw = format!("{}{}", "{".repeat(50_000), r#""content": "x""#);
        assert_eq!(extract_json_object(&raw), None);
        let result = parse_provider_response("p", &raw).unwrap();
        assert_eq!(result.confidence, PLAIN_TEXT_CONFIDENCE);
    }

    #[test]
    fn test_candidates_do_not_overlap() {
        let raw = r#"{"a": {"content": "inner"}} {"content": "outer"}"#;
        let found: Vec<&str> = json_object_candidates(raw).collect();
        assert_eq!(found, vec![r#"{"a": {"content": "inner"}}"#, r#"{"content": "outer"}"#]);
    }

    #[test]
    fn test_skips_objects_without_content() {
        let raw = r#"{"meta": 1} then {"content": "real answer"}"#;
        let result = parse_provider_response("p", raw).unwrap();
        assert_eq!(result.content, "real answer");
    }

    #[test]
    fn test_plain_text_fallback_extracts_bullets() {
        let raw = "You may have a mild infection.\n- Rest for two days\n* Drink fluids\n\
                   2) See a doctor if fever persists";
        let result = parse_provider_response("p", raw).unwrap();
        assert!(result.content.starts_with("You may have"));
        assert_eq!(
            result.action_items,
            vec!["Rest for two days", "Drink fluids", "See a doctor if fever persists"]
        );
        assert!((result.confidence - PLAIN_TEXT_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unbalanced_json_falls_back_to_text() {
        let raw = "{\"content\": \"cut off";
        let result = parse_provider_response("p", raw).unwrap();
        assert_eq!(result.content, raw);
    }

    #[test]
    fn test_empty_response_is_invalid() {
        let err = parse_provider_response("p", "   \n").unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("x {\"a\": {\"b\": 1}} y"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("no json"), None);
    }
}
