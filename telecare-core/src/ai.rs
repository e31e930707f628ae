//! Normalized AI result types

use serde::{Deserialize, Serialize};

/// Provider name stamped on results produced by the local rule-based fallback.
pub const LOCAL_FALLBACK_PROVIDER: &str = "local-fallback";

/// A provider response normalized into the shape every route returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub content: String,
    /// Confidence in `[0.0, 1.0]`
    pub confidence: f32,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    pub provider_name: String,
}

impl ProviderResult {
    pub fn is_fallback(&self) -> bool {
        self.provider_name == LOCAL_FALLBACK_PROVIDER
    }
}

/// Where a returned result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    Provider,
    LocalFallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Provider => "provider",
            ResponseSource::LocalFallback => "local_fallback",
        }
    }
}
