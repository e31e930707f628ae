//! Error types for Telecare operations

use thiserror::Error;

/// Storage and collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {collection} with id {id}")]
    NotFound { collection: String, id: String },

    #[error("Insert failed for {collection}: {reason}")]
    InsertFailed { collection: String, reason: String },

    #[error("Update failed for {collection} with id {id}: {reason}")]
    UpdateFailed {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Message delivery to {recipient} failed: {reason}")]
    DeliveryFailed { recipient: String, reason: String },
}

/// Failure of a single AI provider attempt.
///
/// These are absorbed by the orchestrator and never become HTTP responses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No AI provider configured")]
    NotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Invalid API key for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },

    #[error("Operation deadline exceeded before {provider} could be tried")]
    DeadlineExceeded { provider: String },
}

impl LlmError {
    /// Short machine-readable label, used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::NotConfigured => "not_configured",
            LlmError::RequestFailed { .. } => "request_failed",
            LlmError::RateLimited { .. } => "rate_limited",
            LlmError::InvalidApiKey { .. } => "invalid_api_key",
            LlmError::InvalidResponse { .. } => "invalid_response",
            LlmError::Timeout { .. } => "timeout",
            LlmError::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }
}

/// Validation errors for client-supplied data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Field {field} exceeds maximum length of {max}")]
    TooLong { field: String, max: usize },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Insecure configuration for production: {reason}")]
    InsecureForProduction { reason: String },
}

/// Master error type for all Telecare errors.
#[derive(Debug, Clone, Error)]
pub enum TelecareError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Telecare operations.
pub type TelecareResult<T> = Result<T, TelecareError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            collection: "patients".to_string(),
            id: "p-42".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Record not found"));
        assert!(msg.contains("patients"));
        assert!(msg.contains("p-42"));
    }

    #[test]
    fn test_llm_error_display_timeout() {
        let err = LlmError::Timeout {
            provider: "anthropic".to_string(),
            after_ms: 6000,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("anthropic"));
        assert!(msg.contains("6000"));
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "TELECARE_RATE_LIMIT_CHAT".to_string(),
            value: "abc".to_string(),
            reason: "expected <requests>/<windowMs>".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("TELECARE_RATE_LIMIT_CHAT"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_telecare_error_from_variants() {
        let storage = TelecareError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, TelecareError::Storage(_)));

        let llm = TelecareError::from(LlmError::NotConfigured);
        assert!(matches!(llm, TelecareError::Llm(_)));

        let validation = TelecareError::from(ValidationError::RequiredFieldMissing {
            field: "symptoms".to_string(),
        });
        assert!(matches!(validation, TelecareError::Validation(_)));

        let config = TelecareError::from(ConfigError::MissingRequired {
            field: "TELECARE_JWT_SECRET".to_string(),
        });
        assert!(matches!(config, TelecareError::Config(_)));
    }
}
