//! HTTP AI provider implementations
//!
//! Each vendor gets a thin client (auth headers, outbound pacing, error
//! mapping) and an [`AiProvider`](crate::AiProvider) on top of it.

pub mod anthropic;
pub mod openai;

pub use anthropic::{AnthropicClient, AnthropicProvider};
pub use openai::{OpenAIClient, OpenAIProvider};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use std::num::NonZeroU32;
use telecare_core::LlmError;

/// Build an outbound pacer allowing `requests_per_minute` calls.
pub(crate) fn outbound_pacer(requests_per_minute: u32) -> DefaultDirectRateLimiter {
    let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_minute(rpm))
}

pub(crate) fn request_failed(provider: &str, status: u16, message: impl Into<String>) -> LlmError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    }
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> LlmError {
    LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

/// Map a non-success HTTP status and vendor error message to an [`LlmError`].
pub(crate) fn status_error(provider: &str, status: StatusCode, message: String) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider: provider.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidApiKey {
            provider: provider.to_string(),
        },
        _ => request_failed(provider, status.as_u16(), message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error("openai", StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            status_error("openai", StatusCode::UNAUTHORIZED, String::new()),
            LlmError::InvalidApiKey { .. }
        ));
        assert_eq!(
            status_error("openai", StatusCode::BAD_GATEWAY, "down".to_string()),
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                status: 502,
                message: "down".to_string(),
            }
        );
    }

    #[test]
    fn test_outbound_pacer_allows_first_call() {
        let pacer = outbound_pacer(0);
        assert!(pacer.check().is_ok());
    }
}
