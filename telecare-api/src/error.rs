//! Error Types for Telecare API
//!
//! This module defines error handling for the HTTP layer:
//! - `ErrorCode` enum for categorizing errors
//! - `ApiError` struct rendered as the uniform error envelope
//! - `IntoResponse` implementation for Axum
//!
//! Every error response body has the shape
//! `{"error": ..., "code": ..., "message": ..., "details": ..., "requestId": ...}`.
//! The `ApiError` itself also travels in the response extensions so the
//! middleware pipeline can log it once and sanitize it outside development.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use telecare_core::{ConfigError, StorageError, TelecareError, ValidationError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Machine-readable error code, serialized as `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No credentials, or an unknown API key
    Unauthorized,
    InvalidToken,
    TokenExpired,
    /// Credentials are valid but the route is not open to them
    Forbidden,

    /// A field is present but out of range or too long
    ValidationFailed,
    /// Body is not JSON or has the wrong shape
    InvalidInput,
    MissingField,

    NotFound,

    TooManyRequests,

    /// Every AI provider and the local fallback were exhausted
    UpstreamUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed | ErrorCode::InvalidInput | ErrorCode::MissingField => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::NotFound => StatusCode::NOT_FOUND,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::UpstreamUnavailable | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Title used for the `error` field of the envelope.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::InvalidToken => "Invalid authentication token",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::InvalidInput => "Malformed request",
            ErrorCode::MissingField => "Missing required field",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::TooManyRequests => "Too many requests",
            ErrorCode::UpstreamUnavailable => "Service temporarily unavailable",
            ErrorCode::InternalError => "Internal server error",
        }
    }

    /// Whether the message may contain internal detail that must be hidden
    /// from clients outside development.
    pub fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Error envelope returned by every failing route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Title derived from the code
    pub error: String,

    pub code: ErrorCode,

    /// Human-readable detail message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Optional additional details (field errors etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Request correlation id, filled in by the pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Seconds until a rate-limited client may retry. Rendered as a header.
    #[serde(skip)]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Error with a client-facing message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: code.default_message().to_string(),
            code,
            message: Some(message.into()),
            details: None,
            request_id: None,
            retry_after_secs: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            error: code.default_message().to_string(),
            code,
            message: None,
            details: None,
            request_id: None,
            retry_after_secs: None,
        }
    }

    /// Attach structured details, e.g. `{"field": "symptoms"}`.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Copy of this error with internal detail removed.
    pub fn sanitized(&self) -> Self {
        Self {
            error: self.code.default_message().to_string(),
            code: self.code,
            message: None,
            details: None,
            request_id: self.request_id.clone(),
            retry_after_secs: self.retry_after_secs,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// 429 with `retryAfter` in the details and a `Retry-After` header.
    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Rate limit exceeded, retry in {secs}s"),
            None => "Rate limit exceeded".to_string(),
        };
        let mut err = Self::new(ErrorCode::TooManyRequests, message);
        err.retry_after_secs = retry_after_secs;
        if let Some(secs) = retry_after_secs {
            err.details = Some(serde_json::json!({ "retryAfter": secs }));
        }
        err
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}: {}", self.code, self.error),
        }
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Render the envelope and keep a copy in the response extensions.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs;
        let mut response = (status, Json(&self)).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response.extensions_mut().insert(self);
        response
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::RequiredFieldMissing { field }
            | ValidationError::InvalidValue { field, .. }
            | ValidationError::TooLong { field, .. } => field.clone(),
        };
        let code = match err {
            ValidationError::RequiredFieldMissing { .. } => ErrorCode::MissingField,
            _ => ErrorCode::ValidationFailed,
        };
        ApiError::new(code, err.to_string()).with_details(serde_json::json!({ "field": field }))
    }
}

impl From<TelecareError> for ApiError {
    fn from(err: TelecareError) -> Self {
        match err {
            TelecareError::Validation(e) => e.into(),
            TelecareError::Storage(StorageError::NotFound { collection, id }) => {
                ApiError::not_found(format!("{} record {} not found", collection, id))
            }
            TelecareError::Llm(e) => ApiError::upstream_unavailable(e.to_string()),
            other => ApiError::internal_error(other.to_string()),
        }
    }
}

/// Startup configuration problems. Never reaches a client.
impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ErrorCode::UpstreamUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(ErrorCode::InternalError.is_internal());
        assert!(!ErrorCode::NotFound.is_internal());
    }

    #[test]
    fn test_envelope_shape() -> Result<(), serde_json::Error> {
        let err = ApiError::unauthorized("Invalid API key").with_request_id("req-1");
        let json = serde_json::to_value(&err)?;

        assert_eq!(json["error"], "Authentication required");
        assert_eq!(json["code"], "UNAUTHORIZED");
        assert_eq!(json["message"], "Invalid API key");
        assert_eq!(json["requestId"], "req-1");
        assert!(json.get("details").is_none());
        Ok(())
    }

    #[test]
    fn test_sanitized_drops_detail() {
        let err = ApiError::internal_error("db password wrong at 10.0.0.3")
            .with_details(serde_json::json!({"trace": "..."}))
            .with_request_id("req-2");
        let clean = err.sanitized();
        assert!(clean.message.is_none());
        assert!(clean.details.is_none());
        assert_eq!(clean.request_id.as_deref(), Some("req-2"));
        assert_eq!(clean.error, "Internal server error");
    }

    #[test]
    fn test_too_many_requests_carries_retry_after() {
        let response = ApiError::too_many_requests(Some(42)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(axum::http::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
        assert!(response.extensions().get::<ApiError>().is_some());
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: ApiError = ValidationError::RequiredFieldMissing {
            field: "symptoms".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert_eq!(err.details, Some(serde_json::json!({"field": "symptoms"})));
    }

    #[test]
    fn test_not_found_conversion() {
        let err: ApiError = TelecareError::from(StorageError::NotFound {
            collection: "patients".to_string(),
            id: "p1".to_string(),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
