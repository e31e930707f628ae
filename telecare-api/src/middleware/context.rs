//! Per-request state the pipeline hands to handlers, and the success
//! envelope handlers answer with.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use telecare_core::ResponseSource;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::rate_limit::RateLimitDecision;

/// Identity and timing of the request being served.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub route: &'static str,
    pub received_at: DateTime<Utc>,
    pub started: Instant,
}

impl RequestContext {
    /// Milliseconds since the pipeline received the request.
    pub fn processing_time_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Wrap `data` in the success envelope.
    pub fn envelope<T: Serialize>(&self, data: T) -> Json<Envelope<T>> {
        self.envelope_with_source(data, None)
    }

    /// Wrap an AI answer, recording where it came from.
    pub fn envelope_with_source<T: Serialize>(
        &self,
        data: T,
        source: Option<ResponseSource>,
    ) -> Json<Envelope<T>> {
        Json(Envelope {
            data,
            metadata: ResponseMetadata {
                processing_time: self.processing_time_ms(),
                timestamp: Utc::now(),
                request_id: self.request_id.clone(),
                source,
            },
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| {
                ApiError::internal_error(
                    "Request context missing; route is not wrapped by the pipeline",
                )
            })
    }
}

/// Rate-limit outcome for the current request, when the route is limited.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo(pub Option<RateLimitDecision>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RateLimitInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RateLimitInfo(parts.extensions.get::<RateLimitDecision>().copied()))
    }
}

/// Authenticated caller. Rejects with 401 when the pipeline did not
/// authenticate the request.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Response metadata attached to every success body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Milliseconds spent in the pipeline so far
    pub processing_time: u64,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ResponseSource>,
}

/// Success body: the payload's fields plus `metadata`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    #[serde(flatten)]
    pub data: T,
    pub metadata: ResponseMetadata,
}
