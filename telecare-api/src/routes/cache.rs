//! Cache administration endpoints. Authentication required.
//!
//! - POST /api/cache/invalidate: evict by exact key, tag, or key pattern
//! - GET  /api/cache/stats

use axum::{extract::State, Json};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use telecare_storage::CacheStats;

use super::JsonBody;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthExtractor, Envelope, RequestContext};
use crate::state::AppState;

/// Invalidation selector. Exactly one field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateRequest {
    pub key: Option<String>,
    pub tag: Option<String>,
    /// Regular expression matched against cache keys
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selector<'a> {
    Key(&'a str),
    Tag(&'a str),
    Pattern(&'a str),
}

impl InvalidateRequest {
    fn selector(&self) -> ApiResult<Selector<'_>> {
        let chosen: Vec<Selector<'_>> = [
            self.key.as_deref().map(Selector::Key),
            self.tag.as_deref().map(Selector::Tag),
            self.pattern.as_deref().map(Selector::Pattern),
        ]
        .into_iter()
        .flatten()
        .collect();

        match chosen.as_slice() {
            [one] => Ok(*one),
            [] => Err(ApiError::validation_failed(
                "One of key, tag or pattern is required",
            )),
            _ => Err(ApiError::validation_failed(
                "Only one of key, tag or pattern may be given",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResult {
    pub invalidated: usize,
}

/// POST /api/cache/invalidate
pub async fn invalidate(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthExtractor(auth): AuthExtractor,
    JsonBody(req): JsonBody<InvalidateRequest>,
) -> ApiResult<Json<Envelope<InvalidateResult>>> {
    let invalidated = match req.selector()? {
        Selector::Key(key) => usize::from(state.cache.invalidate(key)),
        Selector::Tag(tag) => state.cache.invalidate_by_tag(tag),
        Selector::Pattern(pattern) => {
            let regex = Regex::new(pattern).map_err(|e| {
                ApiError::invalid_input(format!("Invalid pattern: {}", e))
                    .with_details(json!({ "field": "pattern" }))
            })?;
            state.cache.invalidate_by_pattern(&regex)
        }
    };

    tracing::info!(
        request_id = %ctx.request_id,
        user_id = %auth.user_id,
        invalidated,
        "Cache entries invalidated"
    );

    Ok(ctx.envelope(InvalidateResult { invalidated }))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsBody {
    pub stats: CacheStats,
    pub hit_rate: f64,
    pub utilization: f64,
}

/// GET /api/cache/stats
pub async fn stats(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthExtractor(_auth): AuthExtractor,
) -> ApiResult<Json<Envelope<CacheStatsBody>>> {
    let stats = state.cache.stats();
    Ok(ctx.envelope(CacheStatsBody {
        hit_rate: stats.hit_rate(),
        utilization: stats.utilization(),
        stats,
    }))
}
