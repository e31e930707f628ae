//! Health Check Endpoints
//!
//! - GET /health: run every probe and report the aggregate
//! - HEAD /health: same checks, status code only
//! - GET /health/live: process liveness, runs no probes
//! - GET /health/:name: run a single named probe
//!
//! Anything unhealthy answers 503 so load balancers stop routing here;
//! degraded still answers 200.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use telecare_core::{HealthStatus, ServiceHealth, SystemHealth};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn status_code_for(status: HealthStatus) -> StatusCode {
    if status.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
pub async fn system_health(State(state): State<AppState>) -> (StatusCode, Json<SystemHealth>) {
    let health = state.health.run_all().await;
    (status_code_for(health.overall), Json(health))
}

/// HEAD /health
pub async fn system_health_head(State(state): State<AppState>) -> StatusCode {
    status_code_for(state.health.run_all().await.overall)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessResponse {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub version: &'static str,
}

/// GET /health/live
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(LivenessResponse {
            status: HealthStatus::Healthy,
            uptime_secs: state.health.uptime_secs(),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// GET /health/:name
pub async fn service_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<ServiceHealth>)> {
    let health = state
        .health
        .run_check(&name)
        .await
        .ok_or_else(|| ApiError::not_found(format!("No health check named {}", name)))?;
    Ok((status_code_for(health.status), Json(health)))
}
