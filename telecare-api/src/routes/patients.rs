//! Patient record endpoints. Authentication required.
//!
//! Updating a patient evicts every cached AI answer tagged with that
//! patient, so later answers never reflect the old record.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use telecare_storage::PatientRecord;

use super::JsonBody;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthExtractor, Envelope, RequestContext};
use crate::state::AppState;

/// Body of a patient update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdated {
    pub patient: PatientRecord,
    /// Cached AI answers evicted because they referenced this patient
    pub invalidated_cache_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientBody {
    pub patient: PatientRecord,
}

/// Cache tag carried by every AI answer produced for `patient_id`.
pub fn patient_cache_tag(patient_id: &str) -> String {
    format!("patient:{}", patient_id)
}

/// GET /api/patients/:id
pub async fn get_patient(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthExtractor(_auth): AuthExtractor,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<PatientBody>>> {
    let patient = state
        .patients
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Patient {} not found", id)))?;
    Ok(ctx.envelope(PatientBody { patient }))
}

/// PUT /api/patients/:id
pub async fn update_patient(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<Map<String, Value>>,
) -> ApiResult<Json<Envelope<PatientUpdated>>> {
    if patch.is_empty() {
        return Err(ApiError::validation_failed("Update must contain at least one field"));
    }

    let patient = state.patients.update(&id, patch).await?;
    let invalidated = state.cache.invalidate_by_tag(&patient_cache_tag(&id));

    tracing::info!(
        request_id = %ctx.request_id,
        user_id = %auth.user_id,
        invalidated,
        "Patient updated"
    );

    Ok(ctx.envelope(PatientUpdated {
        patient,
        invalidated_cache_entries: invalidated,
    }))
}
