//! AI-backed endpoints.
//!
//! - POST /api/symptoms/analyze
//! - POST /api/emergency/guidance
//! - POST /api/chat
//!
//! Provider failures never surface here: the orchestrator always returns an
//! answer, falling back to local rules when every provider fails.

use axum::{extract::State, Json};
use serde::Serialize;
use telecare_core::{truncate_message, ProviderResult, StorageError, TelecareError};
use telecare_llm::{
    AiRequest, EmergencyGuidanceRequest, HealthChatRequest, OrchestratedResponse,
    SymptomAnalysisRequest,
};

use super::JsonBody;
use crate::error::ApiResult;
use crate::middleware::{Envelope, RequestContext};
use crate::state::AppState;
use crate::telemetry::with_metrics;

/// Longest situation excerpt included in an emergency text message.
const SMS_SITUATION_MAX_CHARS: usize = 120;

/// AI answer body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnswer {
    #[serde(flatten)]
    pub result: ProviderResult,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationStatus>,
}

/// Outcome of the optional emergency text message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum NotificationStatus {
    Sent {
        #[serde(rename = "deliveryId")]
        delivery_id: String,
    },
    Failed { reason: String },
}

async fn orchestrate(
    state: &AppState,
    ctx: &RequestContext,
    request: &AiRequest,
) -> ApiResult<OrchestratedResponse> {
    request.validate()?;

    let response = state.orchestrator.execute(request).await;
    let operation = request.kind();

    tracing::info!(
        request_id = %ctx.request_id,
        operation = %operation,
        source = response.source.as_str(),
        provider = %response.result.provider_name,
        attempts = response.attempts.len(),
        "AI operation answered"
    );
    with_metrics(|m| m.record_ai_response(operation.as_str(), &response));
    Ok(response)
}

fn answer(
    ctx: &RequestContext,
    response: OrchestratedResponse,
    notification: Option<NotificationStatus>,
) -> Json<Envelope<AiAnswer>> {
    let source = response.source;
    ctx.envelope_with_source(
        AiAnswer {
            cached: source == telecare_core::ResponseSource::Cache,
            result: response.result,
            notification,
        },
        Some(source),
    )
}

/// POST /api/symptoms/analyze
pub async fn analyze_symptoms(
    State(state): State<AppState>,
    ctx: RequestContext,
    JsonBody(body): JsonBody<SymptomAnalysisRequest>,
) -> ApiResult<Json<Envelope<AiAnswer>>> {
    let request = AiRequest::SymptomAnalysis(body);
    let response = orchestrate(&state, &ctx, &request).await?;
    Ok(answer(&ctx, response, None))
}

/// POST /api/emergency/guidance
///
/// Always answers with actionable steps including the configured emergency
/// numbers. When `notifyContact` is given the guidance is also texted; a
/// failed delivery is reported in the body, never as an error status.
pub async fn emergency_guidance(
    State(state): State<AppState>,
    ctx: RequestContext,
    JsonBody(body): JsonBody<EmergencyGuidanceRequest>,
) -> ApiResult<Json<Envelope<AiAnswer>>> {
    let contact = body
        .notify_contact
        .clone()
        .filter(|c| !c.trim().is_empty());
    let situation = body.situation.clone();
    let request = AiRequest::EmergencyGuidance(body);
    let response = orchestrate(&state, &ctx, &request).await?;

    let notification = match contact {
        Some(to) => Some(notify_contact(&state, &ctx, &to, &situation, &response.result).await),
        None => None,
    };
    Ok(answer(&ctx, response, notification))
}

async fn notify_contact(
    state: &AppState,
    ctx: &RequestContext,
    to: &str,
    situation: &str,
    result: &ProviderResult,
) -> NotificationStatus {
    let first_step = result
        .action_items
        .first()
        .map(String::as_str)
        .unwrap_or("Call emergency services");
    let body = format!(
        "Telecare emergency alert: {}. {}",
        truncate_message(situation, SMS_SITUATION_MAX_CHARS),
        first_step
    );

    match state.messenger.send_text(to, &body).await {
        Ok(delivery_id) => {
            tracing::info!(request_id = %ctx.request_id, "Emergency contact notified");
            NotificationStatus::Sent { delivery_id }
        }
        Err(e) => {
            // The recipient stays out of logs
            let reason = match e {
                TelecareError::Storage(StorageError::DeliveryFailed { reason, .. }) => reason,
                other => other.to_string(),
            };
            tracing::warn!(
                request_id = %ctx.request_id,
                error = %truncate_message(&reason, 200),
                "Emergency contact notification failed"
            );
            NotificationStatus::Failed {
                reason: "message delivery failed".to_string(),
            }
        }
    }
}

/// POST /api/chat
pub async fn health_chat(
    State(state): State<AppState>,
    ctx: RequestContext,
    JsonBody(body): JsonBody<HealthChatRequest>,
) -> ApiResult<Json<Envelope<AiAnswer>>> {
    let request = AiRequest::HealthChat(body);
    let response = orchestrate(&state, &ctx, &request).await?;
    Ok(answer(&ctx, response, None))
}
