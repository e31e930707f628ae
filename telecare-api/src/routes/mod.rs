//! REST API Routes Module
//!
//! Route groups and the policy each one runs under:
//!
//! | Group    | Paths                                   | Rate limit | Auth |
//! |----------|-----------------------------------------|------------|------|
//! | AI       | `/api/symptoms/analyze`, `/api/emergency/guidance`, `/api/chat` | per route | no |
//! | Patients | `/api/patients/:id`                     | patients   | yes  |
//! | Cache    | `/api/cache/*`                          | default    | yes  |
//! | Health   | `/health`, `/health/live`, `/health/:name` | none    | no   |
//! | Metrics  | `/metrics`                              | none       | no   |
//!
//! CORS wraps everything so preflight requests never reach the pipeline.

pub mod ai;
pub mod cache;
pub mod health;
pub mod patients;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::{ApiConfig, RouteClass};
use crate::error::ApiError;
use crate::middleware::{pipeline, RoutePolicy, API_KEY_HEADER, REQUEST_ID_HEADER};
use crate::state::AppState;
use crate::telemetry::metrics_handler;

// ============================================================================
// EXTRACTORS
// ============================================================================

/// JSON body extractor that rejects with the API error envelope instead of
/// axum's plain-text rejection.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::invalid_input("Expected request with `Content-Type: application/json`")
        }
        other => ApiError::invalid_input(other.body_text()),
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the complete application router.
pub fn create_router(state: AppState) -> Router {
    let limits = &state.config.route_limits;
    let group =
        |policy: RoutePolicy| from_fn_with_state(state.pipeline.for_route(policy), pipeline);
    let limited =
        |class: RouteClass| RoutePolicy::open(class.as_str()).limited(limits.for_route(class));

    let symptoms = Router::new()
        .route("/api/symptoms/analyze", post(ai::analyze_symptoms))
        .route_layer(group(limited(RouteClass::Symptoms)));

    let emergency = Router::new()
        .route("/api/emergency/guidance", post(ai::emergency_guidance))
        .route_layer(group(limited(RouteClass::Emergency)));

    let chat = Router::new()
        .route("/api/chat", post(ai::health_chat))
        .route_layer(group(limited(RouteClass::Chat)));

    let patients = Router::new()
        .route(
            "/api/patients/:id",
            get(patients::get_patient).put(patients::update_patient),
        )
        .route_layer(group(limited(RouteClass::Patients).authenticated()));

    let cache = Router::new()
        .route("/api/cache/invalidate", post(cache::invalidate))
        .route("/api/cache/stats", get(cache::stats))
        .route_layer(group(
            RoutePolicy::open("cache")
                .limited(limits.for_route(RouteClass::Default))
                .authenticated(),
        ));

    let health = Router::new()
        .route(
            "/health",
            get(health::system_health).head(health::system_health_head),
        )
        .route("/health/live", get(health::liveness))
        .route("/health/:name", get(health::service_health))
        .route_layer(group(RoutePolicy::open("health")));

    let metrics: Router<AppState> = Router::new()
        .route("/metrics", get(metrics_handler))
        .route_layer(group(RoutePolicy::open("metrics")));

    let cors = build_cors_layer(state.config.clone());

    Router::new()
        .merge(symptoms)
        .merge(emergency)
        .merge(chat)
        .merge(patients)
        .merge(cache)
        .merge(health)
        .merge(metrics)
        .with_state(state)
        .layer(cors)
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// With no configured origins every origin is allowed. Otherwise only the
/// listed origins (including `*.domain` wildcards) are.
fn build_cors_layer(config: Arc<ApiConfig>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderName::from_static("retry-after"),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any).allow_headers(Any).expose_headers(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
        cors.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| config.is_origin_allowed(o))
                .unwrap_or(false)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        name: String,
    }

    #[tokio::test]
    async fn test_json_body_rejects_malformed_json_with_envelope() {
        let req = axum::http::Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let err = match JsonBody::<Payload>::from_request(req, &()).await {
            Ok(_) => panic!("malformed body accepted"),
            Err(e) => e,
        };
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_json_body_requires_content_type() {
        let req = axum::http::Request::builder()
            .method("POST")
            .body(Body::from(r#"{"name":"x"}"#))
            .unwrap();

        let err = match JsonBody::<Payload>::from_request(req, &()).await {
            Ok(_) => panic!("body without content type accepted"),
            Err(e) => e,
        };
        assert!(err
            .message
            .as_deref()
            .is_some_and(|m| m.contains("Content-Type")));
    }
}
