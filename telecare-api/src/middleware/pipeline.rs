//! The request pipeline every API route runs through.
//!
//! ```text
//! Received ─┬─> RateLimited (429, handler never called)
//!           ├─> Unauthorized (401, handler never called)
//!           └─> Executing ─┬─> Succeeded
//!                          └─> Failed (error envelope, logged once)
//! ```
//!
//! One `from_fn_with_state` layer per route group; the group's
//! [`RoutePolicy`] decides whether rate limiting and authentication apply.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::context::RequestContext;
use crate::auth::{authenticate, AuthConfig};
use crate::config::{Environment, RateLimitRule};
use crate::error::ApiError;
use crate::rate_limit::{ClientIdentity, RateLimitDecision, RateLimiter};
use crate::telemetry::with_metrics;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// What the pipeline enforces for one route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Route name used in logs, metrics and rate-limit keys
    pub route: &'static str,
    pub rate_limit: Option<RateLimitRule>,
    pub require_auth: bool,
}

impl RoutePolicy {
    pub fn open(route: &'static str) -> Self {
        Self {
            route,
            rate_limit: None,
            require_auth: false,
        }
    }

    pub fn limited(mut self, rule: RateLimitRule) -> Self {
        self.rate_limit = Some(rule);
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.require_auth = true;
        self
    }
}

/// Shared pipeline services plus the policy of the wrapped route group.
#[derive(Clone)]
pub struct PipelineState {
    pub limiter: Arc<RateLimiter>,
    pub auth: Arc<AuthConfig>,
    pub environment: Environment,
    pub rate_limit_enabled: bool,
    pub policy: RoutePolicy,
}

impl PipelineState {
    pub fn new(limiter: Arc<RateLimiter>, auth: Arc<AuthConfig>, environment: Environment) -> Self {
        Self {
            limiter,
            auth,
            environment,
            rate_limit_enabled: true,
            policy: RoutePolicy::open("default"),
        }
    }

    pub fn with_rate_limiting(mut self, enabled: bool) -> Self {
        self.rate_limit_enabled = enabled;
        self
    }

    /// Copy of this state for a route group with `policy`.
    pub fn for_route(&self, policy: RoutePolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }
}

/// Pipeline middleware. Use with `axum::middleware::from_fn_with_state`.
pub async fn pipeline(
    State(state): State<PipelineState>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = state.policy.route;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        route,
        "Incoming request"
    );

    let (mut parts, body) = request.into_parts();

    // Rate limit
    let mut decision: Option<RateLimitDecision> = None;
    if let (true, Some(rule)) = (state.rate_limit_enabled, state.policy.rate_limit) {
        let identity = ClientIdentity::from_parts(&parts);
        let checked = state
            .limiter
            .check(&identity.key_for(route), rule.max_requests, rule.window);
        decision = Some(checked);

        if !checked.allowed {
            tracing::warn!(
                request_id = %request_id,
                route,
                client_ip = %identity.ip,
                retry_after_secs = checked.retry_after_secs,
                "Rate limit exceeded"
            );
            with_metrics(|m| m.record_rate_limited(route));
            let response = ApiError::too_many_requests(Some(checked.retry_after_secs))
                .with_request_id(&request_id)
                .into_response();
            return finish(&state, response, &request_id, decision, &method, &path, started);
        }
    }

    // Authentication
    if state.policy.require_auth {
        let header_value = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
        match authenticate(
            &state.auth,
            header_value(API_KEY_HEADER),
            header_value(header::AUTHORIZATION.as_str()),
        ) {
            Ok(auth) => {
                parts.extensions.insert(auth);
            }
            Err(err) => {
                tracing::warn!(
                    request_id = %request_id,
                    route,
                    code = %err.code,
                    "Authentication failed"
                );
                let response = err.with_request_id(&request_id).into_response();
                return finish(&state, response, &request_id, decision, &method, &path, started);
            }
        }
    }

    parts.extensions.insert(RequestContext {
        request_id: request_id.clone(),
        route,
        received_at: Utc::now(),
        started,
    });
    if let Some(decision) = decision {
        parts.extensions.insert(decision);
    }
    request = Request::from_parts(parts, body);

    // Handler, isolated from panics
    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            ApiError::internal_error(format!("Handler panicked: {}", panic_message(&*panic)))
                .into_response()
        }
    };

    let response = render_error(&state, response, &request_id, route);
    finish(&state, response, &request_id, decision, &method, &path, started)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Log a handler error once, stamp the request id, and hide internal detail
/// outside development.
fn render_error(
    state: &PipelineState,
    response: Response,
    request_id: &str,
    route: &str,
) -> Response {
    let Some(err) = response.extensions().get::<ApiError>().cloned() else {
        return response;
    };

    if err.code.is_internal() {
        tracing::error!(
            request_id = %request_id,
            route,
            code = %err.code,
            error = %err,
            "Request failed"
        );
    } else {
        tracing::info!(
            request_id = %request_id,
            route,
            code = %err.code,
            "Request rejected"
        );
    }

    let err = err.with_request_id(request_id);
    let err = if state.environment.is_production() && err.code.is_internal() {
        err.sanitized()
    } else {
        err
    };

    // Keep headers the handler set (Retry-After and the like)
    let (mut parts, _) = response.into_parts();
    let rendered = err.into_response();
    let (rendered_parts, body) = rendered.into_parts();
    parts.status = rendered_parts.status;
    parts.headers.remove(header::CONTENT_LENGTH);
    for (name, value) in rendered_parts.headers.iter() {
        parts.headers.insert(name.clone(), value.clone());
    }
    parts.extensions = rendered_parts.extensions;
    Response::from_parts(parts, body)
}

fn finish(
    state: &PipelineState,
    mut response: Response,
    request_id: &str,
    decision: Option<RateLimitDecision>,
    method: &axum::http::Method,
    path: &str,
    started: Instant,
) -> Response {
    let headers = response.headers_mut();
    apply_security_headers(headers, state.environment);
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    if let Some(decision) = decision {
        apply_rate_limit_headers(headers, &decision);
    }

    let status = response.status().as_u16();
    let duration = started.elapsed();
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        route = state.policy.route,
        status,
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );
    with_metrics(|m| {
        m.record_http_request(method.as_str(), state.policy.route, status, duration.as_secs_f64())
    });
    response
}

fn apply_security_headers(headers: &mut HeaderMap, environment: Environment) {
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if environment.is_production() {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_at_secs().to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}
