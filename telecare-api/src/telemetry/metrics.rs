//! Prometheus Metrics Definitions
//!
//! Metrics are registered once in the default registry and exposed at
//! `GET /metrics` for scraping.

use axum::{http::header, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use telecare_core::ResponseSource;
use telecare_llm::{AttemptOutcome, OrchestratedResponse};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance, registered on first use.
pub static METRICS: Lazy<ApiResult<TelecareMetrics>> = Lazy::new(TelecareMetrics::new);

/// Container for all Telecare metrics.
#[derive(Clone)]
pub struct TelecareMetrics {
    /// labels: method, route, status
    pub http_requests_total: CounterVec,

    /// labels: method, route
    pub http_request_duration_seconds: HistogramVec,

    /// labels: route
    pub rate_limit_rejections_total: CounterVec,

    /// labels: operation, source (cache, provider, local_fallback)
    pub ai_responses_total: CounterVec,

    /// labels: provider, outcome (success or error kind)
    pub provider_attempts_total: CounterVec,

    /// labels: operation, result (hit, miss)
    pub cache_lookups_total: CounterVec,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl TelecareMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "telecare_http_requests_total",
                "Total number of HTTP requests",
                &["method", "route", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "telecare_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "route"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            rate_limit_rejections_total: register_counter_vec!(
                "telecare_rate_limit_rejections_total",
                "Requests rejected by the rate limiter",
                &["route"]
            )
            .map_err(|e| registration_error("rate_limit_rejections_total", e))?,

            ai_responses_total: register_counter_vec!(
                "telecare_ai_responses_total",
                "AI answers by operation and where they came from",
                &["operation", "source"]
            )
            .map_err(|e| registration_error("ai_responses_total", e))?,

            provider_attempts_total: register_counter_vec!(
                "telecare_provider_attempts_total",
                "AI provider attempts by outcome",
                &["provider", "outcome"]
            )
            .map_err(|e| registration_error("provider_attempts_total", e))?,

            cache_lookups_total: register_counter_vec!(
                "telecare_cache_lookups_total",
                "AI response cache lookups",
                &["operation", "result"]
            )
            .map_err(|e| registration_error("cache_lookups_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, route, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, route])
            .observe(duration_secs);
    }

    pub fn record_rate_limited(&self, route: &str) {
        self.rate_limit_rejections_total
            .with_label_values(&[route])
            .inc();
    }

    /// Record the outcome of one orchestrated AI operation.
    pub fn record_ai_response(&self, operation: &str, response: &OrchestratedResponse) {
        self.ai_responses_total
            .with_label_values(&[operation, response.source.as_str()])
            .inc();

        let lookup = if response.source == ResponseSource::Cache {
            "hit"
        } else {
            "miss"
        };
        self.cache_lookups_total
            .with_label_values(&[operation, lookup])
            .inc();

        for attempt in &response.attempts {
            let outcome = match &attempt.outcome {
                AttemptOutcome::Succeeded => "success",
                AttemptOutcome::Failed(e) => e.kind(),
            };
            self.provider_attempts_total
                .with_label_values(&[attempt.provider.as_str(), outcome])
                .inc();
        }
    }
}

/// Run `f` against the global metrics when they registered successfully.
pub fn with_metrics(f: impl FnOnce(&TelecareMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Handler for GET /metrics.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    // Make sure our metrics exist even before the first request is recorded
    if let Err(e) = METRICS.as_ref() {
        tracing::error!(error = %e, "Metrics registration failed");
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            ApiError::internal_error(format!("Failed to encode metrics: {}", e)).into_response()
        }
    }
}
