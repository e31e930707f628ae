//! Integration tests for the health endpoints.

mod support;

use std::sync::Arc;

use axum::{body::Body, http::Request, http::StatusCode};
use support::{get, send, test_app};
use telecare_api::{ApiConfig, ProbeReport};
use telecare_test_utils::{json_reply, AiProvider, ScriptedProvider};

fn head(uri: &str) -> Request<Body> {
    Request::builder()
        .method("HEAD")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_every_registered_service() {
    let provider: Arc<dyn AiProvider> =
        ScriptedProvider::replying("primary", json_reply("ok", 0.9));
    let app = test_app(ApiConfig::default(), vec![provider]);

    let res = send(&app.router, get("/health")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["overall"], "healthy");

    let names: Vec<&str> = res.body["services"]
        .as_array()
        .map(|s| s.iter().filter_map(|svc| svc["name"].as_str()).collect())
        .unwrap_or_default();
    for expected in ["database", "cache", "ai-providers", "provider:primary"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
    assert!(res.headers.contains_key("x-request-id"));
    assert!(!res.headers.contains_key("x-ratelimit-limit"));
}

#[tokio::test]
async fn test_no_providers_is_degraded_but_serving() {
    let app = test_app(ApiConfig::default(), Vec::new());

    let res = send(&app.router, get("/health")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["overall"], "degraded");

    let res = send(&app.router, get("/health/ai-providers")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "degraded");
}

#[tokio::test]
async fn test_majority_unhealthy_answers_503() {
    let app = test_app(ApiConfig::default(), Vec::new());
    for name in ["queue", "search", "billing", "mail"] {
        app.state
            .health
            .register_fn(name, || async { Ok(ProbeReport::unhealthy("connection refused")) });
    }

    let res = send(&app.router, get("/health")).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["overall"], "unhealthy");

    let res = send(&app.router, head("/health")).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(res.body.is_null());
}

#[tokio::test]
async fn test_head_health_returns_status_only() {
    let app = test_app(ApiConfig::default(), Vec::new());
    let res = send(&app.router, head("/health")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.is_null());
}

#[tokio::test]
async fn test_single_service_check() {
    let app = test_app(ApiConfig::default(), Vec::new());
    app.state
        .health
        .register_fn("search", || async { Ok(ProbeReport::unhealthy("index offline")) });

    let res = send(&app.router, get("/health/database")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "healthy");

    let res = send(&app.router, get("/health/search")).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["error"], "index offline");

    let res = send(&app.router, get("/health/nope")).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_liveness_runs_no_probes() {
    let app = test_app(ApiConfig::default(), Vec::new());
    app.state.health.register_fn("search", || async {
        Ok(ProbeReport::unhealthy("index offline"))
    });

    let res = send(&app.router, get("/health/live")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "healthy");
    assert!(app.state.health.last_known("search").is_none());
}

#[tokio::test]
async fn test_repeated_health_checks_ping_vendors_once_per_interval() {
    let provider = ScriptedProvider::replying("primary", json_reply("ok", 0.9));
    let app = test_app(ApiConfig::default(), vec![provider.clone() as Arc<dyn AiProvider>]);

    for _ in 0..3 {
        assert_eq!(send(&app.router, get("/health")).await.status, StatusCode::OK);
        assert_eq!(send(&app.router, head("/health")).await.status, StatusCode::OK);
    }
    assert_eq!(provider.pings(), 1);

    app.clock.advance(ApiConfig::default().provider_probe_interval);
    send(&app.router, get("/health/provider:primary")).await;
    assert_eq!(provider.pings(), 2);
}
