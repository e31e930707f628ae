//! Shared helpers for the API integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::Value;
use telecare_api::{create_router, ApiConfig, AppState, AppStateBuilder, AuthConfig};
use telecare_test_utils::{AiProvider, InMemoryPatientStore, ManualClock, RecordingMessenger};
use tower::ServiceExt;

pub const TEST_API_KEY: &str = "test_api_key_0123456789";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub messenger: Arc<RecordingMessenger>,
    pub patients: Arc<InMemoryPatientStore>,
}

pub fn test_app(config: ApiConfig, providers: Vec<Arc<dyn AiProvider>>) -> TestApp {
    let clock = Arc::new(ManualClock::default());
    let messenger = Arc::new(RecordingMessenger::new());
    let patients = Arc::new(InMemoryPatientStore::new());

    let mut auth = AuthConfig::default().with_clock(clock.clone());
    auth.add_api_key(TEST_API_KEY);

    let state = providers
        .into_iter()
        .fold(
            AppStateBuilder::new(config, auth, patients.clone(), messenger.clone())
                .with_clock(clock.clone()),
            |builder, provider| builder.with_provider(provider),
        )
        .build();

    TestApp {
        router: create_router(state.clone()),
        state,
        clock,
        messenger,
        patients,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .header(header::USER_AGENT, "telecare-tests/1.0")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed(mut request: Request<Body>) -> Request<Body> {
    request
        .headers_mut()
        .insert("x-api-key", TEST_API_KEY.parse().unwrap());
    request
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
