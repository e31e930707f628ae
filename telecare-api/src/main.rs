//! Telecare API Server Entry Point
//!
//! Loads configuration, registers the configured AI providers, and starts
//! the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::ExposeSecret;
use telecare_api::telemetry::{init_tracing, TelemetryConfig};
use telecare_api::{create_router, ApiConfig, ApiError, ApiResult, AppStateBuilder, AuthConfig};
use telecare_llm::{AnthropicProvider, OpenAIProvider};
use telecare_storage::{InMemoryPatientStore, UnconfiguredMessenger};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let api_config = ApiConfig::from_env()?;
    init_tracing(&TelemetryConfig::for_environment(api_config.environment))?;

    let auth_config = AuthConfig::from_env();
    auth_config.validate_for_production(api_config.environment)?;

    let addr = resolve_bind_addr(&api_config)?;

    let mut builder = AppStateBuilder::new(
        api_config.clone(),
        auth_config,
        Arc::new(InMemoryPatientStore::new()),
        Arc::new(UnconfiguredMessenger),
    );
    if let Some(settings) = &api_config.anthropic {
        tracing::info!(model = %settings.model, "Registering Anthropic provider");
        builder = builder.with_provider(Arc::new(AnthropicProvider::new(
            settings.api_key.expose_secret(),
            settings.model.clone(),
        )));
    }
    if let Some(settings) = &api_config.openai {
        tracing::info!(model = %settings.model, "Registering OpenAI provider");
        builder = builder.with_provider(Arc::new(OpenAIProvider::new(
            settings.api_key.expose_secret(),
            settings.model.clone(),
        )));
    }
    tracing::warn!("No messaging gateway configured; emergency contacts will not be notified");
    if api_config.anthropic.is_none() && api_config.openai.is_none() {
        tracing::warn!("No AI provider configured; AI routes will serve local fallback answers");
    }

    let app = create_router(builder.build());

    tracing::info!(
        %addr,
        environment = api_config.environment.as_str(),
        "Starting Telecare API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn resolve_bind_addr(config: &ApiConfig) -> ApiResult<SocketAddr> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
