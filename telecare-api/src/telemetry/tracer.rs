//! Tracing Subscriber Initialization
//!
//! JSON lines in production for log shipping, human-readable output in
//! development. The filter comes from `RUST_LOG` when set.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Environment;
use crate::error::{ApiError, ApiResult};

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: Environment,
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Emit JSON lines instead of pretty output
    pub json: bool,
}

impl TelemetryConfig {
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            service_name: std::env::var("TELECARE_SERVICE_NAME")
                .unwrap_or_else(|_| "telecare-api".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment,
            default_filter: "info,telecare_api=debug,telecare_llm=debug".to_string(),
            json: environment.is_production(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| ApiError::internal_error(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to set subscriber: {}", e)))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = config.environment.as_str(),
        "Tracing initialized"
    );
    Ok(())
}
