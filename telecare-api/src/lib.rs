//! Telecare API - HTTP Layer
//!
//! Axum REST API for the Telecare telemedicine platform. Every route runs
//! through one middleware pipeline that applies rate limiting,
//! authentication, panic isolation and the error envelope, and AI-backed
//! routes always answer, falling back to local rules when every provider
//! fails.

#[macro_use]
mod macros;

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{
    authenticate, generate_jwt_token, validate_jwt_token, AuthConfig, AuthContext, AuthMethod,
    Claims, JwtSecret,
};
pub use config::{ApiConfig, Environment, RateLimitRule, RouteClass, RouteLimits};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use health::{HealthProbe, HealthRegistry, ProbeError, ProbeReport};
pub use middleware::{pipeline, PipelineState, RateLimitInfo, RequestContext, RoutePolicy};
pub use rate_limit::{ClientIdentity, RateLimitDecision, RateLimiter};
pub use routes::create_router;
pub use state::{AppState, AppStateBuilder, ResponseCache};
