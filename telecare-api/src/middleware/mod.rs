//! Middleware for the Telecare API
//!
//! Every route group is wrapped by [`pipeline`], which performs, in order:
//! request logging, rate limiting, authentication, panic-isolated handler
//! execution, error rendering, and response headers.
//!
//! ```ignore
//! Router::new()
//!     .route("/api/symptoms/analyze", post(analyze_symptoms))
//!     .layer(middleware::from_fn_with_state(
//!         pipeline_state.for_route(RoutePolicy::open("symptoms").limited(rule)),
//!         pipeline,
//!     ))
//! ```

mod context;
mod pipeline;

pub use context::{AuthExtractor, Envelope, RateLimitInfo, RequestContext, ResponseMetadata};
pub use pipeline::{pipeline, PipelineState, RoutePolicy, API_KEY_HEADER, REQUEST_ID_HEADER};
