//! Telecare Telemetry
//!
//! Structured logging via `tracing` and Prometheus metrics for the API layer.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_handler, with_metrics, TelecareMetrics, METRICS};
pub use tracer::{init_tracing, TelemetryConfig};
