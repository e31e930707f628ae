//! Named health probes with majority-rule aggregation.

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use telecare_core::{
    aggregate_status, Clock, HealthStatus, ServiceHealth, SystemClock, SystemHealth,
};
use thiserror::Error;

/// Why a probe produced no report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("{0}")]
    Failed(String),

    #[error("probe timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("probe panicked")]
    Panicked,
}

/// Report returned by a successful probe run. The registry stamps name,
/// latency and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub detail: Option<serde_json::Value>,
}

impl ProbeReport {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            detail: None,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            detail: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// An async check of one backing service.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<ProbeReport, ProbeError>;
}

/// Adapter turning an async closure into a [`HealthProbe`].
pub struct FnProbe<F>(pub F);

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProbeReport, ProbeError>> + Send + 'static,
{
    async fn check(&self) -> Result<ProbeReport, ProbeError> {
        (self.0)().await
    }
}

/// Process-scoped collection of named probes and their last known results.
pub struct HealthRegistry {
    probes: RwLock<Vec<(String, Arc<dyn HealthProbe>)>>,
    last_known: RwLock<HashMap<String, ServiceHealth>>,
    probe_timeout: Duration,
    started_at: Instant,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthRegistry")
            .field("probes", &self.names())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

impl HealthRegistry {
    pub fn new(probe_timeout: Duration) -> Self {
        Self::with_clock(probe_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(probe_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            probes: RwLock::new(Vec::new()),
            last_known: RwLock::new(HashMap::new()),
            probe_timeout,
            started_at: Instant::now(),
            clock,
        }
    }

    /// Register a probe, replacing any probe with the same name.
    pub fn register(&self, name: impl Into<String>, probe: Arc<dyn HealthProbe>) {
        let name = name.into();
        let mut probes = self.probes.write().unwrap_or_else(|e| e.into_inner());
        match probes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = probe,
            None => probes.push((name, probe)),
        }
    }

    /// Register an async closure as a probe.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeReport, ProbeError>> + Send + 'static,
    {
        self.register(name, Arc::new(FnProbe(probe)));
    }

    /// Registered probe names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.probes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    fn probe(&self, name: &str) -> Option<Arc<dyn HealthProbe>> {
        self.probes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
    }

    /// Run one probe. Returns `None` when no probe has that name.
    pub async fn run_check(&self, name: &str) -> Option<ServiceHealth> {
        let probe = self.probe(name)?;
        Some(self.execute(name, probe).await)
    }

    /// Run every probe concurrently and aggregate the results.
    pub async fn run_all(&self) -> SystemHealth {
        let probes = self
            .probes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let services = join_all(
            probes
                .into_iter()
                .map(|(name, probe)| async move { self.execute(&name, probe).await }),
        )
        .await;

        SystemHealth {
            overall: aggregate_status(services.iter().map(|s| &s.status)),
            services,
            uptime_secs: self.uptime_secs(),
            timestamp: self.clock.now(),
        }
    }

    /// Last recorded result for `name`, if the probe has run.
    pub fn last_known(&self, name: &str) -> Option<ServiceHealth> {
        self.last_known
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    async fn execute(&self, name: &str, probe: Arc<dyn HealthProbe>) -> ServiceHealth {
        let start = Instant::now();
        let outcome = tokio::time::timeout(
            self.probe_timeout,
            AssertUnwindSafe(probe.check()).catch_unwind(),
        )
        .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProbeError::Panicked),
            Err(_) => Err(ProbeError::Timeout {
                after_ms: self.probe_timeout.as_millis() as u64,
            }),
        };

        let health = match result {
            Ok(report) => {
                let mut health = match (report.status, report.message) {
                    (HealthStatus::Healthy, _) => ServiceHealth::healthy(name),
                    (HealthStatus::Degraded, msg) => {
                        ServiceHealth::degraded(name, msg.unwrap_or_default())
                    }
                    (HealthStatus::Unhealthy, msg) => {
                        ServiceHealth::unhealthy(name, msg.unwrap_or_default())
                    }
                };
                health.detail = report.detail;
                health
            }
            Err(err) => ServiceHealth::unhealthy(name, err.to_string()),
        }
        .with_latency(latency_ms)
        .with_timestamp(self.clock.now());

        match health.status {
            HealthStatus::Healthy => {
                tracing::debug!(service = %name, latency_ms, "Health check passed")
            }
            HealthStatus::Degraded => tracing::warn!(
                service = %name,
                latency_ms,
                error = health.error.as_deref().unwrap_or(""),
                "Health check degraded"
            ),
            HealthStatus::Unhealthy => tracing::warn!(
                service = %name,
                latency_ms,
                error = health.error.as_deref().unwrap_or(""),
                "Health check failed"
            ),
        }

        self.last_known
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), health.clone());
        health
    }
}
