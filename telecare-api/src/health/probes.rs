//! Probes for the services the API depends on.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use telecare_core::{Clock, ProviderResult, SystemClock};
use tokio::sync::Mutex;
use telecare_llm::AiProvider;
use telecare_storage::{PatientStore, TtlCache};

use super::registry::{HealthProbe, ProbeError, ProbeReport};

/// Cache utilization above which the cache reports degraded.
pub const CACHE_DEGRADED_UTILIZATION: f64 = 0.9;

/// Pings the persistence collaborator.
pub struct DatabaseProbe {
    store: Arc<dyn PatientStore>,
}

impl DatabaseProbe {
    pub fn new(store: Arc<dyn PatientStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthProbe for DatabaseProbe {
    async fn check(&self) -> Result<ProbeReport, ProbeError> {
        self.store
            .ping()
            .await
            .map(|()| ProbeReport::healthy())
            .map_err(|e| ProbeError::Failed(e.to_string()))
    }
}

/// Pings one AI provider, at most once per `min_interval`.
///
/// Vendor pings are billable calls on an open endpoint. Checks arriving
/// inside the interval get the previous outcome; concurrent checks wait for
/// the single ping in flight.
pub struct ProviderProbe {
    provider: Arc<dyn AiProvider>,
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    last: Mutex<Option<(i64, Result<ProbeReport, ProbeError>)>>,
}

impl ProviderProbe {
    pub fn new(provider: Arc<dyn AiProvider>, min_interval: Duration) -> Self {
        Self::with_clock(provider, min_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: Arc<dyn AiProvider>,
        min_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            min_interval,
            clock,
            last: Mutex::new(None),
        }
    }

    async fn ping(&self) -> Result<ProbeReport, ProbeError> {
        self.provider
            .ping()
            .await
            .map(|()| {
                ProbeReport::healthy().with_detail(json!({ "provider": self.provider.name() }))
            })
            .map_err(|e| ProbeError::Failed(e.to_string()))
    }
}

#[async_trait]
impl HealthProbe for ProviderProbe {
    async fn check(&self) -> Result<ProbeReport, ProbeError> {
        let interval_ms = i64::try_from(self.min_interval.as_millis()).unwrap_or(i64::MAX);
        let mut last = self.last.lock().await;
        let now = self.clock.now_millis();

        if let Some((pinged_at, outcome)) = last.as_ref() {
            if now.saturating_sub(*pinged_at) < interval_ms {
                return outcome.clone();
            }
        }

        let outcome = self.ping().await;
        *last = Some((now, outcome.clone()));
        outcome
    }
}

/// Reports degraded when no AI provider is configured; answers then come
/// only from the local fallback.
pub struct ProviderChainProbe {
    configured: Vec<String>,
}

impl ProviderChainProbe {
    pub fn new(configured: Vec<String>) -> Self {
        Self { configured }
    }
}

#[async_trait]
impl HealthProbe for ProviderChainProbe {
    async fn check(&self) -> Result<ProbeReport, ProbeError> {
        let detail = json!({ "providers": self.configured });
        if self.configured.is_empty() {
            Ok(ProbeReport::degraded("no AI provider configured, serving local fallback only")
                .with_detail(detail))
        } else {
            Ok(ProbeReport::healthy().with_detail(detail))
        }
    }
}

/// Reports response cache statistics; degraded near capacity.
pub struct CacheProbe {
    cache: Arc<TtlCache<ProviderResult>>,
}

impl CacheProbe {
    pub fn new(cache: Arc<TtlCache<ProviderResult>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl HealthProbe for CacheProbe {
    async fn check(&self) -> Result<ProbeReport, ProbeError> {
        let stats = self.cache.stats();
        let utilization = stats.utilization();
        let detail = json!({
            "entries": stats.entry_count,
            "capacity": stats.capacity,
            "hitRate": stats.hit_rate(),
            "evictions": stats.evictions,
        });

        if utilization > CACHE_DEGRADED_UTILIZATION {
            Ok(ProbeReport::degraded(format!(
                "cache at {:.0}% of capacity",
                utilization * 100.0
            ))
            .with_detail(detail))
        } else {
            Ok(ProbeReport::healthy().with_detail(detail))
        }
    }
}
