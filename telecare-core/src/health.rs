//! Unified health check types
//!
//! Per-service probe results and the aggregate system view returned by the
//! health endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status for a service or component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component is operational but degraded
    Degraded,
    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Whether a load balancer should keep routing traffic here.
    pub fn is_serving(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

/// Result of one probe run for a named service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    /// Probe latency in milliseconds
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Healthy)
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut health = Self::with_status(name, HealthStatus::Degraded);
        health.error = Some(message.into());
        health
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut health = Self::with_status(name, HealthStatus::Unhealthy);
        health.error = Some(message.into());
        health
    }

    fn with_status(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            latency_ms: 0,
            timestamp: Utc::now(),
            detail: None,
            error: None,
        }
    }

    /// Set the probe latency.
    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    /// Attach structured detail.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Aggregate health across all registered probes. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub overall: HealthStatus,
    pub services: Vec<ServiceHealth>,
    /// Seconds since the registry was created
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
}

/// Fold individual statuses into an overall status.
///
/// A strict majority of unhealthy services makes the system unhealthy. Any
/// smaller number of unhealthy services, or any degraded one, makes it
/// degraded. No services at all counts as healthy.
pub fn aggregate_status<'a, I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = &'a HealthStatus>,
{
    let mut total = 0usize;
    let mut unhealthy = 0usize;
    let mut degraded = 0usize;
    for status in statuses {
        total += 1;
        match status {
            HealthStatus::Unhealthy => unhealthy += 1,
            HealthStatus::Degraded => degraded += 1,
            HealthStatus::Healthy => {}
        }
    }

    if unhealthy > 0 && unhealthy * 2 > total {
        HealthStatus::Unhealthy
    } else if unhealthy > 0 || degraded > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn status_strategy() -> impl Strategy<Value = HealthStatus> {
        prop_oneof![
            Just(HealthStatus::Healthy),
            Just(HealthStatus::Degraded),
            Just(HealthStatus::Unhealthy),
        ]
    }

    fn arb_statuses(min: usize) -> impl Strategy<Value = Vec<HealthStatus>> {
        prop::collection::vec(status_strategy(), min..20)
    }

    proptest! {
        #[test]
        fn prop_unhealthy_iff_strict_majority(statuses in arb_statuses(1)) {
            let unhealthy = statuses.iter().filter(|s| **s == HealthStatus::Unhealthy).count();
            let overall = aggregate_status(&statuses);
            prop_assert_eq!(overall == HealthStatus::Unhealthy, unhealthy * 2 > statuses.len());
        }

        #[test]
        fn prop_healthy_iff_all_healthy(statuses in arb_statuses(0)) {
            let all_healthy = statuses.iter().all(|s| *s == HealthStatus::Healthy);
            prop_assert_eq!(aggregate_status(&statuses) == HealthStatus::Healthy, all_healthy);
        }
    }
}
