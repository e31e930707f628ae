//! Shared application state for Axum routers.
//!
//! Every piece of mutable shared state (response cache, rate-limit windows,
//! health results) is owned here and built once at startup. Tests build
//! their own isolated instance.

use std::sync::Arc;

use telecare_core::{Clock, ProviderResult, SystemClock};
use telecare_llm::{AiProvider, ProviderOrchestrator};
use telecare_storage::{Messenger, PatientStore, TtlCache};

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::health::{CacheProbe, DatabaseProbe, HealthRegistry, ProviderChainProbe, ProviderProbe};
use crate::middleware::PipelineState;
use crate::rate_limit::RateLimiter;

/// Response cache shared by the orchestrator and invalidation routes.
pub type ResponseCache = TtlCache<ProviderResult>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub orchestrator: Arc<ProviderOrchestrator>,
    pub cache: Arc<ResponseCache>,
    pub health: Arc<HealthRegistry>,
    pub patients: Arc<dyn PatientStore>,
    pub messenger: Arc<dyn Messenger>,
    pub pipeline: PipelineState,
}

crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Arc<ProviderOrchestrator>, orchestrator);
crate::impl_from_ref!(Arc<ResponseCache>, cache);
crate::impl_from_ref!(Arc<HealthRegistry>, health);
crate::impl_from_ref!(Arc<dyn PatientStore>, patients);
crate::impl_from_ref!(Arc<dyn Messenger>, messenger);

/// Collaborators and settings [`AppState`] is assembled from.
pub struct AppStateBuilder {
    config: ApiConfig,
    auth: AuthConfig,
    providers: Vec<Arc<dyn AiProvider>>,
    patients: Arc<dyn PatientStore>,
    messenger: Arc<dyn Messenger>,
    clock: Arc<dyn Clock>,
}

impl AppStateBuilder {
    pub fn new(
        config: ApiConfig,
        auth: AuthConfig,
        patients: Arc<dyn PatientStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            config,
            auth,
            providers: Vec::new(),
            patients,
            messenger,
            clock: Arc::new(SystemClock),
        }
    }

    /// Append a provider to the fallback chain.
    pub fn with_provider(mut self, provider: Arc<dyn AiProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Clock for the cache and rate limiter.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> AppState {
        let cache = Arc::new(TtlCache::with_clock(
            self.config.cache_capacity,
            self.clock.clone(),
        ));

        let orchestrator = self.providers.iter().cloned().fold(
            ProviderOrchestrator::new(cache.clone(), self.config.orchestrator_config()),
            |orchestrator, provider| orchestrator.with_provider(provider),
        );

        let health = HealthRegistry::with_clock(self.config.probe_timeout, self.clock.clone());
        health.register("database", Arc::new(DatabaseProbe::new(self.patients.clone())));
        health.register("cache", Arc::new(CacheProbe::new(cache.clone())));
        health.register(
            "ai-providers",
            Arc::new(ProviderChainProbe::new(
                self.providers.iter().map(|p| p.name().to_string()).collect(),
            )),
        );
        for provider in &self.providers {
            health.register(
                format!("provider:{}", provider.name()),
                Arc::new(ProviderProbe::with_clock(
                    provider.clone(),
                    self.config.provider_probe_interval,
                    self.clock.clone(),
                )),
            );
        }

        let limiter = Arc::new(RateLimiter::new(
            self.clock.clone(),
            self.config.rate_limit_sweep_interval,
        ));
        let pipeline = PipelineState::new(limiter, Arc::new(self.auth), self.config.environment)
            .with_rate_limiting(self.config.rate_limit_enabled);

        AppState {
            config: Arc::new(self.config),
            orchestrator: Arc::new(orchestrator),
            cache,
            health: Arc::new(health),
            patients: self.patients,
            messenger: self.messenger,
            pipeline,
        }
    }
}
