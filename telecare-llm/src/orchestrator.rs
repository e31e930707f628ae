//! Provider fallback orchestration.
//!
//! One call to [`ProviderOrchestrator::execute`] walks a fixed sequence:
//!
//! 1. cache check, returning a fresh entry immediately
//! 2. each configured provider in order, bounded by a per-attempt timeout
//!    and by a deadline for the whole chain
//! 3. the local rule-based fallback, which cannot fail
//!
//! Every provider attempt yields a typed [`ProviderAttempt`]; a failure only
//! moves the chain forward. Results are written to the cache only after a
//! provider fully succeeds, and fallback answers are never cached.

use crate::fallback::{ensure_emergency_numbers, local_fallback};
use crate::operation::{AiRequest, OperationKind};
use crate::parse::parse_provider_response;
use crate::provider::AiProvider;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use telecare_core::{truncate_message, LlmError, ProviderResult, ResponseSource};
use telecare_storage::TtlCache;
use tokio::time::Instant;

/// Maximum characters of a provider error message written to logs.
const LOG_ERROR_MAX_CHARS: usize = 200;

/// Cache lifetime per operation class.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheTtls {
    pub symptom_analysis: Duration,
    pub emergency_guidance: Duration,
    pub health_chat: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            symptom_analysis: Duration::from_secs(30 * 60),
            emergency_guidance: Duration::from_secs(5 * 60),
            health_chat: Duration::from_secs(10 * 60),
        }
    }
}

impl CacheTtls {
    pub fn for_operation(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::SymptomAnalysis => self.symptom_analysis,
            OperationKind::EmergencyGuidance => self.emergency_guidance,
            OperationKind::HealthChat => self.health_chat,
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Upper bound for a single provider attempt
    pub provider_timeout: Duration,
    /// Upper bound for the whole provider chain
    pub operation_deadline: Duration,
    pub cache_ttls: CacheTtls,
    /// Numbers every emergency answer must mention
    pub emergency_numbers: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_millis(6_000),
            operation_deadline: Duration::from_millis(10_000),
            cache_ttls: CacheTtls::default(),
            emergency_numbers: vec!["112".to_string()],
        }
    }
}

/// Outcome of one provider attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(LlmError),
}

/// Record of one provider attempt within an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAttempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

impl ProviderAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded)
    }
}

/// Result of an orchestrated operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratedResponse {
    pub result: ProviderResult,
    pub source: ResponseSource,
    pub attempts: Vec<ProviderAttempt>,
    pub cache_key: String,
}

/// Ordered provider chain with cache-aside reads and a guaranteed fallback.
pub struct ProviderOrchestrator {
    providers: Vec<Arc<dyn AiProvider>>,
    cache: Arc<TtlCache<ProviderResult>>,
    config: OrchestratorConfig,
}

impl ProviderOrchestrator {
    pub fn new(cache: Arc<TtlCache<ProviderResult>>, config: OrchestratorConfig) -> Self {
        Self {
            providers: Vec::new(),
            cache,
            config,
        }
    }

    /// Append a provider to the end of the chain.
    pub fn with_provider(mut self, provider: Arc<dyn AiProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(&self) -> &[Arc<dyn AiProvider>] {
        &self.providers
    }

    pub fn cache(&self) -> &Arc<TtlCache<ProviderResult>> {
        &self.cache
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run `request` through cache, providers and fallback.
    ///
    /// Never fails. Input validation is the caller's job.
    pub async fn execute(&self, request: &AiRequest) -> OrchestratedResponse {
        let kind = request.kind();
        let cache_key = request.cache_key();

        if let Some(result) = self.cache.get(&cache_key) {
            tracing::debug!(operation = %kind, "AI response served from cache");
            return OrchestratedResponse {
                result,
                source: ResponseSource::Cache,
                attempts: Vec::new(),
                cache_key,
            };
        }

        let (prompt, context) = request.prompt();
        let deadline = Instant::now() + self.config.operation_deadline;
        let mut attempts = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name().to_string();
            let started = Instant::now();

            let outcome = match deadline.checked_duration_since(started) {
                Some(remaining) if !remaining.is_zero() => {
                    let budget = remaining.min(self.config.provider_timeout);
                    self.attempt(provider.as_ref(), &prompt, &context, budget).await
                }
                _ => Err(LlmError::DeadlineExceeded {
                    provider: name.clone(),
                }),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(mut result) => {
                    if kind == OperationKind::EmergencyGuidance {
                        ensure_emergency_numbers(
                            &mut result.action_items,
                            &self.config.emergency_numbers,
                        );
                    }
                    self.cache.set(
                        cache_key.clone(),
                        result.clone(),
                        self.config.cache_ttls.for_operation(kind),
                        request.cache_tags(),
                    );
                    tracing::info!(
                        operation = %kind,
                        provider = %name,
                        elapsed_ms,
                        failed_attempts = attempts.len(),
                        "AI provider attempt succeeded"
                    );
                    attempts.push(ProviderAttempt {
                        provider: name,
                        outcome: AttemptOutcome::Succeeded,
                        elapsed_ms,
                    });
                    return OrchestratedResponse {
                        result,
                        source: ResponseSource::Provider,
                        attempts,
                        cache_key,
                    };
                }
                Err(error) => {
                    tracing::warn!(
                        operation = %kind,
                        provider = %name,
                        error_kind = error.kind(),
                        error = %truncate_message(&error.to_string(), LOG_ERROR_MAX_CHARS),
                        elapsed_ms,
                        "AI provider attempt failed"
                    );
                    attempts.push(ProviderAttempt {
                        provider: name,
                        outcome: AttemptOutcome::Failed(error),
                        elapsed_ms,
                    });
                }
            }
        }

        tracing::warn!(
            operation = %kind,
            attempts = attempts.len(),
            "All AI providers failed, using local fallback"
        );
        OrchestratedResponse {
            result: local_fallback(request, &self.config.emergency_numbers),
            source: ResponseSource::LocalFallback,
            attempts,
            cache_key,
        }
    }

    /// One isolated provider call. Timeouts, vendor errors, unusable output
    /// and panics all come back as `Err`.
    async fn attempt(
        &self,
        provider: &dyn AiProvider,
        prompt: &str,
        context: &crate::provider::PromptContext,
        budget: Duration,
    ) -> Result<ProviderResult, LlmError> {
        let name = provider.name();
        let call = AssertUnwindSafe(provider.complete(prompt, context)).catch_unwind();

        let raw = match tokio::time::timeout(budget, call).await {
            Err(_) => {
                return Err(LlmError::Timeout {
                    provider: name.to_string(),
                    after_ms: budget.as_millis() as u64,
                })
            }
            Ok(Err(_panic)) => {
                return Err(LlmError::RequestFailed {
                    provider: name.to_string(),
                    status: 0,
                    message: "provider panicked".to_string(),
                })
            }
            Ok(Ok(result)) => result?,
        };

        parse_provider_response(name, &raw)
    }
}

impl std::fmt::Debug for ProviderOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderOrchestrator")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{EmergencyGuidanceRequest, SymptomAnalysisRequest};
    use crate::provider::PromptContext;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use telecare_core::LOCAL_FALLBACK_PROVIDER;

    enum Behavior {
        Reply(&'static str),
        Fail,
        Hang,
        Panic,
    }

    struct TestProvider {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl TestProvider {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiProvider for TestProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(&self, _prompt: &str, _ctx: &PromptContext) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Reply(text) => Ok(text.to_string()),
                Behavior::Fail => Err(LlmError::RequestFailed {
                    provider: self.name.to_string(),
                    status: 500,
                    message: "upstream exploded".to_string(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
                Behavior::Panic => panic!("provider bug"),
            }
        }
    }

    fn request() -> AiRequest {
        AiRequest::SymptomAnalysis(SymptomAnalysisRequest {
            symptoms: vec!["fever".to_string()],
            age: None,
            duration: None,
            severity: None,
            patient_id: Some("p1".to_string()),
        })
    }

    fn orchestrator(providers: Vec<Arc<TestProvider>>) -> ProviderOrchestrator {
        let cache = Arc::new(TtlCache::new(100));
        providers
            .into_iter()
            .fold(ProviderOrchestrator::new(cache, OrchestratorConfig::default()), |o, p| {
                o.with_provider(p)
            })
    }

    #[tokio::test]
    async fn test_primary_success_is_cached() {
        let a = TestProvider::new("a", Behavior::Reply(r#"{"content": "rest"}"#));
        let orch = orchestrator(vec![a.clone()]);

        let first = orch.execute(&request()).await;
        assert_eq!(first.source, ResponseSource::Provider);
        assert_eq!(first.result.provider_name, "a");

        let second = orch.execute(&request()).await;
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.result, first.result);
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_secondary_used_when_primary_fails() {
        let a = TestProvider::new("a", Behavior::Fail);
        let b = TestProvider::new("b", Behavior::Reply("Plain advice"));
        let orch = orchestrator(vec![a.clone(), b.clone()]);

        let response = orch.execute(&request()).await;
        assert_eq!(response.result.provider_name, "b");
        assert_eq!(response.attempts.len(), 2);
        assert!(!response.attempts[0].succeeded());
        assert!(response.attempts[1].succeeded());
        assert!(orch.cache().get(&response.cache_key).is_some());
    }

    #[tokio::test]
    async fn test_panicking_provider_is_isolated() {
        let a = TestProvider::new("a", Behavior::Panic);
        let b = TestProvider::new("b", Behavior::Reply("ok"));
        let orch = orchestrator(vec![a, b]);

        let response = orch.execute(&request()).await;
        assert_eq!(response.result.provider_name, "b");
        assert!(matches!(
            response.attempts[0].outcome,
            AttemptOutcome::Failed(LlmError::RequestFailed { status: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_unusable_output_falls_through() {
        let a = TestProvider::new("a", Behavior::Reply("   "));
        let b = TestProvider::new("b", Behavior::Reply("ok"));
        let orch = orchestrator(vec![a, b]);

        let response = orch.execute(&request()).await;
        assert!(matches!(
            response.attempts[0].outcome,
            AttemptOutcome::Failed(LlmError::InvalidResponse { .. })
        ));
        assert_eq!(response.result.provider_name, "b");
    }

    #[tokio::test]
    async fn test_all_fail_uses_uncached_fallback() {
        let a = TestProvider::new("a", Behavior::Fail);
        let b = TestProvider::new("b", Behavior::Fail);
        let orch = orchestrator(vec![a.clone(), b.clone()]);

        let response = orch.execute(&request()).await;
        assert_eq!(response.source, ResponseSource::LocalFallback);
        assert_eq!(response.result.provider_name, LOCAL_FALLBACK_PROVIDER);
        assert!(orch.cache().get(&response.cache_key).is_none());

        // Fallback does not shadow providers on the next call.
        orch.execute(&request()).await;
        assert_eq!(a.calls(), 2);
        assert_eq!(b.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_providers_uses_fallback() {
        let orch = orchestrator(vec![]);
        let response = orch.execute(&request()).await;
        assert_eq!(response.source, ResponseSource::LocalFallback);
        assert!(response.attempts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_primary_times_out() {
        let a = TestProvider::new("a", Behavior::Hang);
        let b = TestProvider::new("b", Behavior::Reply("ok"));
        let orch = orchestrator(vec![a, b]);

        let response = orch.execute(&request()).await;
        assert_eq!(response.result.provider_name, "b");
        assert_eq!(
            response.attempts[0].outcome,
            AttemptOutcome::Failed(LlmError::Timeout {
                provider: "a".to_string(),
                after_ms: 6_000,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_whole_chain() {
        let a = TestProvider::new("a", Behavior::Hang);
        let b = TestProvider::new("b", Behavior::Hang);
        let c = TestProvider::new("c", Behavior::Reply("too late"));
        let orch = orchestrator(vec![a, b, c.clone()]);

        let response = orch.execute(&request()).await;
        assert_eq!(response.source, ResponseSource::LocalFallback);
        // a gets 6s, b gets the remaining 4s, c never runs.
        assert_eq!(
            response.attempts[1].outcome,
            AttemptOutcome::Failed(LlmError::Timeout {
                provider: "b".to_string(),
                after_ms: 4_000,
            })
        );
        assert!(matches!(
            response.attempts[2].outcome,
            AttemptOutcome::Failed(LlmError::DeadlineExceeded { .. })
        ));
        assert_eq!(c.calls(), 0);
    }

    #[tokio::test]
    async fn test_emergency_provider_answer_gets_numbers() {
        let reply = r#"{"content": "Apply pressure", "actionItems": ["Press firmly"]}"#;
        let a = TestProvider::new("a", Behavior::Reply(reply));
        let orch = orchestrator(vec![a]);
        let request = AiRequest::EmergencyGuidance(EmergencyGuidanceRequest {
            situation: "deep cut on arm".to_string(),
            location: None,
            patient_id: None,
            notify_contact: None,
        });

        let response = orch.execute(&request).await;
        assert_eq!(response.source, ResponseSource::Provider);
        assert!(response.result.action_items[0].contains("112"));
        assert!(response.result.action_items.iter().any(|i| i == "Press firmly"));
    }
}
