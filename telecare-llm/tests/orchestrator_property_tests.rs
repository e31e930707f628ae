//! Property-based and scenario tests for the provider orchestrator.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use telecare_core::{ManualClock, ResponseSource, LOCAL_FALLBACK_PROVIDER};
use telecare_llm::{OrchestratorConfig, ProviderOrchestrator, FALLBACK_CONFIDENCE};
use telecare_storage::TtlCache;
use telecare_test_utils::generators::arb_symptom_request;
use telecare_test_utils::{
    emergency_request, json_reply, symptom_request, ProviderStep, ScriptedProvider,
};

fn orchestrator_with(
    cache: Arc<TtlCache<telecare_core::ProviderResult>>,
    providers: &[Arc<ScriptedProvider>],
) -> ProviderOrchestrator {
    providers.iter().fold(
        ProviderOrchestrator::new(cache, OrchestratorConfig::default()),
        |o, p| o.with_provider(p.clone()),
    )
}

#[tokio::test]
async fn test_secondary_result_is_cached_and_reused() -> Result<(), String> {
    let a = ScriptedProvider::failing("primary");
    let b = ScriptedProvider::replying("secondary", json_reply("Rest and fluids", 0.85));
    let cache = Arc::new(TtlCache::new(100));
    let orchestrator = orchestrator_with(cache.clone(), &[a.clone(), b.clone()]);
    let request = symptom_request(&["fever", "cough"]);

    let first = orchestrator.execute(&request).await;
    if first.result.provider_name != "secondary" {
        return Err(format!("expected secondary, got {}", first.result.provider_name));
    }
    if cache.get(&request.cache_key()).is_none() {
        return Err("secondary result was not cached".to_string());
    }

    let second = orchestrator.execute(&request).await;
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.result.provider_name, "secondary");
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_total_failure_falls_back_without_caching() {
    let a = ScriptedProvider::failing("primary");
    let b = ScriptedProvider::failing("secondary");
    let cache = Arc::new(TtlCache::new(100));
    let orchestrator = orchestrator_with(cache.clone(), &[a, b]);
    let request = symptom_request(&["headache"]);

    let response = orchestrator.execute(&request).await;
    assert_eq!(response.source, ResponseSource::LocalFallback);
    assert_eq!(response.result.provider_name, LOCAL_FALLBACK_PROVIDER);
    assert!(response.result.confidence < 0.6);
    assert_eq!(response.attempts.len(), 2);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_provider_answer_outranks_fallback_even_when_unsure() {
    let unsure = ScriptedProvider::replying("primary", json_reply("Rest", 0.05));
    let orchestrator = orchestrator_with(Arc::new(TtlCache::new(10)), &[unsure]);

    let response = orchestrator.execute(&symptom_request(&["tired"])).await;
    assert_eq!(response.source, ResponseSource::Provider);
    assert!(response.result.confidence > FALLBACK_CONFIDENCE);
}

#[tokio::test]
async fn test_emergency_total_failure_still_actionable() {
    let orchestrator = orchestrator_with(
        Arc::new(TtlCache::new(10)),
        &[ScriptedProvider::failing("primary")],
    );
    let response = orchestrator
        .execute(&emergency_request("person collapsed and is unresponsive"))
        .await;
    assert!(response.result.action_items.iter().any(|i| i.contains("112")));
    assert!(response.result.action_items.iter().any(|i| i.contains("recovery position")));
}

#[tokio::test]
async fn test_cached_entry_expires_with_ttl() {
    let clock = Arc::new(ManualClock::default());
    let cache = Arc::new(TtlCache::with_clock(10, clock.clone()));
    let provider = ScriptedProvider::replying("primary", json_reply("ok", 0.9));
    let orchestrator = orchestrator_with(cache, &[provider.clone()]);
    let request = symptom_request(&["rash"]);

    orchestrator.execute(&request).await;
    clock.advance(Duration::from_secs(30 * 60));
    assert_eq!(orchestrator.execute(&request).await.source, ResponseSource::Cache);

    clock.advance_millis(1);
    assert_eq!(orchestrator.execute(&request).await.source, ResponseSource::Provider);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_primary_is_abandoned_for_secondary() {
    let slow = ScriptedProvider::new(
        "slow",
        vec![ProviderStep::Delay(Duration::from_secs(30), json_reply("late", 0.9))],
    );
    let fast = ScriptedProvider::replying("fast", json_reply("on time", 0.9));
    let orchestrator = orchestrator_with(Arc::new(TtlCache::new(10)), &[slow, fast]);

    let response = orchestrator.execute(&symptom_request(&["dizziness"])).await;
    assert_eq!(response.result.provider_name, "fast");
    assert_eq!(response.result.content, "on time");
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

proptest! {
    /// When every provider fails, the answer is always the fallback, always
    /// less confident than a provider answer, and never cached.
    #[test]
    fn prop_fallback_never_cached(request in arb_symptom_request(), providers in 0usize..4) {
        let rt = runtime();
        let cache = Arc::new(TtlCache::new(100));
        let failing: Vec<_> = (0..providers)
            .map(|i| ScriptedProvider::failing(format!("p{i}")))
            .collect();
        let orchestrator = orchestrator_with(cache.clone(), &failing);

        let response = rt.block_on(orchestrator.execute(&request));
        prop_assert_eq!(response.source, ResponseSource::LocalFallback);
        prop_assert_eq!(response.result.confidence, FALLBACK_CONFIDENCE);
        prop_assert_eq!(response.attempts.len(), providers);
        prop_assert!(cache.get(&request.cache_key()).is_none());
    }

    /// The first succeeding provider always wins and later ones are not called.
    #[test]
    fn prop_first_success_wins(request in arb_symptom_request(), failures in 0usize..3) {
        let rt = runtime();
        let mut chain: Vec<_> = (0..failures)
            .map(|i| ScriptedProvider::failing(format!("bad{i}")))
            .collect();
        let good = ScriptedProvider::replying("good", json_reply("fine", 0.9));
        let unused = ScriptedProvider::replying("unused", json_reply("never", 0.9));
        chain.push(good.clone());
        chain.push(unused.clone());
        let orchestrator = orchestrator_with(Arc::new(TtlCache::new(10)), &chain);

        let response = rt.block_on(orchestrator.execute(&request));
        prop_assert_eq!(response.result.provider_name, "good");
        prop_assert_eq!(good.calls(), 1);
        prop_assert_eq!(unused.calls(), 0);
    }
}
