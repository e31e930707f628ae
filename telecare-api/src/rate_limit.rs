//! Fixed-window request rate limiter.
//!
//! Each client identity owns one window `{count, reset_at}`. The first
//! request creates the window, later requests in it increment the count, and
//! once `reset_at` has passed the next request starts a fresh window. A
//! client can therefore land up to `2 * max_requests` around a window
//! boundary; memory stays at one small record per identity.
//!
//! Elapsed windows are swept lazily from `check`, at most once per sweep
//! interval.

use axum::http::request::Parts;
use axum::http::HeaderMap;
use dashmap::DashMap;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telecare_core::{Clock, SystemClock};

/// Characters of the User-Agent that distinguish clients behind one address.
const USER_AGENT_PREFIX_CHARS: usize = 32;

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at_ms: i64,
}

/// Outcome of one [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Window end as Unix epoch milliseconds
    pub reset_at: i64,
    /// Seconds until the window resets; zero when allowed
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    /// Window end as whole Unix seconds, for the `X-RateLimit-Reset` header.
    pub fn reset_at_secs(&self) -> i64 {
        (self.reset_at + 999).div_euclid(1000)
    }
}

/// In-process rate limiter keyed by client identity.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    clock: Arc<dyn Clock>,
    sweep_interval_ms: i64,
    last_sweep_ms: AtomicI64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("identities", &self.windows.len())
            .field("sweep_interval_ms", &self.sweep_interval_ms)
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Duration::from_secs(60))
    }
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>, sweep_interval: Duration) -> Self {
        let now = clock.now_millis();
        Self {
            windows: DashMap::new(),
            clock,
            sweep_interval_ms: i64::try_from(sweep_interval.as_millis()).unwrap_or(i64::MAX),
            last_sweep_ms: AtomicI64::new(now),
        }
    }

    /// Count one request for `identity` against `max_requests` per `window`.
    pub fn check(&self, identity: &str, max_requests: u32, window: Duration) -> RateLimitDecision {
        let now = self.clock.now_millis();
        self.maybe_sweep(now);

        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let reset_at_ms = now.saturating_add(window_ms);
        let mut entry = self
            .windows
            .entry(identity.to_string())
            .or_insert(RateWindow {
                count: 0,
                reset_at_ms,
            });

        if now >= entry.reset_at_ms {
            *entry = RateWindow {
                count: 0,
                reset_at_ms,
            };
        }
        entry.count = entry.count.saturating_add(1);
        let RateWindow { count, reset_at_ms } = *entry;
        drop(entry);

        if count > max_requests {
            let wait_ms = (reset_at_ms - now).max(1);
            RateLimitDecision {
                allowed: false,
                limit: max_requests,
                remaining: 0,
                reset_at: reset_at_ms,
                retry_after_secs: (wait_ms as u64).div_ceil(1000),
            }
        } else {
            RateLimitDecision {
                allowed: true,
                limit: max_requests,
                remaining: max_requests - count,
                reset_at: reset_at_ms,
                retry_after_secs: 0,
            }
        }
    }

    /// Drop every window that has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        self.last_sweep_ms.store(now, Ordering::Relaxed);
        self.retain_live(now)
    }

    fn retain_live(&self, now: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| now < w.reset_at_ms);
        before.saturating_sub(self.windows.len())
    }

    fn maybe_sweep(&self, now: i64) {
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.sweep_interval_ms {
            return;
        }
        // Only one caller wins the sweep for this interval
        if self
            .last_sweep_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let removed = self.retain_live(now);
            if removed > 0 {
                tracing::debug!(removed, "Swept elapsed rate-limit windows");
            }
        }
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    pub fn reset(&self) {
        self.windows.clear();
    }
}

// ============================================================================
// CLIENT IDENTITY
// ============================================================================

/// Rate-limit identity of a caller: client address plus a User-Agent prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    pub ip: String,
    pub user_agent_prefix: String,
}

impl ClientIdentity {
    /// Derive the identity from forwarding headers, falling back to the
    /// socket address when the server was started with connect info.
    pub fn from_parts(parts: &Parts) -> Self {
        let peer = parts
            .extensions
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string());
        Self::from_headers(&parts.headers, peer)
    }

    pub fn from_headers(headers: &HeaderMap, peer: Option<String>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .or_else(|| header("x-real-ip").map(str::to_string))
            .or(peer)
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent_prefix = header("user-agent")
            .map(|ua| ua.chars().take(USER_AGENT_PREFIX_CHARS).collect())
            .unwrap_or_default();

        Self {
            ip,
            user_agent_prefix,
        }
    }

    /// Store key for one route class.
    pub fn key_for(&self, route: &str) -> String {
        format!("{}:{}|{}", route, self.ip, self.user_agent_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use telecare_core::ManualClock;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (RateLimiter::new(clock.clone(), Duration::from_secs(60)), clock)
    }

    #[test]
    fn test_nth_call_allowed_with_zero_remaining() {
        let (limiter, _) = limiter();
        let window = Duration::from_secs(60);
        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("client", 5, window);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
        let denied = limiter.check("client", 5, window);
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs > 0);
        assert_eq!(denied.retry_after_secs, 60);
    }

    #[test]
    fn test_huge_window_still_denies() {
        let (limiter, _) = limiter();
        let window = Duration::from_secs(u64::MAX);
        assert!(limiter.check("client", 1, window).allowed);

        let denied = limiter.check("client", 1, window);
        assert!(!denied.allowed);
        assert_eq!(denied.reset_at, i64::MAX);
        assert!(denied.retry_after_secs > 0);
    }

    #[test]
    fn test_window_elapse_starts_fresh_count() {
        let (limiter, clock) = limiter();
        let window = Duration::from_millis(60_000);

        assert!(limiter.check("x", 2, window).allowed);
        assert!(limiter.check("x", 2, window).allowed);
        assert!(!limiter.check("x", 2, window).allowed);

        clock.advance_millis(60_001);
        let decision = limiter.check("x", 2, window);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1, "fresh window counts this call as the first");
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let (limiter, clock) = limiter();
        let window = Duration::from_millis(10_000);
        limiter.check("x", 1, window);
        clock.advance_millis(8_500);
        let denied = limiter.check("x", 1, window);
        assert_eq!(denied.retry_after_secs, 2);
    }

    #[test]
    fn test_identities_are_independent() {
        let (limiter, _) = limiter();
        let window = Duration::from_secs(60);
        assert!(limiter.check("a", 1, window).allowed);
        assert!(!limiter.check("a", 1, window).allowed);
        assert!(limiter.check("b", 1, window).allowed);
    }

    #[test]
    fn test_lazy_sweep_removes_elapsed_windows() {
        let (limiter, clock) = limiter();
        let window = Duration::from_secs(1);
        limiter.check("a", 10, window);
        limiter.check("b", 10, window);
        assert_eq!(limiter.tracked_identities(), 2);

        clock.advance(Duration::from_secs(61));
        limiter.check("c", 10, window);
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn test_explicit_sweep() {
        let (limiter, clock) = limiter();
        limiter.check("a", 10, Duration::from_secs(1));
        limiter.check("b", 10, Duration::from_secs(120));
        clock.advance(Duration::from_secs(2));
        assert_eq!(limiter.sweep(), 1);
    }

    #[test]
    fn test_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert(
            "user-agent",
            HeaderValue::from_static("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36"),
        );
        let identity = ClientIdentity::from_headers(&headers, Some("10.0.0.9".to_string()));
        assert_eq!(identity.ip, "203.0.113.7");
        assert_eq!(identity.user_agent_prefix.chars().count(), 32);
        assert!(identity.key_for("chat").starts_with("chat:203.0.113.7|Mozilla"));
    }

    #[test]
    fn test_identity_falls_back_to_peer() {
        let identity =
            ClientIdentity::from_headers(&HeaderMap::new(), Some("10.0.0.9".to_string()));
        assert_eq!(identity.ip, "10.0.0.9");
        assert_eq!(identity.user_agent_prefix, "");

        let unknown = ClientIdentity::from_headers(&HeaderMap::new(), None);
        assert_eq!(unknown.ip, "unknown");
    }
}
