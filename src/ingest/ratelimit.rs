//! Per-key request admission.
//!
//! The limiter is an explicit value handed to whoever needs it; there is no
//! process-wide table. Multi-instance deployments can provide another
//! [`RateLimiter`] backed by a shared store.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Longest window accepted from configuration.
const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

pub trait RateLimiter: Send + Sync {
    /// Record one request for `key` and decide whether it is admitted.
    fn check(&self, key: &str) -> RateDecision;
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed-window counter per key, held in memory.
///
/// The first request for a key (or the first after its window has passed)
/// opens a new window. Requests beyond `max_requests` inside a window are
/// refused until `reset_at`.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter for authenticated API calls.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Self::window_from(config))
    }

    /// Limiter for API-key event ingestion.
    pub fn ingest_from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.ingest_max_requests, Self::window_from(config))
    }

    fn window_from(config: &RateLimitConfig) -> Duration {
        Duration::seconds(config.window_secs.min(MAX_WINDOW_SECS) as i64)
    }

    /// [`RateLimiter::check`] with an explicit clock.
    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateDecision {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let fresh = WindowEntry {
            count: 0,
            reset_at: now + self.window,
        };
        let slot = entries.entry(key.to_string()).or_insert(fresh);
        if now > slot.reset_at {
            *slot = fresh;
        }
        slot.count = slot.count.saturating_add(1);
        let entry = *slot;

        let decision = RateDecision {
            allowed: entry.count <= self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_at: entry.reset_at,
        };
        if !decision.allowed {
            debug!(key, count = entry.count, max = self.max_requests, "request refused");
        }
        decision
    }

    /// Drop windows that ended before `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.reset_at >= now);
        before - entries.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_allows_within_limit() {
        let limiter = FixedWindowLimiter::new(10, Duration::seconds(60));
        let decision = limiter.check_at("user:1", t0());
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.reset_at, t0() + Duration::seconds(60));
    }

    #[test]
    fn test_denies_past_limit() {
        let limiter = FixedWindowLimiter::new(5, Duration::seconds(60));
        for _ in 0..5 {
            assert!(limiter.check_at("user:1", t0()).allowed);
        }
        let decision = limiter.check_at("user:1", t0() + Duration::seconds(10));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, t0() + Duration::seconds(60));
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = FixedWindowLimiter::new(1, Duration::seconds(60));
        assert!(limiter.check_at("k", t0()).allowed);
        assert!(!limiter.check_at("k", t0() + Duration::seconds(60)).allowed);

        let decision = limiter.check_at("k", t0() + Duration::seconds(61));
        assert!(decision.allowed);
        assert_eq!(decision.reset_at, t0() + Duration::seconds(121));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = FixedWindowLimiter::new(1, Duration::seconds(60));
        assert!(limiter.check_at("a", t0()).allowed);
        assert!(limiter.check_at("b", t0()).allowed);
        assert!(!limiter.check_at("a", t0()).allowed);
    }

    #[test]
    fn test_purge_expired() {
        let limiter = FixedWindowLimiter::new(3, Duration::seconds(60));
        limiter.check_at("old", t0());
        limiter.check_at("new", t0() + Duration::seconds(50));
        assert_eq!(limiter.tracked_keys(), 2);

        assert_eq!(limiter.purge_expired(t0() + Duration::seconds(61)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = RateLimitConfig::default();
        let limiter = FixedWindowLimiter::ingest_from_config(&config);
        assert_eq!(limiter.check_at("apikey:x", t0()).remaining, 999);

        let limiter = FixedWindowLimiter::from_config(&config);
        assert_eq!(limiter.check_at("user:x", t0()).remaining, 99);
    }

    #[test]
    fn test_shared_across_threads() {
        let limiter = std::sync::Arc::new(FixedWindowLimiter::new(100, Duration::seconds(60)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        limiter.check_at("shared", t0());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let decision = limiter.check_at("shared", t0());
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }
}
