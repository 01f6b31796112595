//! Fixed-window rate limiting.
//!
//! Two limiter families share this implementation (see [`tiers`]): the
//! client-facing tiers keyed by client identity, and the upstream-facing
//! tiers keyed by shop domain that model the commerce platform's published
//! limits. Both are consulted before any outbound privileged call.
//!
//! The window is fixed, not sliding: a client can burst up to twice its
//! quota across a window boundary. That is an accepted tradeoff for the
//! simplicity of a single counter per key.
//!
//! # Scaling
//!
//! State is an in-process map. This is correct for a single instance only;
//! a horizontally scaled deployment must put a networked counter store
//! behind the same [`consume`](RateLimiter::consume) contract.

pub mod tiers;

pub use tiers::{client_key, ClientTier, RateLimitTier, TieredLimiter, UpstreamTier};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// How often [`RateLimiter::spawn_sweeper`] prunes expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// One key's counter within the current window.
#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Outcome of a [`RateLimiter::consume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The request may proceed.
    Allowed,
    /// The quota for this window is spent.
    Limited {
        /// Whole seconds until the window resets, rounded up; always > 0.
        retry_after_secs: u64,
    },
}

impl RateLimitDecision {
    /// Returns `true` if the request may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the retry delay for a limited decision.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Allowed => None,
            Self::Limited { retry_after_secs } => Some(*retry_after_secs),
        }
    }

    /// The HTTP status a limited decision renders as.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Allowed => 200,
            Self::Limited { .. } => 429,
        }
    }

    /// Response headers for a limited decision:
    /// `Retry-After: <seconds>` and `Cache-Control: no-store`.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            Self::Allowed => Vec::new(),
            Self::Limited { retry_after_secs } => vec![
                ("Retry-After".to_string(), retry_after_secs.to_string()),
                ("Cache-Control".to_string(), "no-store".to_string()),
            ],
        }
    }
}

/// Shared fixed-window counter map.
///
/// Clones share the same counters, so one limiter can be handed to every
/// request handler at process startup. Mutation is a single short critical
/// section per request.
#[derive(Clone, Debug, Default)]
pub struct RateLimiter {
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
}

impl RateLimiter {
    /// Creates a new limiter with no counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one request from `key`'s quota of `points` per `window`.
    ///
    /// On the first request for a key, or once the stored window has
    /// lapsed, the entry resets to `count = 1` atomically with this call.
    pub fn consume(&self, key: &str, points: u32, window: Duration) -> RateLimitDecision {
        self.consume_at(key, points, window, Utc::now())
    }

    /// Clock-injected variant of [`consume`](Self::consume), used by tests.
    pub(crate) fn consume_at(
        &self,
        key: &str,
        points: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let window = ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::seconds(60));
        let mut entries = self.entries.lock();

        let entry = entries.get(key).copied();
        match entry {
            Some(entry) if now <= entry.reset_at => {
                if entry.count >= points {
                    let remaining_ms =
                        (entry.reset_at - now).num_milliseconds().max(0) as u64;
                    let retry_after_secs = ((remaining_ms + 999) / 1000).max(1);
                    RateLimitDecision::Limited { retry_after_secs }
                } else {
                    entries.insert(
                        key.to_string(),
                        RateLimitEntry {
                            count: entry.count + 1,
                            reset_at: entry.reset_at,
                        },
                    );
                    RateLimitDecision::Allowed
                }
            }
            // First request for the key, or the window has lapsed
            _ => {
                entries.insert(
                    key.to_string(),
                    RateLimitEntry {
                        count: 1,
                        reset_at: now + window,
                    },
                );
                RateLimitDecision::Allowed
            }
        }
    }

    /// Deletes entries whose window has already expired.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub(crate) fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.reset_at);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "swept expired rate limit entries");
        }
        removed
    }

    /// Returns the number of live counters (test/diagnostic aid).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no counters exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Spawns a background task sweeping every `every` duration.
    ///
    /// The returned handle can be aborted at shutdown; entries are also
    /// reset lazily on consume, so the sweep only bounds memory growth.
    #[must_use]
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the immediate first tick; there is nothing to sweep yet
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        })
    }
}

// Verify RateLimiter is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RateLimiter>();
};

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_allows_up_to_points_then_limits() {
        let limiter = RateLimiter::new();
        let now = Utc::now();

        for n in 1..=10 {
            let decision = limiter.consume_at("shopA", 10, WINDOW, now);
            assert!(decision.is_allowed(), "call {n} should be allowed");
        }
        let decision = limiter.consume_at("shopA", 10, WINDOW, now);
        assert!(!decision.is_allowed());
        assert!(decision.retry_after_secs().unwrap() > 0);
    }

    #[test]
    fn test_retry_after_reflects_window_remainder() {
        // Eleven calls within 5 seconds of the window start
        let limiter = RateLimiter::new();
        let start = Utc::now();
        for i in 0..10 {
            let at = start + ChronoDuration::milliseconds(i * 500);
            assert!(limiter.consume_at("shopA", 10, WINDOW, at).is_allowed());
        }
        let eleventh = start + ChronoDuration::seconds(5);
        let decision = limiter.consume_at("shopA", 10, WINDOW, eleventh);
        let retry_after = decision.retry_after_secs().unwrap();
        assert!(
            (55..=60).contains(&retry_after),
            "retry_after {retry_after} out of range"
        );
    }

    #[test]
    fn test_window_lapse_resets_counter() {
        let limiter = RateLimiter::new();
        let start = Utc::now();

        for _ in 0..5 {
            limiter.consume_at("key", 5, WINDOW, start);
        }
        assert!(!limiter.consume_at("key", 5, WINDOW, start).is_allowed());

        let later = start + ChronoDuration::seconds(61);
        assert!(limiter.consume_at("key", 5, WINDOW, later).is_allowed());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        assert!(limiter.consume_at("a", 1, WINDOW, now).is_allowed());
        assert!(!limiter.consume_at("a", 1, WINDOW, now).is_allowed());
        assert!(limiter.consume_at("b", 1, WINDOW, now).is_allowed());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = RateLimiter::new();
        let start = Utc::now();
        limiter.consume_at("key", 1, WINDOW, start);
        // 0.5s into the window, 59.5s remain -> rounds up to 60
        let at = start + ChronoDuration::milliseconds(500);
        let decision = limiter.consume_at("key", 1, WINDOW, at);
        assert_eq!(decision.retry_after_secs(), Some(60));
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let limiter = RateLimiter::new();
        let start = Utc::now();
        limiter.consume_at("stale", 5, Duration::from_secs(1), start);
        limiter.consume_at("fresh", 5, Duration::from_secs(3600), start);

        let removed = limiter.sweep_at(start + ChronoDuration::seconds(2));
        assert_eq!(removed, 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_limited_decision_renders_http() {
        let decision = RateLimitDecision::Limited {
            retry_after_secs: 42,
        };
        assert_eq!(decision.status(), 429);
        let headers = decision.headers();
        assert!(headers.contains(&("Retry-After".to_string(), "42".to_string())));
        assert!(headers.contains(&("Cache-Control".to_string(), "no-store".to_string())));
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let limiter = RateLimiter::new();
        let shared = limiter.clone();
        let now = Utc::now();
        assert!(limiter.consume_at("k", 1, WINDOW, now).is_allowed());
        assert!(!shared.consume_at("k", 1, WINDOW, now).is_allowed());
    }
}
