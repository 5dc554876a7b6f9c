// crates/ultimate-mcp-core/src/ratelimit.rs
// ============================================================================
// Module: Rate Limiter
// Description: Fixed-window per-principal request limits with burst control.
// Purpose: Charge minute/hour/day/burst counters and compute retry hints.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Counters are fixed windows keyed by principal (authenticated user id, else
//! client address). Four windows apply: one second (burst), one minute, one
//! hour, one day. The first exhausted window rejects the request with the time
//! remaining until that window resets. The key table is bounded; when full,
//! stale keys are evicted before new ones are admitted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Rate limiter settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per minute.
    pub per_minute: u32,
    /// Requests allowed per hour.
    pub per_hour: u32,
    /// Requests allowed per day.
    pub per_day: u32,
    /// Requests allowed in any one-second burst window.
    pub burst: u32,
    /// Maximum number of tracked principals.
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 1_000,
            per_day: 10_000,
            burst: 10,
            max_entries: 65_536,
        }
    }
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Outcome of charging the limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted; counters charged.
    Allow,
    /// Request rejected by an exhausted window.
    Limited {
        /// Which window rejected the request.
        window: &'static str,
        /// Seconds until that window resets.
        retry_after_secs: u64,
    },
    /// Key table is saturated with live principals.
    OverCapacity,
}

// ============================================================================
// SECTION: Window State
// ============================================================================

/// One fixed window's counter.
#[derive(Debug, Clone, Copy)]
struct Window {
    /// Window start time.
    started: Instant,
    /// Requests observed in the current window.
    count: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            count: 0,
        }
    }

    /// Resets the window when its span has elapsed.
    fn roll(&mut self, now: Instant, span: Duration) {
        if now.duration_since(self.started) >= span {
            self.started = now;
            self.count = 0;
        }
    }

    /// Seconds until the window resets, rounded up.
    fn retry_after(&self, now: Instant, span: Duration) -> u64 {
        let elapsed = now.duration_since(self.started);
        let remaining = span.saturating_sub(elapsed);
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 { secs.saturating_add(1) } else { secs.max(1) }
    }
}

/// All windows tracked for one principal.
#[derive(Debug, Clone, Copy)]
struct PrincipalState {
    /// One-second burst window.
    burst: Window,
    /// One-minute window.
    minute: Window,
    /// One-hour window.
    hour: Window,
    /// One-day window.
    day: Window,
    /// Last request time, used for stale eviction.
    last_seen: Instant,
}

impl PrincipalState {
    fn new(now: Instant) -> Self {
        Self {
            burst: Window::new(now),
            minute: Window::new(now),
            hour: Window::new(now),
            day: Window::new(now),
            last_seen: now,
        }
    }
}

// ============================================================================
// SECTION: Rate Limiter
// ============================================================================

const BURST_SPAN: Duration = Duration::from_secs(1);
const MINUTE_SPAN: Duration = Duration::from_secs(60);
const HOUR_SPAN: Duration = Duration::from_secs(3_600);
const DAY_SPAN: Duration = Duration::from_secs(86_400);

/// Fixed-window rate limiter with in-memory buckets.
pub struct RateLimiter {
    /// Limiter configuration.
    config: RateLimitConfig,
    /// Per-principal window state.
    buckets: Mutex<HashMap<String, PrincipalState>>,
}

impl RateLimiter {
    /// Creates a limiter from configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Charges the limiter for the given principal key.
    #[must_use]
    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Charges the limiter at an explicit instant (testable form).
    #[must_use]
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let Ok(mut buckets) = self.buckets.lock() else {
            return RateDecision::OverCapacity;
        };

        if buckets.len() >= self.config.max_entries && !buckets.contains_key(key) {
            // Evict principals idle past a full day before refusing admission.
            buckets.retain(|_, state| now.duration_since(state.last_seen) < DAY_SPAN);
            if buckets.len() >= self.config.max_entries {
                return RateDecision::OverCapacity;
            }
        }

        let state = buckets.entry(key.to_string()).or_insert_with(|| PrincipalState::new(now));
        state.burst.roll(now, BURST_SPAN);
        state.minute.roll(now, MINUTE_SPAN);
        state.hour.roll(now, HOUR_SPAN);
        state.day.roll(now, DAY_SPAN);
        state.last_seen = now;

        let checks: [(&'static str, &Window, Duration, u32); 4] = [
            ("burst", &state.burst, BURST_SPAN, self.config.burst),
            ("minute", &state.minute, MINUTE_SPAN, self.config.per_minute),
            ("hour", &state.hour, HOUR_SPAN, self.config.per_hour),
            ("day", &state.day, DAY_SPAN, self.config.per_day),
        ];
        for (window, state_window, span, limit) in checks {
            if state_window.count >= limit {
                return RateDecision::Limited {
                    window,
                    retry_after_secs: state_window.retry_after(now, span),
                };
            }
        }

        state.burst.count = state.burst.count.saturating_add(1);
        state.minute.count = state.minute.count.saturating_add(1);
        state.hour.count = state.hour.count.saturating_add(1);
        state.day.count = state.day.count.saturating_add(1);
        RateDecision::Allow
    }

    /// Returns the number of tracked principals.
    #[must_use]
    pub fn tracked_principals(&self) -> usize {
        self.buckets.lock().map(|buckets| buckets.len()).unwrap_or(0)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::time::Duration;
    use std::time::Instant;

    use super::RateDecision;
    use super::RateLimitConfig;
    use super::RateLimiter;

    fn limiter(burst: u32, per_minute: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            per_minute,
            per_hour: 10_000,
            per_day: 100_000,
            burst,
            max_entries: 8,
        })
    }

    #[test]
    fn burst_window_rejects_after_limit() {
        let limiter = limiter(3, 100);
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(limiter.check_at("alice", now), RateDecision::Allow);
        }
        match limiter.check_at("alice", now) {
            RateDecision::Limited {
                window,
                retry_after_secs,
            } => {
                assert_eq!(window, "burst");
                assert!(retry_after_secs >= 1);
            }
            other => panic!("expected burst limit, got {other:?}"),
        }
    }

    #[test]
    fn burst_window_resets_after_a_second() {
        let limiter = limiter(2, 100);
        let now = Instant::now();
        assert_eq!(limiter.check_at("alice", now), RateDecision::Allow);
        assert_eq!(limiter.check_at("alice", now), RateDecision::Allow);
        assert!(matches!(limiter.check_at("alice", now), RateDecision::Limited { .. }));
        let later = now + Duration::from_millis(1_100);
        assert_eq!(limiter.check_at("alice", later), RateDecision::Allow);
    }

    #[test]
    fn minute_window_rejects_the_next_call_and_recovers() {
        let limiter = limiter(1_000, 5);
        let mut now = Instant::now();
        for _ in 0..5 {
            // Step past the burst window between calls.
            assert_eq!(limiter.check_at("alice", now), RateDecision::Allow);
            now += Duration::from_secs(2);
        }
        match limiter.check_at("alice", now) {
            RateDecision::Limited {
                window,
                ..
            } => assert_eq!(window, "minute"),
            other => panic!("expected minute limit, got {other:?}"),
        }
        let next_window = now + Duration::from_secs(61);
        assert_eq!(limiter.check_at("alice", next_window), RateDecision::Allow);
    }

    #[test]
    fn principals_are_isolated() {
        let limiter = limiter(1, 100);
        let now = Instant::now();
        assert_eq!(limiter.check_at("alice", now), RateDecision::Allow);
        assert!(matches!(limiter.check_at("alice", now), RateDecision::Limited { .. }));
        assert_eq!(limiter.check_at("bob", now), RateDecision::Allow);
    }

    #[test]
    fn saturated_table_refuses_new_live_principals() {
        let limiter = limiter(10, 100);
        let now = Instant::now();
        for index in 0..8 {
            assert_eq!(limiter.check_at(&format!("user-{index}"), now), RateDecision::Allow);
        }
        assert_eq!(limiter.check_at("user-9", now), RateDecision::OverCapacity);
        assert_eq!(limiter.tracked_principals(), 8);
    }
}
