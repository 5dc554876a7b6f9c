// crates/ultimate-mcp-core/src/breaker.rs
// ============================================================================
// Module: Circuit Breaker
// Description: Three-state failure gate for named dependencies.
// Purpose: Convert repeated dependency failures into fast rejections.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Closed forwards calls and counts consecutive failures; open rejects
//! immediately until a timeout elapses; half-open admits a bounded number of
//! probes and closes after enough consecutive successes. Acquisition and
//! recording are separate steps so the guarded call can await without holding
//! the breaker lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Breaker thresholds for one dependency.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker.
    pub success_threshold: u32,
    /// Time the breaker stays open before probing.
    pub open_timeout: Duration,
    /// Maximum concurrent probes while half-open.
    pub half_open_max: u32,
}

impl BreakerConfig {
    /// Default read-path thresholds.
    #[must_use]
    pub const fn read_defaults() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            half_open_max: 2,
        }
    }

    /// Default write-path thresholds.
    #[must_use]
    pub const fn write_defaults() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            half_open_max: 2,
        }
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Public breaker state label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Forwarding calls.
    Closed,
    /// Rejecting calls.
    Open,
    /// Probing recovery.
    HalfOpen,
}

/// Interior state machine.
#[derive(Debug, Clone, Copy)]
enum Inner {
    /// Forwarding; counts consecutive failures.
    Closed {
        /// Consecutive failures observed.
        failures: u32,
    },
    /// Rejecting; remembers when it opened.
    Open {
        /// When the breaker opened.
        since: Instant,
    },
    /// Probing; bounds concurrent probes and counts successes.
    HalfOpen {
        /// Probes currently in flight.
        inflight: u32,
        /// Consecutive probe successes.
        successes: u32,
    },
}

/// Rejection returned while the breaker is open or probe-saturated.
#[derive(Debug, Error)]
#[error("circuit open for {dependency}")]
pub struct CircuitOpen {
    /// Guarded dependency name.
    pub dependency: &'static str,
    /// Time until the next probe window, when known.
    pub retry_after: Option<Duration>,
}

/// Telemetry snapshot of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// Guarded dependency name.
    pub dependency: &'static str,
    /// Current state label.
    pub state: BreakerState,
    /// Consecutive failures (closed) or probe successes (half-open).
    pub counter: u32,
}

// ============================================================================
// SECTION: Circuit Breaker
// ============================================================================

/// Concurrency-safe three-state circuit breaker.
pub struct CircuitBreaker {
    /// Guarded dependency name.
    dependency: &'static str,
    /// Breaker thresholds.
    config: BreakerConfig,
    /// State machine.
    state: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for the named dependency.
    #[must_use]
    pub fn new(dependency: &'static str, config: BreakerConfig) -> Self {
        Self {
            dependency,
            config,
            state: Mutex::new(Inner::Closed {
                failures: 0,
            }),
        }
    }

    /// Asks to forward one call.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitOpen`] while the breaker is open or the half-open
    /// probe budget is exhausted.
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        self.try_acquire_at(Instant::now())
    }

    /// Acquisition at an explicit instant (testable form).
    ///
    /// # Errors
    ///
    /// Returns [`CircuitOpen`] while the breaker rejects calls.
    pub fn try_acquire_at(&self, now: Instant) -> Result<(), CircuitOpen> {
        let Ok(mut state) = self.state.lock() else {
            return Err(CircuitOpen {
                dependency: self.dependency,
                retry_after: None,
            });
        };
        match *state {
            Inner::Closed {
                ..
            } => Ok(()),
            Inner::Open {
                since,
            } => {
                let elapsed = now.duration_since(since);
                if elapsed >= self.config.open_timeout {
                    *state = Inner::HalfOpen {
                        inflight: 1,
                        successes: 0,
                    };
                    Ok(())
                } else {
                    Err(CircuitOpen {
                        dependency: self.dependency,
                        retry_after: Some(self.config.open_timeout - elapsed),
                    })
                }
            }
            Inner::HalfOpen {
                inflight,
                successes,
            } => {
                if inflight >= self.config.half_open_max {
                    Err(CircuitOpen {
                        dependency: self.dependency,
                        retry_after: None,
                    })
                } else {
                    *state = Inner::HalfOpen {
                        inflight: inflight + 1,
                        successes,
                    };
                    Ok(())
                }
            }
        }
    }

    /// Records a successful guarded call.
    pub fn record_success(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match *state {
            Inner::Closed {
                ..
            } => {
                *state = Inner::Closed {
                    failures: 0,
                };
            }
            Inner::HalfOpen {
                inflight,
                successes,
            } => {
                let successes = successes + 1;
                if successes >= self.config.success_threshold {
                    *state = Inner::Closed {
                        failures: 0,
                    };
                } else {
                    *state = Inner::HalfOpen {
                        inflight: inflight.saturating_sub(1),
                        successes,
                    };
                }
            }
            Inner::Open {
                ..
            } => {}
        }
    }

    /// Records a failed guarded call.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// Failure recording at an explicit instant (testable form).
    pub fn record_failure_at(&self, now: Instant) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match *state {
            Inner::Closed {
                failures,
            } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    *state = Inner::Open {
                        since: now,
                    };
                } else {
                    *state = Inner::Closed {
                        failures,
                    };
                }
            }
            Inner::HalfOpen {
                ..
            } => {
                *state = Inner::Open {
                    since: now,
                };
            }
            Inner::Open {
                ..
            } => {}
        }
    }

    /// Returns the current state label.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.state.lock().map_or(BreakerState::Open, |state| match *state {
            Inner::Closed {
                ..
            } => BreakerState::Closed,
            Inner::Open {
                ..
            } => BreakerState::Open,
            Inner::HalfOpen {
                ..
            } => BreakerState::HalfOpen,
        })
    }

    /// Returns a telemetry snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let (state, counter) = self.state.lock().map_or((BreakerState::Open, 0), |state| {
            match *state {
                Inner::Closed {
                    failures,
                } => (BreakerState::Closed, failures),
                Inner::Open {
                    ..
                } => (BreakerState::Open, 0),
                Inner::HalfOpen {
                    successes,
                    ..
                } => (BreakerState::HalfOpen, successes),
            }
        });
        BreakerSnapshot {
            dependency: self.dependency,
            state,
            counter,
        }
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

    use super::BreakerConfig;
    use super::BreakerState;
    use super::CircuitBreaker;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "graph-read",
            BreakerConfig {
                failure_threshold: 3,
                success_threshold: 2,
                open_timeout: Duration::from_secs(30),
                half_open_max: 1,
            },
        )
    }

    #[test]
    fn exactly_threshold_failures_open_the_breaker() {
        let breaker = breaker();
        let now = Instant::now();
        breaker.record_failure_at(now);
        breaker.record_failure_at(now);
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure_at(now);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn open_breaker_rejects_until_timeout() {
        let breaker = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(now);
        }
        let rejection = breaker.try_acquire_at(now + Duration::from_secs(1)).unwrap_err();
        assert_eq!(rejection.dependency, "graph-read");
        assert!(rejection.retry_after.unwrap() <= Duration::from_secs(30));
        assert!(breaker.try_acquire_at(now + Duration::from_secs(31)).is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn one_success_does_not_close_when_threshold_is_two() {
        let breaker = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(now);
        }
        assert!(breaker.try_acquire_at(now + Duration::from_secs(31)).is_ok());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.try_acquire_at(now + Duration::from_secs(31)).is_ok());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(now);
        }
        assert!(breaker.try_acquire_at(now + Duration::from_secs(31)).is_ok());
        breaker.record_failure_at(now + Duration::from_secs(31));
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn half_open_probe_budget_is_bounded() {
        let breaker = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(now);
        }
        let probe_time = now + Duration::from_secs(31);
        assert!(breaker.try_acquire_at(probe_time).is_ok());
        // Budget of one: a second concurrent probe is rejected.
        assert!(breaker.try_acquire_at(probe_time).is_err());
    }

    #[test]
    fn success_resets_closed_failure_count() {
        let breaker = breaker();
        let now = Instant::now();
        breaker.record_failure_at(now);
        breaker.record_failure_at(now);
        breaker.record_success();
        breaker.record_failure_at(now);
        breaker.record_failure_at(now);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
