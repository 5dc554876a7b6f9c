// crates/ultimate-mcp-server/src/telemetry.rs
// ============================================================================
// Module: Telemetry
// Description: Request counters and latency histograms for the platform.
// Purpose: Provide metric events and an in-process registry without hard deps.
// Dependencies: ultimate-mcp-core
// ============================================================================

//! ## Overview
//! A thin metrics seam: transports record one event per request plus a
//! latency observation. The in-process registry keeps atomic counters and a
//! fixed-bucket histogram and serializes to the `/metrics` payload.
//! Deployments can substitute their own sink via the trait without redesign.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::Serialize;
use ultimate_mcp_core::ToolName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Latency histogram bucket upper bounds in milliseconds.
pub const REQUEST_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Events
// ============================================================================

/// Transport the request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// JSON-over-HTTP route.
    Http,
    /// MCP streaming-HTTP endpoint.
    Mcp,
}

/// Request outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Successful request.
    Ok,
    /// Failed request.
    Error,
}

/// One request's metric event.
#[derive(Debug, Clone)]
pub struct RequestMetric {
    /// Transport used.
    pub transport: Transport,
    /// Tool invoked, when the request reached one.
    pub tool: Option<ToolName>,
    /// Outcome classification.
    pub outcome: Outcome,
    /// Normalized error kind label when failed.
    pub error_kind: Option<&'static str>,
}

/// Metrics sink for requests and latencies.
pub trait Metrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: &RequestMetric);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: &RequestMetric, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_request(&self, _event: &RequestMetric) {}

    fn record_latency(&self, _event: &RequestMetric, _latency: Duration) {}
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// In-process metrics registry backing `/metrics`.
pub struct MetricsRegistry {
    /// Total requests observed.
    requests: AtomicU64,
    /// Failed requests observed.
    errors: AtomicU64,
    /// Per-tool invocation counters, indexed in `ToolName::all()` order.
    tool_counts: [AtomicU64; 8],
    /// Histogram bucket counters aligned with the bucket bounds.
    latency_buckets: Vec<AtomicU64>,
    /// Observations past the last bucket.
    latency_overflow: AtomicU64,
    /// Sum of observed latencies in milliseconds.
    latency_sum_ms: AtomicU64,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            tool_counts: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_buckets: REQUEST_LATENCY_BUCKETS_MS
                .iter()
                .map(|_| AtomicU64::new(0))
                .collect(),
            latency_overflow: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
        }
    }

    /// Increments one tool's invocation counter.
    pub fn record_tool_call(&self, tool: ToolName) {
        if let Some(index) = ToolName::all().iter().position(|name| *name == tool) {
            self.tool_counts[index].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests.load(Ordering::Relaxed),
            errors_total: self.errors.load(Ordering::Relaxed),
            tool_calls: ToolName::all()
                .iter()
                .enumerate()
                .map(|(index, tool)| ToolCount {
                    tool: tool.as_str(),
                    count: self.tool_counts[index].load(Ordering::Relaxed),
                })
                .collect(),
            latency_buckets_ms: REQUEST_LATENCY_BUCKETS_MS
                .iter()
                .enumerate()
                .map(|(index, bound)| BucketCount {
                    le_ms: *bound,
                    count: self.latency_buckets[index].load(Ordering::Relaxed),
                })
                .collect(),
            latency_overflow: self.latency_overflow.load(Ordering::Relaxed),
            latency_sum_ms: self.latency_sum_ms.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics for MetricsRegistry {
    fn record_request(&self, event: &RequestMetric) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if event.outcome == Outcome::Error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(tool) = event.tool {
            if let Some(index) = ToolName::all().iter().position(|name| *name == tool) {
                self.tool_counts[index].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_latency(&self, _event: &RequestMetric, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_sum_ms.fetch_add(millis, Ordering::Relaxed);
        match REQUEST_LATENCY_BUCKETS_MS.iter().position(|bound| millis <= *bound) {
            Some(index) => {
                self.latency_buckets[index].fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.latency_overflow.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

// ============================================================================
// SECTION: Snapshot Types
// ============================================================================

/// One tool's invocation count.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCount {
    /// Tool wire name.
    pub tool: &'static str,
    /// Invocations observed.
    pub count: u64,
}

/// One histogram bucket.
#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    /// Inclusive upper bound in milliseconds.
    pub le_ms: u64,
    /// Observations at or under the bound.
    pub count: u64,
}

/// Serializable registry snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total requests observed.
    pub requests_total: u64,
    /// Failed requests observed.
    pub errors_total: u64,
    /// Per-tool invocation counters.
    pub tool_calls: Vec<ToolCount>,
    /// Histogram buckets.
    pub latency_buckets_ms: Vec<BucketCount>,
    /// Observations past the last bucket.
    pub latency_overflow: u64,
    /// Sum of observed latencies in milliseconds.
    pub latency_sum_ms: u64,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::time::Duration;

    use ultimate_mcp_core::ToolName;

    use super::Metrics;
    use super::MetricsRegistry;
    use super::Outcome;
    use super::RequestMetric;
    use super::Transport;

    #[test]
    fn counters_accumulate_per_tool() {
        let registry = MetricsRegistry::new();
        let event = RequestMetric {
            transport: Transport::Http,
            tool: Some(ToolName::LintCode),
            outcome: Outcome::Ok,
            error_kind: None,
        };
        registry.record_request(&event);
        registry.record_request(&event);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.errors_total, 0);
        let lint = snapshot.tool_calls.iter().find(|count| count.tool == "lint_code").unwrap();
        assert_eq!(lint.count, 2);
    }

    #[test]
    fn latencies_land_in_the_right_bucket() {
        let registry = MetricsRegistry::new();
        let event = RequestMetric {
            transport: Transport::Mcp,
            tool: None,
            outcome: Outcome::Ok,
            error_kind: None,
        };
        registry.record_latency(&event, Duration::from_millis(3));
        registry.record_latency(&event, Duration::from_secs(120));
        let snapshot = registry.snapshot();
        let bucket = snapshot.latency_buckets_ms.iter().find(|bucket| bucket.le_ms == 5).unwrap();
        assert_eq!(bucket.count, 1);
        assert_eq!(snapshot.latency_overflow, 1);
    }

    #[test]
    fn errors_are_counted_separately() {
        let registry = MetricsRegistry::new();
        registry.record_request(&RequestMetric {
            transport: Transport::Http,
            tool: None,
            outcome: Outcome::Error,
            error_kind: Some("rate_limited"),
        });
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.requests_total, 1);
        assert_eq!(snapshot.errors_total, 1);
    }
}
