// crates/ultimate-mcp-graph/src/client.rs
// ============================================================================
// Module: Graph Client
// Description: Pooled graph access with retry, breakers, and a read cache.
// Purpose: Make every database touch bounded, observable, and fault-tolerant.
// Dependencies: tokio, ultimate-mcp-core, crate::driver
// ============================================================================

//! ## Overview
//! Every call acquires a connection slot (bounded, with a hard acquisition
//! deadline), passes the matching read or write circuit breaker, and retries
//! transient driver faults with exponential backoff. Pure read queries are
//! served through a TTL+LRU cache whose keys mix in per-label version
//! counters; each write bumps the counters for the labels it touches, so
//! stale rows cannot outlive a write to their label.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Semaphore;
use ultimate_mcp_core::breaker::BreakerConfig;
use ultimate_mcp_core::breaker::BreakerSnapshot;
use ultimate_mcp_core::breaker::CircuitBreaker;
use ultimate_mcp_core::cache::CacheStats;
use ultimate_mcp_core::cache::TtlCache;
use ultimate_mcp_core::core::hashing::hash_canonical_json_hex;

use crate::driver::DriverError;
use crate::driver::GraphDriver;
use crate::driver::Row;
use crate::driver::Statement;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Retry schedule for transient driver faults.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// First backoff delay.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff before the given retry (1-based).
    #[must_use]
    pub fn delay_before(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct GraphClientConfig {
    /// Connection slots.
    pub pool_max: usize,
    /// Slot acquisition deadline.
    pub acquisition_timeout: Duration,
    /// Retry schedule.
    pub retry: RetryPolicy,
    /// Read breaker thresholds.
    pub read_breaker: BreakerConfig,
    /// Write breaker thresholds.
    pub write_breaker: BreakerConfig,
    /// Read cache capacity.
    pub cache_capacity: usize,
    /// Read cache TTL.
    pub cache_ttl: Duration,
}

impl Default for GraphClientConfig {
    fn default() -> Self {
        Self {
            pool_max: 16,
            acquisition_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            read_breaker: BreakerConfig::read_defaults(),
            write_breaker: BreakerConfig::write_defaults(),
            cache_capacity: 1_024,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Client-level graph errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Dependency unavailable (breaker open, pool exhausted, retries spent).
    #[error("graph unavailable: {0}")]
    Unavailable(String),
    /// Statement rejected by the database parser. Never retried.
    #[error("graph query rejected: {0}")]
    QueryRejected(String),
    /// Constraint violation. Never retried.
    #[error("graph conflict: {0}")]
    Conflict(String),
    /// Anything else.
    #[error("graph internal error: {0}")]
    Internal(String),
}

impl GraphError {
    /// Returns true for failures the circuit breaker should count.
    #[must_use]
    const fn counts_against_breaker(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Internal(_))
    }
}

impl From<DriverError> for GraphError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Transient(message) => Self::Unavailable(message),
            DriverError::Syntax(message) => Self::QueryRejected(message),
            DriverError::ConstraintViolation(message) => Self::Conflict(message),
            DriverError::Unauthorized(message) | DriverError::Protocol(message) => {
                Self::Internal(message)
            }
        }
    }
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Telemetry snapshot of the client.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphMetrics {
    /// Completed read calls.
    pub reads: u64,
    /// Completed write calls.
    pub writes: u64,
    /// Retried attempts.
    pub retries: u64,
    /// Calls rejected without reaching the driver.
    pub rejected: u64,
    /// Read cache counters.
    pub cache: CacheStats,
    /// Read breaker state.
    pub read_breaker: BreakerSnapshot,
    /// Write breaker state.
    pub write_breaker: BreakerSnapshot,
    /// Free connection slots right now.
    pub pool_available: usize,
}

// ============================================================================
// SECTION: Graph Client
// ============================================================================

/// Functions that make a query's results time- or randomness-dependent.
const IMPURE_MARKERS: &[&str] = &["rand(", "timestamp(", "datetime(", "time(", "date(", "call "];

/// Pooled, breaker-guarded, cache-aware graph access.
pub struct GraphClient {
    /// Underlying driver.
    driver: Arc<dyn GraphDriver>,
    /// Connection slots.
    pool: Arc<Semaphore>,
    /// Client settings.
    config: GraphClientConfig,
    /// Read-path breaker.
    read_breaker: CircuitBreaker,
    /// Write-path breaker.
    write_breaker: CircuitBreaker,
    /// Read-through cache.
    cache: TtlCache<Vec<Row>>,
    /// Per-label write version counters.
    label_versions: Mutex<HashMap<String, u64>>,
    /// Global write version for label-less keys.
    global_version: AtomicU64,
    /// Completed read calls.
    reads: AtomicU64,
    /// Completed write calls.
    writes: AtomicU64,
    /// Retried attempts.
    retries: AtomicU64,
    /// Calls rejected before reaching the driver.
    rejected: AtomicU64,
}

impl GraphClient {
    /// Builds a client over the given driver.
    #[must_use]
    pub fn new(driver: Arc<dyn GraphDriver>, config: GraphClientConfig) -> Self {
        Self {
            driver,
            pool: Arc::new(Semaphore::new(config.pool_max.max(1))),
            read_breaker: CircuitBreaker::new("graph-read", config.read_breaker),
            write_breaker: CircuitBreaker::new("graph-write", config.write_breaker),
            cache: TtlCache::new(config.cache_capacity, config.cache_ttl),
            label_versions: Mutex::new(HashMap::new()),
            global_version: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            config,
        }
    }

    /// Runs a read statement, consulting the cache for pure queries.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] after retries, breaker rejection, or pool
    /// exhaustion.
    pub async fn execute_read(&self, query: &str, params: &Value) -> Result<Vec<Row>, GraphError> {
        let cache_key = if is_pure_query(query) { self.cache_key(query, params) } else { None };
        if let Some(key) = &cache_key {
            if let Some(rows) = self.cache.get(key) {
                self.reads.fetch_add(1, Ordering::Relaxed);
                return Ok(rows);
            }
        }

        let rows = self
            .guarded(&self.read_breaker, || async {
                self.driver.read(query, params).await
            })
            .await?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(key) = cache_key {
            self.cache.set(key, rows.clone());
        }
        Ok(rows)
    }

    /// Runs a single write statement and bumps the touched label versions.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] after retries, breaker rejection, or pool
    /// exhaustion.
    pub async fn execute_write(
        &self,
        query: &str,
        params: &Value,
        labels: &[&str],
    ) -> Result<(), GraphError> {
        self.guarded(&self.write_breaker, || async {
            self.driver.write(query, params).await
        })
        .await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bump_versions(labels);
        Ok(())
    }

    /// Runs an ordered statement batch in one atomic transaction.
    ///
    /// On retry the whole batch re-executes from the beginning; callers rely
    /// on MERGE idempotency.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] after retries, breaker rejection, or pool
    /// exhaustion.
    pub async fn execute_write_batch(
        &self,
        statements: &[Statement],
        labels: &[&str],
    ) -> Result<(), GraphError> {
        self.guarded(&self.write_breaker, || async {
            self.driver.write_batch(statements).await
        })
        .await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bump_versions(labels);
        Ok(())
    }

    /// Returns true when the database answers a liveness probe.
    pub async fn health(&self) -> bool {
        self.driver.ping().await.is_ok()
    }

    /// Returns a telemetry snapshot.
    #[must_use]
    pub fn metrics(&self) -> GraphMetrics {
        GraphMetrics {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            cache: self.cache.stats(),
            read_breaker: self.read_breaker.snapshot(),
            write_breaker: self.write_breaker.snapshot(),
            pool_available: self.pool.available_permits(),
        }
    }

    /// Sweeps expired cache entries. Returns the removed count.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep()
    }

    /// Wraps a driver call with breaker, pool slot, and retry handling.
    async fn guarded<T, F, Fut>(
        &self,
        breaker: &CircuitBreaker,
        call: F,
    ) -> Result<T, GraphError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, DriverError>>,
    {
        if let Err(open) = breaker.try_acquire() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(GraphError::Unavailable(open.to_string()));
        }

        let result = self.run_with_pool_and_retry(call).await;
        match &result {
            Ok(_) => breaker.record_success(),
            Err(err) if err.counts_against_breaker() => breaker.record_failure(),
            Err(_) => breaker.record_success(),
        }
        result
    }

    /// Acquires a pool slot and retries transient faults with backoff.
    async fn run_with_pool_and_retry<T, F, Fut>(&self, call: F) -> Result<T, GraphError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, DriverError>>,
    {
        let permit = tokio::time::timeout(
            self.config.acquisition_timeout,
            Arc::clone(&self.pool).acquire_owned(),
        )
        .await;
        let _permit = match permit {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(GraphError::Internal("connection pool closed".to_string()));
            }
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(GraphError::Unavailable(format!(
                    "connection acquisition timed out after {:?}",
                    self.config.acquisition_timeout
                )));
            }
        };

        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.retry.max_attempts => {
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(self.config.retry.delay_before(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Derives a version-mixed cache key for a pure read.
    fn cache_key(&self, query: &str, params: &Value) -> Option<String> {
        let labels = labels_in_query(query);
        let versions: Vec<u64> = if labels.is_empty() {
            vec![self.global_version.load(Ordering::Relaxed)]
        } else {
            let table = self.label_versions.lock().ok()?;
            labels.iter().map(|label| table.get(label).copied().unwrap_or(0)).collect()
        };
        hash_canonical_json_hex(&json!({
            "query": query,
            "params": params,
            "labels": labels,
            "versions": versions,
        }))
        .ok()
    }

    /// Bumps version counters for the written labels plus the global counter.
    fn bump_versions(&self, labels: &[&str]) {
        self.global_version.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut table) = self.label_versions.lock() {
            for label in labels {
                *table.entry((*label).to_string()).or_insert(0) += 1;
            }
        }
    }
}

// ============================================================================
// SECTION: Query Inspection
// ============================================================================

/// Returns true when a query has no time, randomness, or procedure calls.
#[must_use]
pub fn is_pure_query(query: &str) -> bool {
    let lowered = query.to_lowercase();
    !IMPURE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Extracts `:Label` tokens referenced by a query, sorted and deduplicated.
#[must_use]
pub fn labels_in_query(query: &str) -> Vec<String> {
    let mut labels = Vec::new();
    let bytes = query.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b':' {
            let mut end = index + 1;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
            {
                end += 1;
            }
            if end > index + 1 {
                let label = query[index + 1..end].to_string();
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
            index = end;
        } else {
            index += 1;
        }
    }
    labels.sort();
    labels
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use serde_json::json;
    use ultimate_mcp_core::breaker::BreakerState;

    use super::GraphClient;
    use super::GraphClientConfig;
    use super::GraphError;
    use super::RetryPolicy;
    use super::is_pure_query;
    use super::labels_in_query;
    use crate::driver::DriverError;
    use crate::driver::GraphDriver;
    use crate::driver::Row;
    use crate::driver::Statement;

    /// Scripted driver: fails the first `fail_first` calls, then succeeds.
    struct ScriptedDriver {
        /// Calls observed so far.
        calls: AtomicU32,
        /// Calls that fail before the driver recovers.
        fail_first: u32,
        /// Error factory for the failing calls.
        make_error: fn() -> DriverError,
    }

    impl ScriptedDriver {
        fn new(fail_first: u32, make_error: fn() -> DriverError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                make_error,
            }
        }

        fn step(&self) -> Result<(), DriverError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first { Err((self.make_error)()) } else { Ok(()) }
        }
    }

    #[async_trait]
    impl GraphDriver for ScriptedDriver {
        async fn read(&self, _query: &str, _params: &Value) -> Result<Vec<Row>, DriverError> {
            self.step()?;
            let mut row = Row::new();
            row.insert("ok".to_string(), json!(1));
            Ok(vec![row])
        }

        async fn write(&self, _query: &str, _params: &Value) -> Result<(), DriverError> {
            self.step()
        }

        async fn write_batch(&self, _statements: &[Statement]) -> Result<(), DriverError> {
            self.step()
        }

        async fn ping(&self) -> Result<(), DriverError> {
            self.step()
        }
    }

    fn fast_config() -> GraphClientConfig {
        GraphClientConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
            ..GraphClientConfig::default()
        }
    }

    #[tokio::test]
    async fn transient_faults_are_retried_to_success() {
        let driver = Arc::new(ScriptedDriver::new(2, || {
            DriverError::Transient("blip".to_string())
        }));
        let client = GraphClient::new(driver.clone(), fast_config());
        let rows = client.execute_read("MATCH (n) RETURN 1 AS ok", &json!({})).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(driver.calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.metrics().retries, 2);
    }

    #[tokio::test]
    async fn syntax_errors_are_not_retried() {
        let driver = Arc::new(ScriptedDriver::new(u32::MAX, || {
            DriverError::Syntax("bad".to_string())
        }));
        let client = GraphClient::new(driver.clone(), fast_config());
        let err = client.execute_read("BAD", &json!({})).await.unwrap_err();
        assert!(matches!(err, GraphError::QueryRejected(_)));
        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
        // Validation-class failures must not trip the breaker.
        assert_eq!(client.metrics().read_breaker.state, BreakerState::Closed);
    }

    #[tokio::test]
    async fn repeated_unavailability_opens_the_write_breaker() {
        let driver = Arc::new(ScriptedDriver::new(u32::MAX, || {
            DriverError::Transient("down".to_string())
        }));
        let client = GraphClient::new(driver, fast_config());
        for _ in 0..3 {
            let err = client.execute_write("MERGE (n)", &json!({}), &["Svc"]).await.unwrap_err();
            assert!(matches!(err, GraphError::Unavailable(_)));
        }
        assert_eq!(client.metrics().write_breaker.state, BreakerState::Open);
        // Open breaker rejects immediately without driver calls.
        let before = client.metrics().rejected;
        let err = client.execute_write("MERGE (n)", &json!({}), &["Svc"]).await.unwrap_err();
        assert!(matches!(err, GraphError::Unavailable(_)));
        assert_eq!(client.metrics().rejected, before + 1);
    }

    #[tokio::test]
    async fn pure_reads_are_cached_until_a_label_write() {
        let driver = Arc::new(ScriptedDriver::new(0, || {
            DriverError::Transient(String::new())
        }));
        let client = GraphClient::new(driver.clone(), fast_config());
        let query = "MATCH (n:Svc) RETURN count(n) AS ok";
        client.execute_read(query, &json!({})).await.unwrap();
        client.execute_read(query, &json!({})).await.unwrap();
        // Second read was a cache hit: one driver call.
        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);

        client.execute_write("MERGE (n:Svc {key: $key})", &json!({"key": "a"}), &["Svc"])
            .await
            .unwrap();
        client.execute_read(query, &json!({})).await.unwrap();
        // Label version bumped: the read went back to the driver.
        assert_eq!(driver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn impure_reads_bypass_the_cache() {
        let driver = Arc::new(ScriptedDriver::new(0, || {
            DriverError::Transient(String::new())
        }));
        let client = GraphClient::new(driver.clone(), fast_config());
        let query = "MATCH (n:Svc) RETURN timestamp() AS ok";
        client.execute_read(query, &json!({})).await.unwrap();
        client.execute_read(query, &json!({})).await.unwrap();
        assert_eq!(driver.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn purity_markers_are_detected() {
        assert!(is_pure_query("MATCH (n:Svc) RETURN n.name"));
        assert!(!is_pure_query("RETURN rand() AS r"));
        assert!(!is_pure_query("RETURN timestamp() AS t"));
        assert!(!is_pure_query("CALL db.labels()"));
    }

    #[test]
    fn label_extraction_finds_sorted_unique_labels() {
        assert_eq!(
            labels_in_query("MATCH (a:Svc)-[r:CALLS]->(b:Svc) RETURN a"),
            vec!["CALLS".to_string(), "Svc".to_string()]
        );
        assert!(labels_in_query("MATCH (n) RETURN n").is_empty());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_before(1), Duration::from_secs(2));
        assert_eq!(policy.delay_before(2), Duration::from_secs(4));
        assert_eq!(policy.delay_before(3), Duration::from_secs(8));
        assert_eq!(policy.delay_before(4), Duration::from_secs(10));
    }
}
