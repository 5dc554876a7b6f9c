// crates/ultimate-mcp-server/src/logging.rs
// ============================================================================
// Module: Structured Logging
// Description: JSON-line log events carrying the request correlation id.
// Purpose: Emit structured logs without a hard logging-backend dependency.
// Dependencies: serde, serde_json, ultimate-mcp-config
// ============================================================================

//! ## Overview
//! Log events are serde-rendered JSON lines behind a sink trait, so
//! deployments route them to their preferred pipeline without redesign. Every
//! event carries the correlation id of the request that produced it; internal
//! details stay here and never reach client responses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use ultimate_mcp_config::LogFormat;
use ultimate_mcp_core::epoch_millis;

// ============================================================================
// SECTION: Levels
// ============================================================================

/// Log severity levels in ascending verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Unexpected faults.
    Error,
    /// Suspicious or degraded conditions.
    Warn,
    /// Routine operational events.
    Info,
    /// Developer diagnostics.
    Debug,
}

impl LogLevel {
    /// Parses a level label, defaulting unknown labels to `Info`.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            _ => Self::Info,
        }
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

// ============================================================================
// SECTION: Events and Sinks
// ============================================================================

/// One structured log event.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    /// Event time (unix millis).
    pub timestamp_ms: u64,
    /// Severity level.
    pub level: LogLevel,
    /// Event message.
    pub message: String,
    /// Correlation id of the originating request, when any.
    pub correlation_id: Option<String>,
    /// Flat structured fields.
    pub fields: Map<String, Value>,
}

/// Sink for structured log events.
pub trait LogSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &LogEvent);
}

/// Sink that writes lines to stderr.
pub struct StderrLogSink {
    /// Output format.
    format: LogFormat,
}

impl StderrLogSink {
    /// Creates a stderr sink with the given format.
    #[must_use]
    pub const fn new(format: LogFormat) -> Self {
        Self {
            format,
        }
    }
}

impl LogSink for StderrLogSink {
    fn record(&self, event: &LogEvent) {
        match self.format {
            LogFormat::Json => {
                if let Ok(payload) = serde_json::to_string(event) {
                    let _ = writeln!(std::io::stderr(), "{payload}");
                }
            }
            LogFormat::Console => {
                let correlation =
                    event.correlation_id.as_deref().unwrap_or("-");
                let _ = writeln!(
                    std::io::stderr(),
                    "{} [{}] {} ({})",
                    event.timestamp_ms,
                    event.level.as_str(),
                    event.message,
                    correlation
                );
            }
        }
    }
}

/// No-op sink for tests.
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn record(&self, _event: &LogEvent) {}
}

// ============================================================================
// SECTION: Logger
// ============================================================================

/// Cloneable level-filtered logger over a shared sink.
#[derive(Clone)]
pub struct Logger {
    /// Shared sink.
    sink: Arc<dyn LogSink>,
    /// Maximum emitted verbosity.
    max_level: LogLevel,
}

impl Logger {
    /// Creates a logger with the given sink and level filter.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>, max_level: LogLevel) -> Self {
        Self {
            sink,
            max_level,
        }
    }

    /// Emits an event when its level passes the filter.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        correlation_id: Option<&str>,
        fields: Map<String, Value>,
    ) {
        if level > self.max_level {
            return;
        }
        self.sink.record(&LogEvent {
            timestamp_ms: epoch_millis(),
            level,
            message: message.into(),
            correlation_id: correlation_id.map(str::to_string),
            fields,
        });
    }

    /// Emits an info event.
    pub fn info(&self, message: impl Into<String>, correlation_id: Option<&str>) {
        self.log(LogLevel::Info, message, correlation_id, Map::new());
    }

    /// Emits a warning event.
    pub fn warn(&self, message: impl Into<String>, correlation_id: Option<&str>) {
        self.log(LogLevel::Warn, message, correlation_id, Map::new());
    }

    /// Emits an error event.
    pub fn error(&self, message: impl Into<String>, correlation_id: Option<&str>) {
        self.log(LogLevel::Error, message, correlation_id, Map::new());
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
