// crates/ultimate-mcp-config/src/config.rs
// ============================================================================
// Module: Platform Configuration
// Description: Environment-variable configuration loading and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Configuration is read once from environment variables into a typed model
//! and validated as a whole. Malformed values are errors, never silent
//! defaults; weak signing secrets are fatal outside development. The loader
//! takes a lookup function so tests can inject environments without touching
//! the process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bind address.
const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
/// Default listen port.
const DEFAULT_PORT: u16 = 8000;
/// Default CORS allow-list.
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";
/// Default request body cap in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default token lifetime in hours.
const DEFAULT_TOKEN_TTL_HOURS: u64 = 24;
/// Minimum signing key length in bytes.
pub const MIN_SIGNING_KEY_BYTES: usize = 32;
/// Maximum connection pool size.
pub const MAX_POOL_SIZE: usize = 100;
/// Maximum pool acquisition timeout in seconds.
pub const MAX_ACQUISITION_TIMEOUT_SECS: u64 = 5;
/// Maximum execution timeout in seconds.
pub const MAX_EXEC_TIMEOUT_SECS: u64 = 30;
/// Default execution timeout in seconds.
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 8;
/// Default bounded output cap per stream in bytes.
pub const DEFAULT_OUTPUT_CAP_BYTES: usize = 100 * 1024;
/// Default execution memory cap in bytes.
const DEFAULT_EXEC_MEM_BYTES: u64 = 256 * 1024 * 1024;
/// Default execution file-size cap in bytes.
const DEFAULT_EXEC_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// Default open-file limit inside the sandbox.
const DEFAULT_EXEC_FD_LIMIT: u64 = 64;
/// Default cache capacity in entries.
const DEFAULT_CACHE_CAPACITY: usize = 1_024;
/// Default cache TTL in seconds.
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
/// Default connection lifetime in seconds.
const DEFAULT_CONN_LIFETIME_SECS: u64 = 3_600;
/// Known weak secrets rejected outside development.
const WEAK_SECRETS: &[&str] = &["change-me", "changeme", "secret", "password123"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed to parse or is out of range.
    #[error("config key {key}: {reason}")]
    InvalidValue {
        /// Offending environment key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// The signing secret is too weak for the environment.
    #[error("config key {key}: weak secret rejected outside development")]
    WeakSecret {
        /// Offending environment key.
        key: &'static str,
    },
}

// ============================================================================
// SECTION: Environment
// ============================================================================

/// Deployment environment; development relaxes secret-strength checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local development.
    Development,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidValue {
                key: "ENV",
                reason: format!("unknown environment {other:?}"),
            }),
        }
    }

    /// Returns true for the development environment.
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: IpAddr,
    /// Listen port.
    pub port: u16,
    /// CORS origin allow-list.
    pub allowed_origins: Vec<String>,
    /// Request body cap in bytes.
    pub max_body_bytes: usize,
}

/// Token service settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing key bytes.
    pub signing_key: String,
    /// Default token lifetime in hours.
    pub token_ttl_hours: u64,
}

/// Rate limiter settings.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Requests allowed per minute.
    pub per_minute: u32,
    /// Requests allowed per hour.
    pub per_hour: u32,
    /// Requests allowed per day.
    pub per_day: u32,
    /// Requests allowed in a one-second burst.
    pub burst: u32,
}

/// Graph database connection settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Database endpoint URI.
    pub uri: String,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Connection pool slots.
    pub pool_max: usize,
    /// Pool acquisition timeout.
    pub acquisition_timeout: Duration,
    /// Connection lifetime.
    pub connection_lifetime: Duration,
}

/// Execution sandbox settings.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Worker process slots.
    pub workers: usize,
    /// Default execution deadline in seconds.
    pub timeout_default_secs: u64,
    /// Maximum accepted execution deadline in seconds.
    pub timeout_max_secs: u64,
    /// Address-space cap in bytes.
    pub memory_bytes: u64,
    /// File-size cap in bytes.
    pub file_bytes: u64,
    /// Open-file cap.
    pub fd_limit: u64,
    /// Per-stream captured output cap in bytes.
    pub output_cap_bytes: usize,
    /// Whether execution results may be cached.
    pub cache_enabled: bool,
    /// Whether code validation additionally denies network-I/O modules.
    pub strict_validation: bool,
}

/// Read-path cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum live entries.
    pub capacity: usize,
    /// Default TTL.
    pub ttl: Duration,
}

/// One circuit breaker's thresholds.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it.
    pub success_threshold: u32,
    /// Open window before probing.
    pub open_timeout: Duration,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines.
    Json,
    /// Human-readable console lines.
    Console,
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level label (error|warn|info|debug).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Full platform configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Token service settings.
    pub auth: AuthConfig,
    /// Rate limiter settings.
    pub rate_limit: RateLimitSettings,
    /// Graph database settings.
    pub graph: GraphConfig,
    /// Execution sandbox settings.
    pub exec: ExecConfig,
    /// Read cache settings.
    pub cache: CacheConfig,
    /// Read-path breaker thresholds.
    pub breaker_read: BreakerSettings,
    /// Write-path breaker thresholds.
    pub breaker_write: BreakerSettings,
    /// Logging settings.
    pub log: LogConfig,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl PlatformConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any value is malformed or a secret is
    /// rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary lookup (testable form).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any value is malformed or a secret is
    /// rejected.
    #[allow(clippy::too_many_lines, reason = "One block per config section.")]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match lookup("ENV") {
            Some(value) => Environment::parse(value.trim())?,
            None => Environment::Development,
        };

        let bind_addr: IpAddr = parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR)?;
        let port: u16 = parse_or(&lookup, "PORT", &DEFAULT_PORT.to_string())?;
        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();
        let max_body_bytes = parse_range(
            &lookup,
            "MAX_BODY_BYTES",
            DEFAULT_MAX_BODY_BYTES,
            1_024,
            64 * 1024 * 1024,
        )?;

        let signing_key = lookup("AUTH_SIGNING_KEY").unwrap_or_default();
        check_secret(&signing_key, "AUTH_SIGNING_KEY", environment)?;
        let token_ttl_hours =
            parse_range(&lookup, "AUTH_TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS, 1, 24 * 365)?;

        let rate_limit = RateLimitSettings {
            per_minute: parse_range(&lookup, "RATE_LIMIT_PER_MINUTE", 60, 1, 1_000_000)?,
            per_hour: parse_range(&lookup, "RATE_LIMIT_PER_HOUR", 1_000, 1, 10_000_000)?,
            per_day: parse_range(&lookup, "RATE_LIMIT_PER_DAY", 10_000, 1, 100_000_000)?,
            burst: parse_range(&lookup, "RATE_LIMIT_BURST", 10, 1, 10_000)?,
        };

        let graph_password = lookup("GRAPH_PASSWORD").unwrap_or_default();
        if !environment.is_development()
            && (graph_password.is_empty()
                || WEAK_SECRETS.contains(&graph_password.to_lowercase().as_str()))
        {
            return Err(ConfigError::WeakSecret {
                key: "GRAPH_PASSWORD",
            });
        }
        let graph = GraphConfig {
            uri: lookup("GRAPH_URI").unwrap_or_else(|| "http://127.0.0.1:7474".to_string()),
            user: lookup("GRAPH_USER").unwrap_or_else(|| "neo4j".to_string()),
            password: graph_password,
            database: lookup("GRAPH_DATABASE").unwrap_or_else(|| "neo4j".to_string()),
            pool_max: parse_range(
                &lookup,
                "POOL_MAX",
                default_pool_size(),
                1,
                MAX_POOL_SIZE,
            )?,
            acquisition_timeout: Duration::from_secs(parse_range(
                &lookup,
                "POOL_ACQ_TIMEOUT_S",
                MAX_ACQUISITION_TIMEOUT_SECS,
                1,
                MAX_ACQUISITION_TIMEOUT_SECS,
            )?),
            connection_lifetime: Duration::from_secs(parse_range(
                &lookup,
                "CONN_LIFETIME_S",
                DEFAULT_CONN_LIFETIME_SECS,
                60,
                24 * 3_600,
            )?),
        };

        let exec = ExecConfig {
            workers: parse_range(&lookup, "EXEC_WORKERS", default_exec_workers(), 1, 16)?,
            timeout_default_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            timeout_max_secs: parse_range(
                &lookup,
                "EXEC_TIMEOUT_S_MAX",
                MAX_EXEC_TIMEOUT_SECS,
                1,
                MAX_EXEC_TIMEOUT_SECS,
            )?,
            memory_bytes: parse_range(
                &lookup,
                "EXEC_MEM_BYTES",
                DEFAULT_EXEC_MEM_BYTES,
                16 * 1024 * 1024,
                8 * 1024 * 1024 * 1024,
            )?,
            file_bytes: parse_range(
                &lookup,
                "EXEC_FILE_BYTES",
                DEFAULT_EXEC_FILE_BYTES,
                1024,
                1024 * 1024 * 1024,
            )?,
            fd_limit: parse_range(&lookup, "EXEC_FD_LIMIT", DEFAULT_EXEC_FD_LIMIT, 8, 1_024)?,
            output_cap_bytes: parse_range(
                &lookup,
                "EXEC_OUTPUT_BYTES",
                DEFAULT_OUTPUT_CAP_BYTES,
                1_024,
                10 * 1024 * 1024,
            )?,
            cache_enabled: parse_bool(&lookup, "EXEC_CACHE_ENABLED", false)?,
            strict_validation: parse_bool(&lookup, "EXEC_STRICT_VALIDATION", false)?,
        };

        let cache = CacheConfig {
            capacity: parse_range(&lookup, "CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY, 1, 1_000_000)?,
            ttl: Duration::from_secs(parse_range(
                &lookup,
                "CACHE_TTL_S",
                DEFAULT_CACHE_TTL_SECS,
                1,
                24 * 3_600,
            )?),
        };

        let breaker_read = BreakerSettings {
            failure_threshold: parse_range(&lookup, "BREAKER_READ_F", 5, 1, 1_000)?,
            success_threshold: parse_range(&lookup, "BREAKER_READ_S", 2, 1, 100)?,
            open_timeout: Duration::from_secs(parse_range(&lookup, "BREAKER_READ_T", 30, 1, 600)?),
        };
        let breaker_write = BreakerSettings {
            failure_threshold: parse_range(&lookup, "BREAKER_WRITE_F", 3, 1, 1_000)?,
            success_threshold: parse_range(&lookup, "BREAKER_WRITE_S", 2, 1, 100)?,
            open_timeout: Duration::from_secs(parse_range(&lookup, "BREAKER_WRITE_T", 60, 1, 600)?),
        };

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()).to_lowercase();
        if !matches!(log_level.as_str(), "error" | "warn" | "info" | "debug") {
            return Err(ConfigError::InvalidValue {
                key: "LOG_LEVEL",
                reason: format!("unknown level {log_level:?}"),
            });
        }
        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("json") => LogFormat::Json,
            Some("console") => LogFormat::Console,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "LOG_FORMAT",
                    reason: format!("unknown format {other:?}"),
                });
            }
        };

        Ok(Self {
            environment,
            server: ServerConfig {
                bind_addr,
                port,
                allowed_origins,
                max_body_bytes,
            },
            auth: AuthConfig {
                signing_key,
                token_ttl_hours,
            },
            rate_limit,
            graph,
            exec,
            cache,
            breaker_read,
            breaker_write,
            log: LogConfig {
                level: log_level,
                format: log_format,
            },
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the default graph pool size, `min(2·CPU + 4, 100)`.
#[must_use]
pub fn default_pool_size() -> usize {
    let cpus = std::thread::available_parallelism().map(usize::from).unwrap_or(4);
    (2 * cpus + 4).min(MAX_POOL_SIZE)
}

/// Returns the default execution worker count, `min(CPU, 4)`.
#[must_use]
pub fn default_exec_workers() -> usize {
    let cpus = std::thread::available_parallelism().map(usize::from).unwrap_or(4);
    cpus.min(4)
}

/// Rejects empty, short, known-weak, and single-byte secrets outside
/// development.
fn check_secret(secret: &str, key: &'static str, environment: Environment) -> Result<(), ConfigError> {
    if environment.is_development() {
        return Ok(());
    }
    let lowered = secret.to_lowercase();
    let all_same = {
        let mut bytes = secret.bytes();
        match bytes.next() {
            Some(first) => bytes.all(|byte| byte == first),
            None => true,
        }
    };
    if secret.len() < MIN_SIGNING_KEY_BYTES
        || WEAK_SECRETS.contains(&lowered.as_str())
        || all_same
    {
        return Err(ConfigError::WeakSecret {
            key,
        });
    }
    Ok(())
}

/// Parses a key with a fallback default, erroring on malformed input.
fn parse_or<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        reason: format!("cannot parse {raw:?}"),
    })
}

/// Parses a numeric key and enforces an inclusive range.
fn parse_range<T>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    min: T,
    max: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Copy + std::fmt::Display,
{
    let value = match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            reason: format!("cannot parse {raw:?}"),
        })?,
        None => default,
    };
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            key,
            reason: format!("{value} outside [{min}, {max}]"),
        });
    }
    Ok(value)
}

/// Parses a boolean key accepting `true|false|1|0`.
fn parse_bool(
    lookup: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("true" | "1") => Ok(true),
        Some("false" | "0") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key,
            reason: format!("cannot parse {other:?} as bool"),
        }),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::collections::HashMap;

    use super::ConfigError;
    use super::Environment;
    use super::LogFormat;
    use super::PlatformConfig;

    fn load(pairs: &[(&str, &str)]) -> Result<PlatformConfig, ConfigError> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
        PlatformConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_load_in_development() {
        let config = load(&[]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rate_limit.per_minute, 60);
        assert_eq!(config.rate_limit.burst, 10);
        assert_eq!(config.exec.timeout_default_secs, 8);
        assert_eq!(config.exec.timeout_max_secs, 30);
        assert!(!config.exec.cache_enabled);
        assert_eq!(config.breaker_read.failure_threshold, 5);
        assert_eq!(config.breaker_write.open_timeout.as_secs(), 60);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn production_rejects_weak_signing_key() {
        for weak in ["", "change-me", "short", "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"] {
            let result = load(&[
                ("ENV", "production"),
                ("AUTH_SIGNING_KEY", weak),
                ("GRAPH_PASSWORD", "a-strong-database-password"),
            ]);
            assert!(
                matches!(result, Err(ConfigError::WeakSecret { key: "AUTH_SIGNING_KEY" })),
                "{weak:?}"
            );
        }
    }

    #[test]
    fn production_accepts_strong_secrets() {
        let config = load(&[
            ("ENV", "production"),
            ("AUTH_SIGNING_KEY", "kkKd82hdmzAq17PwnB64vXri5TgEoyU30cfj"),
            ("GRAPH_PASSWORD", "a-strong-database-password"),
        ])
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
    }

    #[test]
    fn development_relaxes_secret_checks() {
        let config = load(&[("ENV", "development"), ("AUTH_SIGNING_KEY", "change-me")]).unwrap();
        assert_eq!(config.auth.signing_key, "change-me");
    }

    #[test]
    fn production_rejects_default_graph_password() {
        let result = load(&[
            ("ENV", "production"),
            ("AUTH_SIGNING_KEY", "kkKd82hdmzAq17PwnB64vXri5TgEoyU30cfj"),
            ("GRAPH_PASSWORD", "password123"),
        ]);
        assert!(matches!(result, Err(ConfigError::WeakSecret { key: "GRAPH_PASSWORD" })));
    }

    #[test]
    fn malformed_values_are_errors_not_defaults() {
        assert!(load(&[("PORT", "not-a-port")]).is_err());
        assert!(load(&[("RATE_LIMIT_PER_MINUTE", "0")]).is_err());
        assert!(load(&[("EXEC_TIMEOUT_S_MAX", "120")]).is_err());
        assert!(load(&[("POOL_ACQ_TIMEOUT_S", "30")]).is_err());
        assert!(load(&[("LOG_LEVEL", "loud")]).is_err());
        assert!(load(&[("ENV", "chaos")]).is_err());
    }

    #[test]
    fn origins_split_on_commas() {
        let config = load(&[(
            "ALLOWED_ORIGINS",
            "http://localhost:3000, https://app.example.com",
        )])
        .unwrap();
        assert_eq!(
            config.server.allowed_origins,
            vec!["http://localhost:3000", "https://app.example.com"]
        );
    }
}
