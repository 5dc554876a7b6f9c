// crates/ultimate-mcp-graph/src/http_driver.rs
// ============================================================================
// Module: HTTP Graph Driver
// Description: Driver over the database's HTTP transactional-commit endpoint.
// Purpose: Provide a working driver without a binary-protocol dependency.
// Dependencies: reqwest, serde, serde_json
// ============================================================================

//! ## Overview
//! Each call POSTs a transactional-commit request carrying parameterized
//! statements and commits in one round trip, which also gives `write_batch`
//! its atomicity. Database error codes are classified into the driver error
//! classes; transport faults (connect, timeout) are transient.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::driver::DriverError;
use crate::driver::GraphDriver;
use crate::driver::Row;
use crate::driver::Statement;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default per-statement deadline.
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP driver settings.
#[derive(Debug, Clone)]
pub struct HttpGraphDriverConfig {
    /// Base endpoint, e.g. `http://127.0.0.1:7474`.
    pub uri: String,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Per-request deadline.
    pub query_timeout: Duration,
}

impl HttpGraphDriverConfig {
    /// Creates a config with the default query deadline.
    #[must_use]
    pub fn new(
        uri: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Transactional-commit request payload.
#[derive(Debug, Serialize)]
struct CommitRequest {
    /// Statements executed in order within one transaction.
    statements: Vec<WireStatement>,
}

/// One statement on the wire.
#[derive(Debug, Serialize)]
struct WireStatement {
    /// Query text.
    statement: String,
    /// Bound parameters.
    parameters: Value,
}

/// Transactional-commit response payload.
#[derive(Debug, Deserialize)]
struct CommitResponse {
    /// Per-statement results.
    #[serde(default)]
    results: Vec<WireResult>,
    /// Errors; non-empty means the transaction rolled back.
    #[serde(default)]
    errors: Vec<WireError>,
}

/// One statement's result set.
#[derive(Debug, Deserialize)]
struct WireResult {
    /// Return aliases.
    #[serde(default)]
    columns: Vec<String>,
    /// Row payloads.
    #[serde(default)]
    data: Vec<WireRow>,
}

/// One row wrapper.
#[derive(Debug, Deserialize)]
struct WireRow {
    /// Values aligned with `columns`.
    #[serde(default)]
    row: Vec<Value>,
}

/// One database error.
#[derive(Debug, Deserialize)]
struct WireError {
    /// Status code, e.g. `Neo.TransientError.General.DatabaseUnavailable`.
    #[serde(default)]
    code: String,
    /// Human-readable message.
    #[serde(default)]
    message: String,
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Graph driver over the HTTP transactional-commit endpoint.
pub struct HttpGraphDriver {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// Driver settings.
    config: HttpGraphDriverConfig,
    /// Precomputed commit endpoint.
    endpoint: String,
}

impl HttpGraphDriver {
    /// Builds a driver from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Protocol`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: HttpGraphDriverConfig) -> Result<Self, DriverError> {
        let http = reqwest::Client::builder()
            .timeout(config.query_timeout)
            .build()
            .map_err(|err| DriverError::Protocol(format!("http client build failed: {err}")))?;
        let endpoint = format!(
            "{}/db/{}/tx/commit",
            config.uri.trim_end_matches('/'),
            config.database
        );
        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    /// Sends a commit request and classifies the response.
    async fn commit(&self, statements: Vec<WireStatement>) -> Result<Vec<WireResult>, DriverError> {
        let request = CommitRequest {
            statements,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                // Connect errors and timeouts are transient by definition.
                DriverError::Transient(format!("graph endpoint unreachable: {err}"))
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(DriverError::Unauthorized(format!("graph auth rejected ({status})")));
        }
        if status.is_server_error() {
            return Err(DriverError::Transient(format!("graph endpoint returned {status}")));
        }

        let body: CommitResponse = response
            .json()
            .await
            .map_err(|err| DriverError::Protocol(format!("malformed graph response: {err}")))?;
        if let Some(error) = body.errors.into_iter().next() {
            return Err(classify(&error.code, error.message));
        }
        Ok(body.results)
    }
}

/// Maps a database status code onto a driver error class.
fn classify(code: &str, message: String) -> DriverError {
    if code.contains("TransientError")
        || code.contains("ServiceUnavailable")
        || code.contains("SessionExpired")
        || code.contains("DatabaseUnavailable")
    {
        return DriverError::Transient(message);
    }
    if code.contains("Security") {
        return DriverError::Unauthorized(message);
    }
    if code.contains("SyntaxError") || code.contains("ParameterMissing") {
        return DriverError::Syntax(message);
    }
    if code.contains("ConstraintValidation") || code.contains("Schema") {
        return DriverError::ConstraintViolation(message);
    }
    DriverError::Protocol(format!("{code}: {message}"))
}

/// Zips columns and row values into alias-keyed rows.
fn rows_from(result: WireResult) -> Vec<Row> {
    result
        .data
        .into_iter()
        .map(|wire_row| {
            result
                .columns
                .iter()
                .cloned()
                .zip(wire_row.row)
                .collect::<Row>()
        })
        .collect()
}

#[async_trait]
impl GraphDriver for HttpGraphDriver {
    async fn read(&self, query: &str, params: &Value) -> Result<Vec<Row>, DriverError> {
        let results = self
            .commit(vec![WireStatement {
                statement: query.to_string(),
                parameters: params.clone(),
            }])
            .await?;
        Ok(results.into_iter().next().map(rows_from).unwrap_or_default())
    }

    async fn write(&self, query: &str, params: &Value) -> Result<(), DriverError> {
        self.commit(vec![WireStatement {
            statement: query.to_string(),
            parameters: params.clone(),
        }])
        .await?;
        Ok(())
    }

    async fn write_batch(&self, statements: &[Statement]) -> Result<(), DriverError> {
        let wire = statements
            .iter()
            .map(|statement| WireStatement {
                statement: statement.query.clone(),
                parameters: statement.params.clone(),
            })
            .collect();
        self.commit(wire).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), DriverError> {
        let rows = self.read("RETURN 1 AS ok", &json!({})).await?;
        if rows.first().and_then(|row| row.get("ok")).and_then(Value::as_i64) == Some(1) {
            Ok(())
        } else {
            Err(DriverError::Protocol("unexpected ping response".to_string()))
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::DriverError;
    use super::WireResult;
    use super::WireRow;
    use super::classify;
    use super::rows_from;

    #[test]
    fn error_codes_classify_by_family() {
        assert!(matches!(
            classify("Neo.TransientError.General.DatabaseUnavailable", String::new()),
            DriverError::Transient(_)
        ));
        assert!(matches!(
            classify("Neo.ClientError.Security.Unauthorized", String::new()),
            DriverError::Unauthorized(_)
        ));
        assert!(matches!(
            classify("Neo.ClientError.Statement.SyntaxError", String::new()),
            DriverError::Syntax(_)
        ));
        assert!(matches!(
            classify("Neo.ClientError.Schema.ConstraintValidationFailed", String::new()),
            DriverError::ConstraintViolation(_)
        ));
        assert!(matches!(
            classify("Neo.ClientError.General.UnknownThing", String::new()),
            DriverError::Protocol(_)
        ));
    }

    #[test]
    fn rows_zip_columns_with_values() {
        let result = WireResult {
            columns: vec!["a".to_string(), "b".to_string()],
            data: vec![
                WireRow {
                    row: vec![json!("front"), json!(120)],
                },
                WireRow {
                    row: vec![json!("back"), json!(7)],
                },
            ],
        };
        let rows = rows_from(result);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("a"), Some(&json!("front")));
        assert_eq!(rows[1].get("b"), Some(&json!(7)));
    }
}
