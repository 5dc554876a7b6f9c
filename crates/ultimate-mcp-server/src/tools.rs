// crates/ultimate-mcp-server/src/tools.rs
// ============================================================================
// Module: Tool Registry and Handlers
// Description: The five code-lifecycle tools behind one immutable registry.
// Purpose: Dispatch validated tool calls identically for both transports.
// Dependencies: jsonschema, ultimate-mcp-core, ultimate-mcp-graph
// ============================================================================

//! ## Overview
//! The registry is an immutable map from tool id to input schema, required
//! permission, and handler, built once at startup and shared by the HTTP and
//! MCP transports; there is exactly one validator for both. Handlers assume
//! the pipeline gates already ran; they validate payload shape and content,
//! do the work, persist the artifact, and emit their audit events.
//!
//! ## Invariants
//! - No handler runs on a payload its schema rejected.
//! - Upsert statements order nodes before relationships.
//! - Execution and test outputs are truncated before they become artifacts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use jsonschema::Draft;
use jsonschema::Validator;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use ultimate_mcp_config::ExecConfig;
use ultimate_mcp_core::ArtifactId;
use ultimate_mcp_core::AuditEventType;
use ultimate_mcp_core::AuditSeverity;
use ultimate_mcp_core::CodeHash;
use ultimate_mcp_core::CodeValidator;
use ultimate_mcp_core::CodeValidatorConfig;
use ultimate_mcp_core::ExecutionArtifact;
use ultimate_mcp_core::GenerationArtifact;
use ultimate_mcp_core::LintArtifact;
use ultimate_mcp_core::Permission;
use ultimate_mcp_core::SourceFacts;
use ultimate_mcp_core::TestArtifact;
use ultimate_mcp_core::ToolName;
use ultimate_mcp_core::cache::TtlCache;
use ultimate_mcp_core::epoch_millis;
use ultimate_mcp_core::validation::InvalidInput;
use ultimate_mcp_core::validate_identifier;
use ultimate_mcp_core::validate_property_value;
use ultimate_mcp_core::validate_read_only_query;
use ultimate_mcp_graph::GraphClient;
use ultimate_mcp_graph::GraphError;
use ultimate_mcp_graph::Statement;

use crate::audit::AuditLog;
use crate::auth::Identity;
use crate::auth::RequestContext;
use crate::exec::ExecEngine;
use crate::exec::ExecError;
use crate::exec::FILE_PLACEHOLDER;
use crate::exec::SandboxRequest;
use crate::prompts::PromptCatalog;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// The only execution language enabled by default.
const PYTHON_LANGUAGE: &str = "python";
/// Interpreter binary for sandboxed children.
const PYTHON_BIN: &str = "python3";
/// External analyzer invocation deadline.
const ANALYZER_TIMEOUT: Duration = Duration::from_secs(10);
/// Analyzer version label, part of the lint idempotency key.
const ANALYZER_VERSION: &str = "pyflakes-1";
/// Server-side row cap for graph queries.
const MAX_QUERY_ROWS: usize = 10_000;
/// Maximum template size accepted by the generator.
const MAX_TEMPLATE_BYTES: usize = 64 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool-layer errors, converted at the transport boundary.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Unknown tool id.
    #[error("unknown tool")]
    UnknownTool,
    /// Payload rejected by a validator.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Rejection reason.
        reason: String,
        /// Offending token when known.
        token: Option<String>,
    },
    /// Language not enabled on this deployment.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    /// Execution pool saturated.
    #[error("busy: {0}")]
    Busy(String),
    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Write conflicted with a constraint.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A dependency is unavailable.
    #[error("dependency unavailable: {0}")]
    Unavailable(String),
    /// Unexpected internal fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<InvalidInput> for ToolError {
    fn from(err: InvalidInput) -> Self {
        Self::InvalidInput {
            reason: err.reason,
            token: err.offending_token,
        }
    }
}

impl From<GraphError> for ToolError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Unavailable(message) => Self::Unavailable(message),
            GraphError::QueryRejected(message) => Self::InvalidInput {
                reason: message,
                token: None,
            },
            GraphError::Conflict(message) => Self::Conflict(message),
            GraphError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ExecError> for ToolError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Busy => Self::Busy("execution pool saturated".to_string()),
            ExecError::SpawnFailed(message) | ExecError::Internal(message) => {
                Self::Internal(message)
            }
        }
    }
}

// ============================================================================
// SECTION: Tool Definitions
// ============================================================================

/// Tool definition advertised by both transports.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Tool wire name.
    pub name: &'static str,
    /// Human description.
    pub description: &'static str,
    /// JSON input schema.
    pub input_schema: Value,
}

/// One registered tool: definition, compiled schema, access rules.
pub struct ToolSpec {
    /// Canonical tool name.
    pub tool: ToolName,
    /// Advertised definition.
    pub definition: ToolDefinition,
    /// Permission gating the tool.
    pub permission: Permission,
    /// Whether anonymous callers may invoke it.
    pub public: bool,
    /// Compiled input schema shared by both transports.
    compiled: Validator,
}

/// Compiles a JSON schema for validation.
fn compile_schema(schema: &Value) -> Result<Validator, ToolError> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| ToolError::Internal(format!("invalid tool schema: {err}")))
}

// ============================================================================
// SECTION: Request Payloads
// ============================================================================

/// Lint request payload.
#[derive(Debug, Deserialize)]
struct LintRequest {
    /// Source code to analyze.
    code: String,
    /// Source language.
    #[serde(default = "default_language")]
    language: String,
}

/// Execution request payload.
#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    /// Source code to run.
    code: String,
    /// Source language.
    #[serde(default = "default_language")]
    language: String,
    /// Requested deadline in seconds; clamped to the configured maximum.
    timeout_seconds: Option<u64>,
}

/// Test request payload.
#[derive(Debug, Deserialize)]
struct TestRequest {
    /// Test module source.
    code: String,
    /// Source language.
    #[serde(default = "default_language")]
    language: String,
    /// Test framework label.
    #[serde(default = "default_framework")]
    framework: String,
    /// Requested deadline in seconds; clamped to the configured maximum.
    timeout_seconds: Option<u64>,
}

/// Generation request payload.
#[derive(Debug, Deserialize)]
struct GenerateRequest {
    /// Template with `{{name}}` placeholders.
    template: String,
    /// Scalar-only render context.
    #[serde(default)]
    context: Map<String, Value>,
    /// Target language label.
    #[serde(default = "default_language")]
    language: String,
}

/// One node in an upsert payload.
#[derive(Debug, Deserialize)]
struct NodeInput {
    /// Unique node key.
    key: String,
    /// Labels attached to the node.
    #[serde(default)]
    labels: Vec<String>,
    /// Scalar property map.
    #[serde(default)]
    properties: Map<String, Value>,
}

/// One relationship in an upsert payload.
#[derive(Debug, Deserialize)]
struct RelationshipInput {
    /// Start node key.
    start: String,
    /// End node key.
    end: String,
    /// Relationship type.
    #[serde(rename = "type")]
    rel_type: String,
    /// Scalar property map.
    #[serde(default)]
    properties: Map<String, Value>,
}

/// Graph upsert payload.
#[derive(Debug, Deserialize)]
struct UpsertRequest {
    /// Nodes merged first.
    #[serde(default)]
    nodes: Vec<NodeInput>,
    /// Relationships merged after every node exists.
    #[serde(default)]
    relationships: Vec<RelationshipInput>,
}

/// Graph query payload.
#[derive(Debug, Deserialize)]
struct QueryRequest {
    /// Read-only query text.
    cypher: String,
    /// Bound parameters.
    #[serde(default)]
    parameters: Map<String, Value>,
}

/// Prompt lookup payload.
#[derive(Debug, Deserialize)]
struct GetPromptRequest {
    /// Prompt identifier.
    id: String,
}

fn default_language() -> String {
    PYTHON_LANGUAGE.to_string()
}

fn default_framework() -> String {
    "pytest".to_string()
}

// ============================================================================
// SECTION: Tool Router
// ============================================================================

/// Immutable registry plus the shared handler state.
pub struct ToolRouter {
    /// AST validator shared by lint and execution.
    validator: CodeValidator,
    /// Graph persistence.
    graph: Arc<GraphClient>,
    /// Sandboxed execution engine.
    exec: Arc<ExecEngine>,
    /// Audit pipeline.
    audit: AuditLog,
    /// Prompt catalog.
    prompts: Arc<PromptCatalog>,
    /// Opt-in execution result cache keyed by (code hash, language, limits).
    exec_cache: Option<TtlCache<ExecutionArtifact>>,
    /// Strict mode: additionally deny network-I/O modules.
    strict_validation: bool,
    /// Registered tools in listing order.
    specs: Vec<ToolSpec>,
}

impl ToolRouter {
    /// Builds the registry and freezes it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Internal`] when a built-in schema fails to
    /// compile.
    pub fn new(
        graph: Arc<GraphClient>,
        exec: Arc<ExecEngine>,
        audit: AuditLog,
        prompts: Arc<PromptCatalog>,
        exec_config: &ExecConfig,
    ) -> Result<Self, ToolError> {
        let exec_cache = exec_config
            .cache_enabled
            .then(|| TtlCache::new(1_024, Duration::from_secs(3_600)));
        Ok(Self {
            validator: CodeValidator::new(CodeValidatorConfig::default()),
            graph,
            exec,
            audit,
            prompts,
            exec_cache,
            strict_validation: exec_config.strict_validation,
            specs: build_specs()?,
        })
    }

    /// Returns the registered spec for a tool.
    #[must_use]
    pub fn spec(&self, tool: ToolName) -> &ToolSpec {
        // The registry is total over ToolName by construction.
        self.specs.iter().find(|spec| spec.tool == tool).unwrap_or(&self.specs[0])
    }

    /// Returns the advertised definitions in listing order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.specs.iter().map(|spec| spec.definition.clone()).collect()
    }

    /// Validates and dispatches one tool call.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when validation, execution, or persistence
    /// fails.
    pub async fn handle(
        &self,
        tool: ToolName,
        identity: Option<&Identity>,
        ctx: &RequestContext,
        payload: Value,
    ) -> Result<Value, ToolError> {
        let spec = self.spec(tool);
        let messages: Vec<String> =
            spec.compiled.iter_errors(&payload).map(|err| err.to_string()).collect();
        if !messages.is_empty() {
            return Err(ToolError::InvalidInput {
                reason: messages.join("; "),
                token: None,
            });
        }
        match tool {
            ToolName::LintCode => self.handle_lint(payload).await,
            ToolName::ExecuteCode => self.handle_execute(identity, ctx, payload).await,
            ToolName::RunTests => self.handle_tests(identity, ctx, payload).await,
            ToolName::GenerateCode => self.handle_generate(payload).await,
            ToolName::GraphUpsert => self.handle_upsert(identity, ctx, payload).await,
            ToolName::GraphQuery => self.handle_query(identity, ctx, payload).await,
            ToolName::ListPrompts => Ok(json!({ "prompts": self.prompts.list() })),
            ToolName::GetPrompt => {
                let request: GetPromptRequest = decode(payload)?;
                match self.prompts.get(&request.id) {
                    Some(record) => Ok(json!({ "prompt": record })),
                    None => Err(ToolError::NotFound(format!("prompt {}", request.id))),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Lint
    // ------------------------------------------------------------------

    /// Parses the source, extracts structural facts, and runs the external
    /// analyzer when present. A syntax error is a lint finding, not a
    /// request failure.
    async fn handle_lint(&self, payload: Value) -> Result<Value, ToolError> {
        let request: LintRequest = decode(payload)?;
        ensure_python(&request.language)?;
        let code_hash = CodeHash::of_source(&request.code);

        let artifact = match self.validator.parse(&request.code) {
            Ok(suite) => {
                let facts = SourceFacts::extract(&suite);
                let (analyzer_exit_code, analyzer_output) =
                    self.run_analyzer(&request.code).await;
                LintArtifact {
                    id: new_artifact_id("lint"),
                    code_hash: code_hash.clone(),
                    language: PYTHON_LANGUAGE.to_string(),
                    functions: facts.functions,
                    classes: facts.classes,
                    imports: facts.imports,
                    complexity: facts.complexity,
                    analyzer_exit_code,
                    analyzer_output,
                    analyzer_version: ANALYZER_VERSION.to_string(),
                    created_at: epoch_millis(),
                }
            }
            Err(err) => LintArtifact {
                id: new_artifact_id("lint"),
                code_hash: code_hash.clone(),
                language: PYTHON_LANGUAGE.to_string(),
                functions: Vec::new(),
                classes: Vec::new(),
                imports: Vec::new(),
                complexity: 0,
                analyzer_exit_code: 1,
                analyzer_output: err.reason,
                analyzer_version: ANALYZER_VERSION.to_string(),
                created_at: epoch_millis(),
            },
        };

        self.persist_lint(&artifact).await?;
        serde_json::to_value(&artifact)
            .map_err(|err| ToolError::Internal(format!("lint serialization failed: {err}")))
    }

    /// Runs the external analyzer with the sandbox limits; an absent
    /// analyzer is not an error.
    async fn run_analyzer(&self, code: &str) -> (i32, String) {
        let request = SandboxRequest {
            file_name: "code.py".to_string(),
            source: code.to_string(),
            argv: vec![
                PYTHON_BIN.to_string(),
                "-m".to_string(),
                "pyflakes".to_string(),
                FILE_PLACEHOLDER.to_string(),
            ],
            timeout: ANALYZER_TIMEOUT,
        };
        match self.exec.run(request).await {
            Ok(outcome) => {
                let mut output = outcome.stdout;
                if !outcome.stderr.is_empty() {
                    if !output.is_empty() {
                        output.push('\n');
                    }
                    output.push_str(&outcome.stderr);
                }
                // Missing-module failures mean no analyzer is installed.
                if outcome.return_code != 0 && output.contains("No module named") {
                    (0, String::new())
                } else {
                    (outcome.return_code, output.trim().to_string())
                }
            }
            Err(_) => (0, String::new()),
        }
    }

    /// Upserts the lint artifact on its idempotency key.
    async fn persist_lint(&self, artifact: &LintArtifact) -> Result<(), ToolError> {
        let statement = "MERGE (r:LintResult {code_hash: $code_hash, analyzer_version: \
                         $analyzer_version}) ON CREATE SET r.id = $id, r.created_at = \
                         $created_at SET r.language = $language, r.functions = $functions, \
                         r.classes = $classes, r.imports = $imports, r.complexity = \
                         $complexity, r.analyzer_exit_code = $analyzer_exit_code, \
                         r.analyzer_output = $analyzer_output";
        let params = json!({
            "code_hash": artifact.code_hash.as_str(),
            "analyzer_version": artifact.analyzer_version,
            "id": artifact.id.as_str(),
            "created_at": artifact.created_at,
            "language": artifact.language,
            "functions": artifact.functions,
            "classes": artifact.classes,
            "imports": artifact.imports,
            "complexity": artifact.complexity,
            "analyzer_exit_code": artifact.analyzer_exit_code,
            "analyzer_output": artifact.analyzer_output,
        });
        self.graph.execute_write(statement, &params, &["LintResult"]).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execute
    // ------------------------------------------------------------------

    /// Validates, sandboxes, persists, and audits one execution.
    async fn handle_execute(
        &self,
        identity: Option<&Identity>,
        ctx: &RequestContext,
        payload: Value,
    ) -> Result<Value, ToolError> {
        let request: ExecuteRequest = decode(payload)?;
        ensure_python(&request.language)?;
        let code_hash = CodeHash::of_source(&request.code);

        if let Err(err) = self.validator.validate(&request.code, self.strict_validation) {
            self.record_security_violation(identity, ctx, &code_hash, &err);
            return Err(err.into());
        }

        let timeout = self.exec.clamp_timeout(request.timeout_seconds);
        let cache_key = self.exec_cache.as_ref().map(|_| {
            format!("{}:{}:{}", code_hash.as_str(), PYTHON_LANGUAGE, timeout.as_secs())
        });
        if let (Some(cache), Some(key)) = (self.exec_cache.as_ref(), cache_key.as_deref()) {
            if let Some(mut artifact) = cache.get(key) {
                artifact.cache_hit = true;
                self.record_code_exec(identity, ctx, &artifact);
                return serde_json::to_value(&artifact).map_err(|err| {
                    ToolError::Internal(format!("execution serialization failed: {err}"))
                });
            }
        }

        let outcome = self
            .exec
            .run(SandboxRequest {
                file_name: "snippet.py".to_string(),
                source: request.code.clone(),
                argv: vec![PYTHON_BIN.to_string(), FILE_PLACEHOLDER.to_string()],
                timeout,
            })
            .await?;

        let artifact = ExecutionArtifact {
            id: new_artifact_id("exec"),
            code_hash,
            language: PYTHON_LANGUAGE.to_string(),
            return_code: outcome.return_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            duration_ms: outcome.duration_ms,
            peak_memory_bytes: outcome.peak_memory_bytes,
            truncated: outcome.truncated,
            cache_hit: false,
            created_at: epoch_millis(),
        };

        self.persist_execution(&artifact).await?;
        self.record_code_exec(identity, ctx, &artifact);
        if let (Some(cache), Some(key)) = (self.exec_cache.as_ref(), cache_key) {
            if !outcome.timed_out {
                cache.set(key, artifact.clone());
            }
        }
        serde_json::to_value(&artifact)
            .map_err(|err| ToolError::Internal(format!("execution serialization failed: {err}")))
    }

    /// Persists an execution artifact.
    async fn persist_execution(&self, artifact: &ExecutionArtifact) -> Result<(), ToolError> {
        let statement = "CREATE (r:ExecutionResult {id: $id, code_hash: $code_hash, language: \
                         $language, return_code: $return_code, stdout: $stdout, stderr: \
                         $stderr, duration_ms: $duration_ms, peak_memory_bytes: \
                         $peak_memory_bytes, truncated: $truncated, created_at: $created_at})";
        let params = json!({
            "id": artifact.id.as_str(),
            "code_hash": artifact.code_hash.as_str(),
            "language": artifact.language,
            "return_code": artifact.return_code,
            "stdout": artifact.stdout,
            "stderr": artifact.stderr,
            "duration_ms": artifact.duration_ms,
            "peak_memory_bytes": artifact.peak_memory_bytes,
            "truncated": artifact.truncated,
            "created_at": artifact.created_at,
        });
        self.graph.execute_write(statement, &params, &["ExecutionResult"]).await?;
        Ok(())
    }

    /// Emits the `code_exec` audit event for an execution artifact.
    fn record_code_exec(
        &self,
        identity: Option<&Identity>,
        ctx: &RequestContext,
        artifact: &ExecutionArtifact,
    ) {
        let mut attributes = Map::new();
        attributes.insert("code_hash".to_string(), json!(artifact.code_hash.as_str()));
        attributes.insert("return_code".to_string(), json!(artifact.return_code));
        attributes.insert("duration_ms".to_string(), json!(artifact.duration_ms));
        attributes.insert("cache_hit".to_string(), json!(artifact.cache_hit));
        self.audit.record(AuditLog::event(
            AuditEventType::CodeExec,
            AuditSeverity::Info,
            &ctx.correlation_id,
            identity.map(|identity| &identity.user_id),
            attributes,
        ));
    }

    /// Emits the `security_violation` audit event for rejected code.
    fn record_security_violation(
        &self,
        identity: Option<&Identity>,
        ctx: &RequestContext,
        code_hash: &CodeHash,
        err: &InvalidInput,
    ) {
        let mut attributes = Map::new();
        attributes.insert("code_hash".to_string(), json!(code_hash.as_str()));
        attributes.insert("reason".to_string(), json!(err.reason));
        if let Some(token) = &err.offending_token {
            attributes.insert("offending_token".to_string(), json!(token));
        }
        self.audit.record(AuditLog::event(
            AuditEventType::SecurityViolation,
            AuditSeverity::Warning,
            &ctx.correlation_id,
            identity.map(|identity| &identity.user_id),
            attributes,
        ));
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    /// Runs an uploaded test module under the harness; summary parsing is
    /// best effort and never fails the request.
    async fn handle_tests(
        &self,
        identity: Option<&Identity>,
        ctx: &RequestContext,
        payload: Value,
    ) -> Result<Value, ToolError> {
        let request: TestRequest = decode(payload)?;
        ensure_python(&request.language)?;
        if request.framework != "pytest" {
            return Err(ToolError::InvalidInput {
                reason: format!("unsupported test framework {:?}", request.framework),
                token: Some(request.framework),
            });
        }
        let code_hash = CodeHash::of_source(&request.code);
        if let Err(err) = self.validator.validate(&request.code, self.strict_validation) {
            self.record_security_violation(identity, ctx, &code_hash, &err);
            return Err(err.into());
        }

        let timeout = self.exec.clamp_timeout(request.timeout_seconds);
        let outcome = self
            .exec
            .run(SandboxRequest {
                file_name: "test_snippet.py".to_string(),
                source: request.code,
                argv: vec![
                    PYTHON_BIN.to_string(),
                    "-m".to_string(),
                    "pytest".to_string(),
                    "-q".to_string(),
                    FILE_PLACEHOLDER.to_string(),
                ],
                timeout,
            })
            .await?;

        let (passed, failed) = parse_harness_summary(&outcome.stdout);
        let artifact = TestArtifact {
            id: new_artifact_id("test"),
            framework: request.framework,
            return_code: outcome.return_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            duration_ms: outcome.duration_ms,
            truncated: outcome.truncated,
            passed,
            failed,
            created_at: epoch_millis(),
        };

        self.persist_test(&artifact).await?;
        let mut attributes = Map::new();
        attributes.insert("framework".to_string(), json!(artifact.framework));
        attributes.insert("return_code".to_string(), json!(artifact.return_code));
        attributes.insert("duration_ms".to_string(), json!(artifact.duration_ms));
        self.audit.record(AuditLog::event(
            AuditEventType::CodeExec,
            AuditSeverity::Info,
            &ctx.correlation_id,
            identity.map(|identity| &identity.user_id),
            attributes,
        ));
        serde_json::to_value(&artifact)
            .map_err(|err| ToolError::Internal(format!("test serialization failed: {err}")))
    }

    /// Persists a test artifact.
    async fn persist_test(&self, artifact: &TestArtifact) -> Result<(), ToolError> {
        let statement = "CREATE (r:TestResult {id: $id, framework: $framework, return_code: \
                         $return_code, stdout: $stdout, stderr: $stderr, duration_ms: \
                         $duration_ms, truncated: $truncated, passed: $passed, failed: \
                         $failed, created_at: $created_at})";
        let params = json!({
            "id": artifact.id.as_str(),
            "framework": artifact.framework,
            "return_code": artifact.return_code,
            "stdout": artifact.stdout,
            "stderr": artifact.stderr,
            "duration_ms": artifact.duration_ms,
            "truncated": artifact.truncated,
            "passed": artifact.passed,
            "failed": artifact.failed,
            "created_at": artifact.created_at,
        });
        self.graph.execute_write(statement, &params, &["TestResult"]).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Generate
    // ------------------------------------------------------------------

    /// Pure template render: scalar-only context, no code evaluation, no
    /// filesystem or network access.
    async fn handle_generate(&self, payload: Value) -> Result<Value, ToolError> {
        let request: GenerateRequest = decode(payload)?;
        if request.template.len() > MAX_TEMPLATE_BYTES {
            return Err(ToolError::InvalidInput {
                reason: format!("template exceeds {MAX_TEMPLATE_BYTES} bytes"),
                token: None,
            });
        }
        for (key, value) in &request.context {
            validate_identifier(key, "context key")?;
            validate_property_value(key, value)?;
        }

        let output = render_template(&request.template, &request.context)?;
        let artifact = GenerationArtifact {
            id: new_artifact_id("gen"),
            language: request.language,
            output,
            created_at: epoch_millis(),
        };

        let statement = "CREATE (r:GenerationResult {id: $id, language: $language, output: \
                         $output, created_at: $created_at})";
        let params = json!({
            "id": artifact.id.as_str(),
            "language": artifact.language,
            "output": artifact.output,
            "created_at": artifact.created_at,
        });
        self.graph.execute_write(statement, &params, &["GenerationResult"]).await?;
        serde_json::to_value(&artifact)
            .map_err(|err| ToolError::Internal(format!("generation serialization failed: {err}")))
    }

    // ------------------------------------------------------------------
    // Graph
    // ------------------------------------------------------------------

    /// Upserts nodes then relationships in one atomic batch.
    async fn handle_upsert(
        &self,
        identity: Option<&Identity>,
        ctx: &RequestContext,
        payload: Value,
    ) -> Result<Value, ToolError> {
        let request: UpsertRequest = decode(payload)?;
        if request.nodes.is_empty() && request.relationships.is_empty() {
            return Err(ToolError::InvalidInput {
                reason: "upsert requires at least one node or relationship".to_string(),
                token: None,
            });
        }

        let mut statements = Vec::with_capacity(request.nodes.len() + request.relationships.len());
        let mut touched: Vec<String> = vec!["GraphNode".to_string()];

        for node in &request.nodes {
            validate_identifier(&node.key, "node key")?;
            for label in &node.labels {
                validate_identifier(label, "node label")?;
                if !touched.contains(label) {
                    touched.push(label.clone());
                }
            }
            for (key, value) in &node.properties {
                validate_identifier(key, "property key")?;
                validate_property_value(key, value)?;
            }
            let mut query =
                "MERGE (n:GraphNode {key: $key}) SET n += $props".to_string();
            for label in &node.labels {
                query.push_str(&format!(" SET n:`{label}`"));
            }
            statements.push(Statement::new(
                query,
                json!({
                    "key": node.key,
                    "props": Value::Object(node.properties.clone()),
                }),
            ));
        }

        for relationship in &request.relationships {
            validate_identifier(&relationship.start, "relationship start")?;
            validate_identifier(&relationship.end, "relationship end")?;
            validate_identifier(&relationship.rel_type, "relationship type")?;
            for (key, value) in &relationship.properties {
                validate_identifier(key, "property key")?;
                validate_property_value(key, value)?;
            }
            if !touched.contains(&relationship.rel_type) {
                touched.push(relationship.rel_type.clone());
            }
            statements.push(Statement::new(
                format!(
                    "MATCH (a:GraphNode {{key: $start}}), (b:GraphNode {{key: $end}}) MERGE \
                     (a)-[r:`{}`]->(b) SET r += $props",
                    relationship.rel_type
                ),
                json!({
                    "start": relationship.start,
                    "end": relationship.end,
                    "props": Value::Object(relationship.properties.clone()),
                }),
            ));
        }

        let touched_refs: Vec<&str> = touched.iter().map(String::as_str).collect();
        self.graph.execute_write_batch(&statements, &touched_refs).await?;

        let mut attributes = Map::new();
        attributes.insert("nodes".to_string(), json!(request.nodes.len()));
        attributes.insert("relationships".to_string(), json!(request.relationships.len()));
        self.audit.record(AuditLog::event(
            AuditEventType::GraphWrite,
            AuditSeverity::Info,
            &ctx.correlation_id,
            identity.map(|identity| &identity.user_id),
            attributes,
        ));
        Ok(json!({
            "nodes": request.nodes.len(),
            "relationships": request.relationships.len(),
        }))
    }

    /// Runs a validated read-only query through the cached read path.
    async fn handle_query(
        &self,
        identity: Option<&Identity>,
        ctx: &RequestContext,
        payload: Value,
    ) -> Result<Value, ToolError> {
        let request: QueryRequest = decode(payload)?;
        if let Err(err) = validate_read_only_query(&request.cypher) {
            let mut attributes = Map::new();
            attributes.insert("reason".to_string(), json!(err.reason));
            self.audit.record(AuditLog::event(
                AuditEventType::SecurityViolation,
                AuditSeverity::Warning,
                &ctx.correlation_id,
                identity.map(|identity| &identity.user_id),
                attributes,
            ));
            return Err(err.into());
        }

        let mut rows = self
            .graph
            .execute_read(&request.cypher, &Value::Object(request.parameters))
            .await?;
        let total = rows.len();
        rows.truncate(MAX_QUERY_ROWS);

        let mut attributes = Map::new();
        attributes.insert("rows".to_string(), json!(rows.len()));
        self.audit.record(AuditLog::event(
            AuditEventType::GraphRead,
            AuditSeverity::Info,
            &ctx.correlation_id,
            identity.map(|identity| &identity.user_id),
            attributes,
        ));
        Ok(json!({
            "rows": rows,
            "row_count": rows.len(),
            "truncated": total > MAX_QUERY_ROWS,
        }))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Decodes a schema-validated payload into a typed request.
fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, ToolError> {
    serde_json::from_value(payload).map_err(|err| ToolError::InvalidInput {
        reason: err.to_string(),
        token: None,
    })
}

/// Rejects languages other than the enabled one.
fn ensure_python(language: &str) -> Result<(), ToolError> {
    if language.eq_ignore_ascii_case(PYTHON_LANGUAGE) {
        Ok(())
    } else {
        Err(ToolError::UnsupportedLanguage(language.to_string()))
    }
}

/// Issues a prefixed random artifact id.
fn new_artifact_id(prefix: &str) -> ArtifactId {
    use rand::RngCore;
    let mut bytes = [0u8; 12];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let mut id = String::with_capacity(prefix.len() + 1 + bytes.len() * 2);
    id.push_str(prefix);
    id.push('-');
    for byte in bytes {
        id.push_str(&format!("{byte:02x}"));
    }
    ArtifactId::new(id)
}

/// Best-effort scan of a pytest `-q` summary line for pass/fail counts.
fn parse_harness_summary(stdout: &str) -> (Option<u32>, Option<u32>) {
    let mut passed = None;
    let mut failed = None;
    let mut previous_number: Option<u32> = None;
    for token in stdout.split_whitespace() {
        let word = token.trim_matches(|ch: char| !ch.is_ascii_alphanumeric());
        if word == "passed" && previous_number.is_some() {
            passed = previous_number;
        }
        if word == "failed" && previous_number.is_some() {
            failed = previous_number;
        }
        previous_number = token.trim_matches(|ch: char| !ch.is_ascii_digit()).parse().ok();
    }
    (passed, failed)
}

/// Renders `{{name}}` placeholders from a scalar context. Unresolved
/// placeholders fail closed.
fn render_template(template: &str, context: &Map<String, Value>) -> Result<String, ToolError> {
    let mut output = template.to_string();
    for (key, value) in context {
        let placeholder = format!("{{{{{key}}}}}");
        output = output.replace(&placeholder, &scalar_to_string(value));
    }
    if output.contains("{{") {
        return Err(ToolError::InvalidInput {
            reason: "template contains unresolved placeholders".to_string(),
            token: None,
        });
    }
    Ok(output)
}

/// Converts a scalar or flat sequence into its rendered form.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            items.iter().map(scalar_to_string).collect::<Vec<_>>().join(", ")
        }
        Value::Object(_) => String::new(),
    }
}

// ============================================================================
// SECTION: Registry Construction
// ============================================================================

/// Builds the immutable tool registry.
fn build_specs() -> Result<Vec<ToolSpec>, ToolError> {
    let code_payload = json!({
        "type": "object",
        "properties": {
            "code": { "type": "string", "minLength": 1 },
            "language": { "type": "string" },
            "timeout_seconds": { "type": "integer", "minimum": 1 },
        },
        "required": ["code"],
        "additionalProperties": false,
    });
    let test_payload = json!({
        "type": "object",
        "properties": {
            "code": { "type": "string", "minLength": 1 },
            "language": { "type": "string" },
            "framework": { "type": "string" },
            "timeout_seconds": { "type": "integer", "minimum": 1 },
        },
        "required": ["code"],
        "additionalProperties": false,
    });
    let generate_payload = json!({
        "type": "object",
        "properties": {
            "template": { "type": "string" },
            "context": { "type": "object" },
            "language": { "type": "string" },
        },
        "required": ["template"],
        "additionalProperties": false,
    });
    let upsert_payload = json!({
        "type": "object",
        "properties": {
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "key": { "type": "string" },
                        "labels": { "type": "array", "items": { "type": "string" } },
                        "properties": { "type": "object" },
                    },
                    "required": ["key"],
                    "additionalProperties": false,
                },
            },
            "relationships": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "start": { "type": "string" },
                        "end": { "type": "string" },
                        "type": { "type": "string" },
                        "properties": { "type": "object" },
                    },
                    "required": ["start", "end", "type"],
                    "additionalProperties": false,
                },
            },
        },
        "additionalProperties": false,
    });
    let query_payload = json!({
        "type": "object",
        "properties": {
            "cypher": { "type": "string", "minLength": 1 },
            "parameters": { "type": "object" },
        },
        "required": ["cypher"],
        "additionalProperties": false,
    });
    let list_prompts_payload = json!({
        "type": "object",
        "additionalProperties": false,
    });
    let get_prompt_payload = json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "minLength": 1 },
        },
        "required": ["id"],
        "additionalProperties": false,
    });

    let entries: Vec<(ToolName, &'static str, Value, Permission, bool)> = vec![
        (
            ToolName::LintCode,
            "Run static analysis on supplied code and persist the findings.",
            code_payload.clone(),
            Permission::TOOLS_LINT,
            true,
        ),
        (
            ToolName::ExecuteCode,
            "Run code in the sandbox with resource limits and bounded output.",
            code_payload,
            Permission::TOOLS_EXECUTE,
            false,
        ),
        (
            ToolName::RunTests,
            "Run a test module under the harness in the sandbox.",
            test_payload,
            Permission::TOOLS_TEST,
            false,
        ),
        (
            ToolName::GenerateCode,
            "Render a template with a scalar-only context.",
            generate_payload,
            Permission::TOOLS_GENERATE,
            false,
        ),
        (
            ToolName::GraphUpsert,
            "Create or update graph nodes and relationships atomically.",
            upsert_payload,
            Permission::GRAPH_UPSERT,
            false,
        ),
        (
            ToolName::GraphQuery,
            "Run a validated read-only graph query.",
            query_payload,
            Permission::GRAPH_QUERY,
            true,
        ),
        (
            ToolName::ListPrompts,
            "List the prompt catalog.",
            list_prompts_payload,
            Permission::TOOLS_READ,
            true,
        ),
        (
            ToolName::GetPrompt,
            "Fetch one prompt by id.",
            get_prompt_payload,
            Permission::TOOLS_READ,
            true,
        ),
    ];

    let mut specs = Vec::with_capacity(entries.len());
    for (tool, description, schema, permission, public) in entries {
        let compiled = compile_schema(&schema)?;
        specs.push(ToolSpec {
            tool,
            definition: ToolDefinition {
                name: tool.as_str(),
                description,
                input_schema: schema,
            },
            permission,
            public,
            compiled,
        });
    }
    Ok(specs)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
