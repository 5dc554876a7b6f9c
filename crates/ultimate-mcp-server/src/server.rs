// crates/ultimate-mcp-server/src/server.rs
// ============================================================================
// Module: Platform Server
// Description: HTTP/JSON routes and the MCP streaming-HTTP endpoint.
// Purpose: Expose one tool registry through two co-equal transports.
// Dependencies: axum, tokio, ultimate-mcp-{config, core, graph}
// ============================================================================

//! ## Overview
//! One axum application serves both front doors: JSON routes (one per tool,
//! plus health, metrics, prompts, and revocation) and the MCP JSON-RPC
//! endpoint mounted at `/mcp`. A single middleware layer assigns the
//! correlation id, enforces the body cap, stamps security and CORS headers,
//! and records metrics; the pipeline gates and the tool registry are shared,
//! so both transports behave identically. MCP clients must accept
//! server-sent events; a missing `Accept: text/event-stream` is a protocol
//! error by design.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use ultimate_mcp_config::PlatformConfig;
use ultimate_mcp_core::Permission;
use ultimate_mcp_core::RateLimiter;
use ultimate_mcp_core::RevocationStore;
use ultimate_mcp_core::TokenService;
use ultimate_mcp_core::ToolName;
use ultimate_mcp_core::UserId;
use ultimate_mcp_core::epoch_millis;
use ultimate_mcp_core::epoch_secs;
use ultimate_mcp_graph::GraphClient;
use ultimate_mcp_graph::GraphClientConfig;
use ultimate_mcp_graph::HttpGraphDriver;
use ultimate_mcp_graph::HttpGraphDriverConfig;
use ultimate_mcp_graph::bootstrap_schema;
use ultimate_mcp_core::breaker::BreakerConfig;

use crate::audit::AuditLog;
use crate::auth::RequestContext;
use crate::correlation::CorrelationIdGenerator;
use crate::correlation::REQUEST_ID_HEADER;
use crate::logging::LogLevel;
use crate::logging::Logger;
use crate::logging::StderrLogSink;
use crate::pipeline::GateError;
use crate::pipeline::RequestPipeline;
use crate::prompts::PromptCatalog;
use crate::telemetry::Metrics;
use crate::telemetry::MetricsRegistry;
use crate::telemetry::Outcome;
use crate::telemetry::RequestMetric;
use crate::telemetry::Transport;
use crate::tools::ToolError;
use crate::tools::ToolRouter;
use crate::exec::ExecEngine;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Sweep cadence for revocations and caches.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration rejected.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization failed.
    #[error("init error: {0}")]
    Init(String),
    /// Required dependency unavailable at startup.
    #[error("dependency error: {0}")]
    Dependency(String),
    /// Transport failure while serving.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// Correlation id attached to the request by the context middleware.
#[derive(Debug, Clone)]
struct RequestId(String);

/// Everything the handlers share.
pub struct AppState {
    /// Platform configuration.
    config: PlatformConfig,
    /// Tool registry and handlers.
    router: ToolRouter,
    /// Security gates.
    pipeline: RequestPipeline,
    /// Graph persistence.
    graph: Arc<GraphClient>,
    /// Request metrics registry.
    metrics: Arc<MetricsRegistry>,
    /// Correlation id generator.
    correlation: CorrelationIdGenerator,
    /// Prompt catalog.
    prompts: Arc<PromptCatalog>,
    /// Structured logger.
    logger: Logger,
}

/// Platform server: built once from config, then served.
pub struct PlatformServer {
    /// Shared application state.
    state: Arc<AppState>,
}

impl PlatformServer {
    /// Builds the server over the bundled HTTP graph driver.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when a subsystem cannot be constructed.
    pub fn from_config(config: PlatformConfig) -> Result<Self, ServerError> {
        let driver = HttpGraphDriver::new(HttpGraphDriverConfig::new(
            config.graph.uri.clone(),
            config.graph.user.clone(),
            config.graph.password.clone(),
            config.graph.database.clone(),
        ))
        .map_err(|err| ServerError::Init(err.to_string()))?;
        Self::from_config_with_driver(config, Arc::new(driver))
    }

    /// Builds the server over a caller-supplied graph driver.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when a subsystem cannot be constructed.
    pub fn from_config_with_driver(
        config: PlatformConfig,
        driver: Arc<dyn ultimate_mcp_graph::GraphDriver>,
    ) -> Result<Self, ServerError> {
        let logger = Logger::new(
            Arc::new(StderrLogSink::new(config.log.format)),
            LogLevel::parse(&config.log.level),
        );

        let graph = Arc::new(GraphClient::new(
            driver,
            GraphClientConfig {
                pool_max: config.graph.pool_max,
                acquisition_timeout: config.graph.acquisition_timeout,
                retry: ultimate_mcp_graph::RetryPolicy::default(),
                read_breaker: BreakerConfig {
                    failure_threshold: config.breaker_read.failure_threshold,
                    success_threshold: config.breaker_read.success_threshold,
                    open_timeout: config.breaker_read.open_timeout,
                    half_open_max: 2,
                },
                write_breaker: BreakerConfig {
                    failure_threshold: config.breaker_write.failure_threshold,
                    success_threshold: config.breaker_write.success_threshold,
                    open_timeout: config.breaker_write.open_timeout,
                    half_open_max: 2,
                },
                cache_capacity: config.cache.capacity,
                cache_ttl: config.cache.ttl,
            },
        ));

        let audit = AuditLog::new(Arc::clone(&graph), logger.clone());
        let revocations = Arc::new(RevocationStore::new());
        let tokens = Arc::new(
            TokenService::from_secret(
                &config.auth.signing_key,
                config.auth.token_ttl_hours,
                Arc::clone(&revocations),
            )
            .map_err(|err| ServerError::Config(err.to_string()))?,
        );
        let limiter = Arc::new(RateLimiter::new(ultimate_mcp_core::RateLimitConfig {
            per_minute: config.rate_limit.per_minute,
            per_hour: config.rate_limit.per_hour,
            per_day: config.rate_limit.per_day,
            burst: config.rate_limit.burst,
            max_entries: 65_536,
        }));
        let pipeline = RequestPipeline::new(tokens, limiter, audit.clone());

        let exec = Arc::new(ExecEngine::new(config.exec.clone()));
        let prompts = Arc::new(PromptCatalog::builtin());
        let router = ToolRouter::new(
            Arc::clone(&graph),
            exec,
            audit,
            Arc::clone(&prompts),
            &config.exec,
        )
        .map_err(|err| ServerError::Init(err.to_string()))?;

        Ok(Self {
            state: Arc::new(AppState {
                config,
                router,
                pipeline,
                graph,
                metrics: Arc::new(MetricsRegistry::new()),
                correlation: CorrelationIdGenerator::new(),
                prompts,
                logger,
            }),
        })
    }

    /// Builds the axum application over the shared state.
    #[must_use]
    pub fn app(&self) -> Router {
        build_app(Arc::clone(&self.state))
    }

    /// Applies schema bootstrap, starts sweeps, and serves until failure.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when startup requirements fail or the listener
    /// dies.
    pub async fn serve(self) -> Result<(), ServerError> {
        let state = Arc::clone(&self.state);
        bootstrap_schema(&state.graph)
            .await
            .map_err(|err| ServerError::Dependency(format!("schema bootstrap failed: {err}")))?;
        tokio::spawn(run_sweeps(Arc::clone(&state)));

        let addr = SocketAddr::new(state.config.server.bind_addr, state.config.server.port);
        let app = self.app();
        state.logger.info(format!("listening on {addr}"), None);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("bind failed: {err}")))?;
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|err| ServerError::Transport(format!("server failed: {err}")))
    }
}

/// Builds the route table and middleware stack.
fn build_app(state: Arc<AppState>) -> Router {
    let max_body = state.config.server.max_body_bytes;
    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/prompts", get(handle_prompts_list))
        .route("/prompts/{id}", get(handle_prompts_get))
        .route("/lint_code", post(route_lint))
        .route("/execute_code", post(route_execute))
        .route("/run_tests", post(route_tests))
        .route("/generate_code", post(route_generate))
        .route("/graph_upsert", post(route_upsert))
        .route("/graph_query", post(route_query))
        .route("/auth/revoke", post(handle_revoke))
        .route("/auth/revoke_all", post(handle_revoke_all))
        .route("/mcp", post(handle_mcp))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), context_middleware))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

// ============================================================================
// SECTION: Context Middleware
// ============================================================================

/// Assigns the correlation id, enforces the body cap, stamps security and
/// CORS headers, and records request metrics and logs.
async fn context_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let client_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let request_id = state.correlation.accept_or_issue(client_id.as_deref());
    request.extensions_mut().insert(RequestId(request_id.clone()));

    // Preflight requests terminate here with the CORS verdict.
    if method == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        stamp_headers(&mut response, &state, &request_id, origin.as_deref(), started);
        return response;
    }

    // Reject declared oversized bodies before reading them.
    let declared_length = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared_length.is_some_and(|length| length > state.config.server.max_body_bytes) {
        let mut response = error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "too_large",
            "request body too large",
            None,
            &request_id,
            None,
        );
        stamp_headers(&mut response, &state, &request_id, origin.as_deref(), started);
        return response;
    }

    state.logger.info(format!("request.start {method} {path}"), Some(&request_id));
    let mut response = next.run(request).await;
    stamp_headers(&mut response, &state, &request_id, origin.as_deref(), started);

    let transport = if path == "/mcp" { Transport::Mcp } else { Transport::Http };
    let outcome =
        if response.status().is_success() { Outcome::Ok } else { Outcome::Error };
    let metric = RequestMetric {
        transport,
        tool: None,
        outcome,
        error_kind: None,
    };
    state.metrics.record_request(&metric);
    state.metrics.record_latency(&metric, started.elapsed());
    let mut fields = serde_json::Map::new();
    fields.insert("status".to_string(), json!(response.status().as_u16()));
    fields.insert("duration_ms".to_string(), json!(started.elapsed().as_millis() as u64));
    state.logger.log(
        LogLevel::Info,
        format!("request.end {method} {path}"),
        Some(&request_id),
        fields,
    );
    response
}

/// Stamps correlation, timing, security, and CORS headers on a response.
fn stamp_headers(
    response: &mut Response,
    state: &AppState,
    request_id: &str,
    origin: Option<&str>,
    started: Instant,
) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert("x-request-id", value);
    }
    if let Ok(value) =
        HeaderValue::from_str(&format!("{:.3}s", started.elapsed().as_secs_f64()))
    {
        headers.insert("x-response-time", value);
    }
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'self'"),
    );
    if let Some(origin) = origin {
        let allowed = state
            .config
            .server
            .allowed_origins
            .iter()
            .any(|candidate| candidate == origin || candidate == "*");
        if allowed {
            if let Ok(value) = HeaderValue::from_str(origin) {
                headers.insert("access-control-allow-origin", value);
            }
            headers.insert(
                "access-control-allow-methods",
                HeaderValue::from_static("GET, POST, OPTIONS"),
            );
            headers.insert(
                "access-control-allow-headers",
                HeaderValue::from_static("authorization, content-type, x-request-id"),
            );
            headers.insert("vary", HeaderValue::from_static("Origin"));
        }
    }
}

// ============================================================================
// SECTION: Error Envelope
// ============================================================================

/// Builds the canonical error envelope response.
fn error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    details: Option<Value>,
    request_id: &str,
    retry_after_secs: Option<u64>,
) -> Response {
    let body = json!({
        "error": {
            "code": code,
            "message": message,
            "details": details,
        },
        "request_id": request_id,
    });
    let mut response = (status, axum::Json(body)).into_response();
    if let Some(secs) = retry_after_secs {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

/// Maps a gate rejection onto the HTTP envelope.
fn gate_error_response(err: &GateError, request_id: &str) -> Response {
    match err {
        GateError::Unauthenticated(message) => error_response(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            message,
            None,
            request_id,
            None,
        ),
        GateError::PermissionDenied(permission) => error_response(
            StatusCode::FORBIDDEN,
            "permission_denied",
            "caller lacks the required permission",
            Some(json!({ "permission": permission })),
            request_id,
            None,
        ),
        GateError::RateLimited {
            retry_after_secs,
        } => error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded",
            None,
            request_id,
            Some(*retry_after_secs),
        ),
        GateError::OverCapacity => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "over_capacity",
            "rate limiter saturated",
            None,
            request_id,
            None,
        ),
    }
}

/// Maps a tool failure onto the HTTP envelope.
fn tool_error_response(err: &ToolError, request_id: &str) -> Response {
    match err {
        ToolError::UnknownTool => {
            error_response(StatusCode::NOT_FOUND, "not_found", "unknown tool", None, request_id, None)
        }
        ToolError::InvalidInput {
            reason,
            token,
        } => error_response(
            StatusCode::BAD_REQUEST,
            "invalid_input",
            reason,
            token.as_ref().map(|token| json!({ "offending_token": token })),
            request_id,
            None,
        ),
        ToolError::UnsupportedLanguage(language) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "unsupported_language",
            &format!("language {language:?} is not enabled"),
            None,
            request_id,
            None,
        ),
        ToolError::Busy(message) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "busy",
            message,
            None,
            request_id,
            Some(1),
        ),
        ToolError::NotFound(message) => {
            error_response(StatusCode::NOT_FOUND, "not_found", message, None, request_id, None)
        }
        ToolError::Conflict(message) => {
            error_response(StatusCode::CONFLICT, "conflict", message, None, request_id, None)
        }
        ToolError::Unavailable(message) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "dependency_unavailable",
            message,
            None,
            request_id,
            None,
        ),
        ToolError::Internal(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal error",
            None,
            request_id,
            None,
        ),
    }
}

// ============================================================================
// SECTION: Tool Routes
// ============================================================================

/// Shared body for the six tool routes.
async fn run_tool_route(
    state: Arc<AppState>,
    tool: ToolName,
    peer: Option<IpAddr>,
    headers: HeaderMap,
    request_id: String,
    bytes: Bytes,
) -> Response {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let ctx = RequestContext::new(peer, auth_header, request_id.clone());

    let spec = state.router.spec(tool);
    let identity = match state.pipeline.admit(&ctx, spec.permission, spec.public) {
        Ok(identity) => identity,
        Err(err) => {
            if matches!(err, GateError::Unauthenticated(_) | GateError::PermissionDenied(_)) {
                state.logger.warn(format!("gate rejected: {err}"), Some(&request_id));
            }
            return gate_error_response(&err, &request_id);
        }
    };

    let payload: Value = if bytes.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_input",
                    &format!("malformed json body: {err}"),
                    None,
                    &request_id,
                    None,
                );
            }
        }
    };

    match state.router.handle(tool, identity.as_ref(), &ctx, payload).await {
        Ok(result) => {
            state.metrics.record_tool_call(tool);
            (StatusCode::OK, axum::Json(result)).into_response()
        }
        Err(err) => {
            if matches!(err, ToolError::Internal(_)) {
                state.logger.error(format!("tool {tool} failed: {err}"), Some(&request_id));
            }
            tool_error_response(&err, &request_id)
        }
    }
}

macro_rules! tool_route {
    ($name:ident, $tool:expr) => {
        async fn $name(
            State(state): State<Arc<AppState>>,
            ConnectInfo(peer): ConnectInfo<SocketAddr>,
            axum::Extension(RequestId(request_id)): axum::Extension<RequestId>,
            headers: HeaderMap,
            bytes: Bytes,
        ) -> Response {
            run_tool_route(state, $tool, Some(peer.ip()), headers, request_id, bytes).await
        }
    };
}

tool_route!(route_lint, ToolName::LintCode);
tool_route!(route_execute, ToolName::ExecuteCode);
tool_route!(route_tests, ToolName::RunTests);
tool_route!(route_generate, ToolName::GenerateCode);
tool_route!(route_upsert, ToolName::GraphUpsert);
tool_route!(route_query, ToolName::GraphQuery);

// ============================================================================
// SECTION: Service Routes
// ============================================================================

/// Service and database liveness.
async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    let database = state.graph.health().await;
    let status = if database { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        axum::Json(json!({
            "service": "ok",
            "database": database,
            "timestamp_ms": epoch_millis(),
        })),
    )
        .into_response()
}

/// Counters, histograms, breaker states, and best-effort graph counts.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    let mut payload = json!({
        "requests": state.metrics.snapshot(),
        "graph": state.graph.metrics(),
    });
    // Graph totals are advisory; an unreachable database leaves them out.
    if let Ok(rows) = state
        .graph
        .execute_read("MATCH (n) RETURN count(n) AS nodes", &json!({}))
        .await
    {
        if let Some(count) = rows.first().and_then(|row| row.get("nodes")) {
            payload["graph_nodes"] = count.clone();
        }
    }
    if let Ok(rows) = state
        .graph
        .execute_read("MATCH ()-[r]->() RETURN count(r) AS relationships", &json!({}))
        .await
    {
        if let Some(count) = rows.first().and_then(|row| row.get("relationships")) {
            payload["graph_relationships"] = count.clone();
        }
    }
    (StatusCode::OK, axum::Json(payload)).into_response()
}

/// Prompt catalog listing.
async fn handle_prompts_list(State(state): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, axum::Json(json!({ "prompts": state.prompts.list() }))).into_response()
}

/// Single prompt lookup.
async fn handle_prompts_get(
    State(state): State<Arc<AppState>>,
    axum::Extension(RequestId(request_id)): axum::Extension<RequestId>,
    Path(id): Path<String>,
) -> Response {
    match state.prompts.get(&id) {
        Some(record) => (StatusCode::OK, axum::Json(json!(record))).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("prompt {id:?} does not exist"),
            None,
            &request_id,
            None,
        ),
    }
}

// ============================================================================
// SECTION: Revocation Routes
// ============================================================================

/// Token-level revocation payload.
#[derive(Debug, Deserialize)]
struct RevokeRequest {
    /// Token to revoke.
    token: String,
    /// Operator reason.
    #[serde(default)]
    reason: Option<String>,
}

/// User-level revocation payload.
#[derive(Debug, Deserialize)]
struct RevokeAllRequest {
    /// User whose tokens are revoked.
    user_id: String,
}

/// Revokes one token and persists the blacklist fact.
async fn handle_revoke(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    axum::Extension(RequestId(request_id)): axum::Extension<RequestId>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let ctx = RequestContext::new(Some(peer.ip()), auth_header, request_id.clone());
    if let Err(err) = state.pipeline.admit(&ctx, Permission::SYSTEM_ADMIN, false) {
        return gate_error_response(&err, &request_id);
    }
    let request: RevokeRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_input",
                &format!("malformed json body: {err}"),
                None,
                &request_id,
                None,
            );
        }
    };

    let reason = request.reason.unwrap_or_else(|| "revoked".to_string());
    let tokens = state.pipeline.tokens();
    let claims = match tokens.verify(&request.token) {
        Ok(claims) => claims,
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_input",
                &format!("token cannot be revoked: {err}"),
                None,
                &request_id,
                None,
            );
        }
    };
    if let Err(err) = tokens.revoke(&request.token, &reason) {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            &err.to_string(),
            None,
            &request_id,
            None,
        );
    }

    let statement = "MERGE (t:BlacklistedToken {token_hash: $token_hash}) SET t.reason = \
                     $reason, t.expires_at = $expires_at";
    let params = json!({
        "token_hash": ultimate_mcp_core::auth::token::fingerprint(&request.token),
        "reason": reason,
        "expires_at": claims.exp,
    });
    if let Err(err) = state
        .graph
        .execute_write(statement, &params, &["BlacklistedToken"])
        .await
    {
        state.logger.error(format!("blacklist persistence failed: {err}"), Some(&request_id));
    }
    (StatusCode::OK, axum::Json(json!({ "revoked": true }))).into_response()
}

/// Revokes every token issued to a user before now.
async fn handle_revoke_all(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    axum::Extension(RequestId(request_id)): axum::Extension<RequestId>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let ctx = RequestContext::new(Some(peer.ip()), auth_header, request_id.clone());
    if let Err(err) = state.pipeline.admit(&ctx, Permission::SYSTEM_ADMIN, false) {
        return gate_error_response(&err, &request_id);
    }
    let request: RevokeAllRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_input",
                &format!("malformed json body: {err}"),
                None,
                &request_id,
                None,
            );
        }
    };

    let user_id = UserId::new(request.user_id);
    state.pipeline.tokens().revoke_all(&user_id);
    let statement = "MERGE (u:User {user_id: $user_id}) SET u.revoked_all_before = $cutoff";
    let params = json!({
        "user_id": user_id.as_str(),
        "cutoff": epoch_secs(),
    });
    if let Err(err) = state.graph.execute_write(statement, &params, &["User"]).await {
        state.logger.error(format!("revocation persistence failed: {err}"), Some(&request_id));
    }
    (StatusCode::OK, axum::Json(json!({ "revoked_all": true }))).into_response()
}

// ============================================================================
// SECTION: MCP Transport
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    id: Value,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
    /// Structured error metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Tool call parameters for JSON-RPC requests.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
}

/// Builds a JSON-RPC success response.
fn rpc_ok(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

/// Builds a JSON-RPC error response.
fn rpc_err(id: Value, code: i64, message: String, data: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message,
            data,
        }),
    }
}

/// Maps a gate rejection onto a JSON-RPC error.
fn rpc_gate_error(id: Value, err: &GateError, request_id: &str) -> JsonRpcResponse {
    let data = Some(json!({ "request_id": request_id }));
    match err {
        GateError::Unauthenticated(message) => rpc_err(id, -32001, message.clone(), data),
        GateError::PermissionDenied(permission) => {
            rpc_err(id, -32003, format!("missing permission {permission}"), data)
        }
        GateError::RateLimited {
            retry_after_secs,
        } => rpc_err(
            id,
            -32071,
            "rate limit exceeded".to_string(),
            Some(json!({
                "request_id": request_id,
                "retry_after_ms": retry_after_secs * 1_000,
            })),
        ),
        GateError::OverCapacity => rpc_err(id, -32072, "server overloaded".to_string(), data),
    }
}

/// Maps a tool failure onto a JSON-RPC error.
fn rpc_tool_error(id: Value, err: &ToolError, request_id: &str) -> JsonRpcResponse {
    let data = Some(json!({ "request_id": request_id }));
    match err {
        ToolError::UnknownTool => rpc_err(id, -32601, "unknown tool".to_string(), data),
        ToolError::InvalidInput {
            reason,
            ..
        } => rpc_err(id, -32602, reason.clone(), data),
        ToolError::UnsupportedLanguage(language) => {
            rpc_err(id, -32602, format!("language {language:?} is not enabled"), data)
        }
        ToolError::Busy(message) => rpc_err(id, -32072, message.clone(), data),
        ToolError::NotFound(message) => rpc_err(id, -32004, message.clone(), data),
        ToolError::Conflict(message) => rpc_err(id, -32009, message.clone(), data),
        ToolError::Unavailable(message) => rpc_err(id, -32055, message.clone(), data),
        ToolError::Internal(_) => rpc_err(id, -32050, "internal error".to_string(), data),
    }
}

/// Handles the MCP streaming-HTTP endpoint.
async fn handle_mcp(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    axum::Extension(RequestId(request_id)): axum::Extension<RequestId>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    // MCP streaming HTTP requires the client to accept SSE. A client that
    // cannot receive events gets a protocol-level error, by design.
    let accepts_sse = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream") || accept.contains("*/*"));
    if !accepts_sse {
        let body = rpc_err(
            Value::Null,
            -32600,
            "client must accept text/event-stream".to_string(),
            Some(json!({ "request_id": request_id })),
        );
        return (StatusCode::NOT_ACCEPTABLE, axum::Json(body)).into_response();
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(_) => {
            let body = rpc_err(
                Value::Null,
                -32600,
                "invalid json-rpc request".to_string(),
                Some(json!({ "request_id": request_id })),
            );
            return sse_response(body);
        }
    };
    if request.jsonrpc != "2.0" {
        return sse_response(rpc_err(
            request.id,
            -32600,
            "invalid json-rpc version".to_string(),
            Some(json!({ "request_id": request_id })),
        ));
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let ctx = RequestContext::new(Some(peer.ip()), auth_header, request_id.clone());

    let response = dispatch_rpc(&state, &ctx, &request_id, request).await;
    sse_response(response)
}

/// Dispatches one JSON-RPC request against the shared registry.
async fn dispatch_rpc(
    state: &Arc<AppState>,
    ctx: &RequestContext,
    request_id: &str,
    request: JsonRpcRequest,
) -> JsonRpcResponse {
    match request.method.as_str() {
        "initialize" => rpc_ok(
            request.id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {}, "prompts": {} },
                "serverInfo": {
                    "name": "ultimate-mcp",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "notifications/initialized" => rpc_ok(request.id, Value::Null),
        "tools/list" => rpc_ok(request.id, json!({ "tools": state.router.definitions() })),
        "prompts/list" => rpc_ok(request.id, json!({ "prompts": state.prompts.list() })),
        "prompts/get" => {
            let id = request
                .params
                .as_ref()
                .and_then(|params| params.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            match state.prompts.get(id) {
                Some(record) => rpc_ok(request.id, json!({ "prompt": record })),
                None => rpc_err(
                    request.id,
                    -32004,
                    format!("prompt {id:?} does not exist"),
                    Some(json!({ "request_id": request_id })),
                ),
            }
        }
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            let call: ToolCallParams = match serde_json::from_value(params) {
                Ok(call) => call,
                Err(_) => {
                    return rpc_err(
                        request.id,
                        -32602,
                        "invalid tool params".to_string(),
                        Some(json!({ "request_id": request_id })),
                    );
                }
            };
            let Some(tool) = ToolName::parse(&call.name) else {
                return rpc_err(
                    request.id,
                    -32601,
                    "unknown tool".to_string(),
                    Some(json!({ "request_id": request_id })),
                );
            };
            let spec = state.router.spec(tool);
            let identity = match state.pipeline.admit(ctx, spec.permission, spec.public) {
                Ok(identity) => identity,
                Err(err) => return rpc_gate_error(request.id, &err, request_id),
            };
            let arguments = if call.arguments.is_null() { json!({}) } else { call.arguments };
            match state.router.handle(tool, identity.as_ref(), ctx, arguments).await {
                Ok(result) => {
                    state.metrics.record_tool_call(tool);
                    rpc_ok(
                        request.id,
                        json!({ "content": [{ "type": "json", "json": result }] }),
                    )
                }
                Err(err) => rpc_tool_error(request.id, &err, request_id),
            }
        }
        _ => rpc_err(
            request.id,
            -32601,
            "method not found".to_string(),
            Some(json!({ "request_id": request_id })),
        ),
    }
}

/// Wraps one JSON-RPC payload in a single-event SSE response.
fn sse_response(payload: JsonRpcResponse) -> Response {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(1);
    let data = serde_json::to_string(&payload).unwrap_or_else(|_| {
        "{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{\"code\":-32060,\"message\":\"serialization \
         failed\"}}"
            .to_string()
    });
    let _ = tx.try_send(Ok(Event::default().event("message").data(data)));
    Sse::new(ReceiverStream::new(rx)).into_response()
}

// ============================================================================
// SECTION: Background Sweeps
// ============================================================================

/// Periodic maintenance: revocation sweep, cache sweep, blacklist cleanup.
async fn run_sweeps(state: Arc<AppState>) {
    let revocations = state.pipeline.tokens().revocations();
    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;
        let removed = revocations.sweep(epoch_secs());
        let expired = state.graph.sweep_cache();
        if removed > 0 || expired > 0 {
            state.logger.info(
                format!("sweep removed {removed} revocations, {expired} cache entries"),
                None,
            );
        }
        let result = state
            .graph
            .execute_write(
                "MATCH (t:BlacklistedToken) WHERE t.expires_at < $now DETACH DELETE t",
                &json!({ "now": epoch_secs() }),
                &["BlacklistedToken"],
            )
            .await;
        if let Err(err) = result {
            state.logger.warn(format!("blacklist sweep failed: {err}"), None);
        }
    }
}
