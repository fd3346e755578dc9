//! Axum route handlers for the biocage gateway API.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use biocage_core::{AccessMode, ContainerId, CpuLimit, ExecutionResult, MemoryLimit};
use biocage_executor::{
    Assessment, ContainerRuntime, ErrorCategory, FailureClass, FailurePolicy, RunOptions, Sandbox,
    SandboxConfig,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    error::GatewayError,
    pool::{SandboxHandle, SandboxPool},
};

// ── Shared state ─────────────────────────────────────────────────────────────

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<SandboxPool>,
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Base configuration new sandboxes start from.
    pub defaults: SandboxConfig,
}

impl AppState {
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, defaults: SandboxConfig) -> Self {
        Self { pool: Arc::new(SandboxPool::new()), runtime, defaults }
    }

    fn sandbox(&self, id: Uuid) -> Result<SandboxHandle, GatewayError> {
        self.pool.get(id).ok_or(GatewayError::SandboxNotFound(id))
    }
}

// ── Request / response types ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateSandboxBody {
    /// Memory limit such as `"512m"` or `"2g"`.
    pub memory: Option<String>,
    pub cpus: Option<f64>,
    pub network_access: Option<bool>,
    pub expose_files: BTreeMap<PathBuf, String>,
    pub expose_directories: BTreeMap<PathBuf, String>,
    pub expose_directories_rw: BTreeMap<PathBuf, String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSandboxResponse {
    pub id: Uuid,
    pub container_id: Option<ContainerId>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub code: String,
    /// Text the code reads from its stdin.
    #[serde(default)]
    pub stdin: String,
    pub timeout_secs: Option<f64>,
    /// Defaults to `true` (strict policy).
    pub shutdown_on_failure: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct EphemeralBody {
    pub code: String,
    #[serde(default)]
    pub stdin: String,
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ExposeBody {
    pub host_path: PathBuf,
    pub container_path: Option<String>,
    /// Defaults to `true`.
    pub read_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RestartResponse {
    pub container_id: ContainerId,
}

/// Execution result plus the failure policy's reading of it.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    #[serde(flatten)]
    pub result: ExecutionResult,
    pub success: bool,
    pub class: FailureClass,
    pub category: Option<ErrorCategory>,
    pub hint: Option<&'static str>,
    /// Whether the sandbox still has a running container afterwards.
    pub running: bool,
}

impl ExecuteResponse {
    fn new(result: ExecutionResult, verdict: Assessment, running: bool) -> Self {
        Self {
            success: result.success(),
            class: verdict.class,
            category: verdict.category,
            hint: verdict.category.map(ErrorCategory::hint),
            running,
            result,
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the application router over the given state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/sandbox", post(create_sandbox))
        .route("/v1/sandbox/{id}", get(sandbox_info).delete(destroy_sandbox))
        .route("/v1/sandbox/{id}/execute", post(execute_code))
        .route("/v1/sandbox/{id}/expose", post(expose_path))
        .route("/v1/sandbox/{id}/restart", post(restart_sandbox))
        .route("/v1/sandbox/{id}/session", get(session_summary))
        .route("/v1/execute", post(execute_ephemeral))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /health`: liveness check.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "ok", "sandboxes": state.pool.len()})),
    )
}

/// `POST /v1/sandbox`: create and start a sandbox.
///
/// # Errors
/// Returns [`GatewayError::Config`] for invalid limits or exposures, or
/// [`GatewayError::Executor`] if the container cannot be started.
pub async fn create_sandbox(
    State(state): State<AppState>,
    Json(body): Json<CreateSandboxBody>,
) -> Result<impl IntoResponse, GatewayError> {
    let config = sandbox_config(&state.defaults, body)?;
    let sandbox = Sandbox::open(Arc::clone(&state.runtime), config).await?;
    let container_id = sandbox.container().map(|h| h.id.clone());
    let id = state.pool.insert(sandbox);
    tracing::info!(sandbox = %id, "sandbox created");
    Ok((StatusCode::CREATED, Json(CreateSandboxResponse { id, container_id })))
}

fn sandbox_config(
    defaults: &SandboxConfig,
    body: CreateSandboxBody,
) -> Result<SandboxConfig, GatewayError> {
    let mut config = defaults.clone();
    if let Some(memory) = body.memory {
        config.limits.memory = memory.parse::<MemoryLimit>()?;
    }
    if let Some(cpus) = body.cpus {
        config.limits.cpus = CpuLimit::new(cpus)?;
    }
    if let Some(network) = body.network_access {
        config.limits.network_access = network;
    }
    config.expose_files.extend(body.expose_files);
    config.expose_directories.extend(body.expose_directories);
    config.expose_directories_rw.extend(body.expose_directories_rw);
    Ok(config)
}

/// `GET /v1/sandbox/{id}`: sandbox snapshot.
///
/// # Errors
/// Returns [`GatewayError::SandboxNotFound`] if the ID is not registered.
pub async fn sandbox_info(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let sandbox = state.sandbox(id)?;
    let info = sandbox.lock().await.info();
    Ok(Json(info))
}

/// `DELETE /v1/sandbox/{id}`: clean up and forget a sandbox.
///
/// # Errors
/// Returns [`GatewayError::SandboxNotFound`] if the ID is not registered.
pub async fn destroy_sandbox(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let sandbox = state.pool.remove(id).ok_or(GatewayError::SandboxNotFound(id))?;
    sandbox.lock().await.cleanup().await;
    tracing::info!(sandbox = %id, "sandbox destroyed");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/sandbox/{id}/execute`: run code in the sandbox session.
///
/// # Errors
/// Returns [`GatewayError::SandboxNotFound`] if the ID is not registered, or
/// [`GatewayError::InvalidRequest`] for a bad timeout.
pub async fn execute_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ExecuteBody>,
) -> Result<impl IntoResponse, GatewayError> {
    let sandbox = state.sandbox(id)?;
    let mut opts = RunOptions::default();
    if let Some(secs) = body.timeout_secs {
        opts = opts.with_timeout(parse_timeout(secs)?);
    }
    let shutdown = body.shutdown_on_failure.unwrap_or(true);
    opts.failure_policy = FailurePolicy::from_shutdown_on_failure(shutdown);

    let mut sandbox = sandbox.lock().await;
    let (result, verdict) = sandbox.run_with_stdin(&body.code, &body.stdin, opts).await;
    Ok(Json(ExecuteResponse::new(result, verdict, sandbox.is_running())))
}

/// `POST /v1/sandbox/{id}/expose`: bind a host path into the sandbox.
///
/// # Errors
/// Returns [`GatewayError::SandboxNotFound`] if the ID is not registered, or
/// [`GatewayError::Executor`] if the path cannot be exposed.
pub async fn expose_path(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ExposeBody>,
) -> Result<impl IntoResponse, GatewayError> {
    let sandbox = state.sandbox(id)?;
    let mode = AccessMode::from_read_only(body.read_only.unwrap_or(true));
    let outcome = sandbox
        .lock()
        .await
        .expose(&body.host_path, body.container_path.as_deref(), mode)
        .await?;
    Ok(Json(outcome))
}

/// `POST /v1/sandbox/{id}/restart`: replace the container.
///
/// # Errors
/// Returns [`GatewayError::SandboxNotFound`] if the ID is not registered, or
/// [`GatewayError::Executor`] if the new container cannot be started.
pub async fn restart_sandbox(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let sandbox = state.sandbox(id)?;
    let container_id = sandbox.lock().await.restart(None).await?;
    Ok(Json(RestartResponse { container_id }))
}

/// `GET /v1/sandbox/{id}/session`: names held in the session state.
///
/// # Errors
/// Returns [`GatewayError::SandboxNotFound`] if the ID is not registered, or
/// [`GatewayError::Executor`] if the sandbox is not running.
pub async fn session_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let sandbox = state.sandbox(id)?;
    let summary = sandbox.lock().await.inspect_session().await?;
    Ok(Json(summary))
}

/// `POST /v1/execute`: one-shot execution with no session.
///
/// # Errors
/// Returns [`GatewayError::InvalidRequest`] for a bad timeout.
pub async fn execute_ephemeral(
    State(state): State<AppState>,
    Json(body): Json<EphemeralBody>,
) -> Result<impl IntoResponse, GatewayError> {
    let mut opts = RunOptions::default().lenient();
    if let Some(secs) = body.timeout_secs {
        opts = opts.with_timeout(parse_timeout(secs)?);
    }
    let mut sandbox = Sandbox::new(Arc::clone(&state.runtime), state.defaults.clone());
    let (result, verdict) = sandbox.run_with_stdin(&body.code, &body.stdin, opts).await;
    Ok(Json(ExecuteResponse::new(result, verdict, false)))
}

fn parse_timeout(secs: f64) -> Result<Duration, GatewayError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(GatewayError::InvalidRequest(format!(
            "timeout_secs must be positive, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| GatewayError::InvalidRequest(format!("timeout_secs: {e}")))
}
