//! Client-facing HTTP API (spec.md §6): flow deployment submission and
//! read-only status/stats endpoints. Worker traffic never touches this
//! surface — that's `/ws/node` (see `ws.rs`).

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, Router};
use orchestrator_core::DeploymentRequest;
use orchestrator_protocol::Outbound;
use orchestrator_types::{
    ClientId, Deployment, DeploymentId, FlowConnection, FlowNode, ResourceLimits, SchedulerError, SessionId,
    ShareKey, WorkspaceId,
};
use serde::{Deserialize, Serialize};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/stats", axum::routing::get(stats))
        .route("/metrics", axum::routing::get(metrics))
        .route("/module-requirements", axum::routing::get(module_requirements))
        .route("/deployments", axum::routing::post(submit_deployment).get(list_deployments))
        .route("/deployments/:id", axum::routing::get(get_deployment).delete(cancel_deployment))
        .route("/sessions/:id/limits", axum::routing::post(update_session_limits))
        .route("/sessions/:id/workspaces", axum::routing::post(update_session_workspaces))
        .route("/share-keys/:key/consume", axum::routing::post(consume_share_key))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize)]
struct Stats {
    sessions: orchestrator_core::RegistryStats,
    deployments: orchestrator_core::DeploymentStats,
}

async fn stats(State(state): State<AppState>) -> Json<Stats> {
    Json(Stats { sessions: state.registry.stats(), deployments: state.deployments.stats() })
}

/// Prometheus text-exposition scrape endpoint. Deployment gauges are
/// refreshed here since the `DeploymentRegistry` isn't visible to the
/// Dispatcher, which already refreshes session/job gauges on every pass.
async fn metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.refresh_deployments(state.deployments.stats());
    state.metrics.export().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn module_requirements(State(state): State<AppState>) -> Json<orchestrator_protocol::ModuleRequirementsTable> {
    Json(state.module_requirements.clone())
}

#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub flow_id: String,
    pub name: String,
    pub client_id: ClientId,
    #[serde(default)]
    pub workspace_id: Option<WorkspaceId>,
    pub nodes: Vec<FlowNode>,
    pub connections: Vec<FlowConnection>,
    #[serde(default)]
    pub dry_run: bool,
    /// Keyed by credential id; selected per node via `FlowNode.credential_refs`.
    #[serde(default)]
    pub resolved_credentials: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    deployment_id: DeploymentId,
}

async fn submit_deployment(
    State(state): State<AppState>,
    Json(request): Json<CreateDeploymentRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let deployment_id = state.flow_engine.submit(DeploymentRequest {
        flow_id: request.flow_id,
        name: request.name,
        client_id: request.client_id,
        workspace_id: request.workspace_id,
        nodes: request.nodes,
        connections: request.connections,
        dry_run: request.dry_run,
        resolved_credentials: request.resolved_credentials,
    })?;
    Ok(Json(SubmitResponse { deployment_id }))
}

async fn get_deployment(State(state): State<AppState>, Path(id): Path<DeploymentId>) -> Result<Json<Deployment>, ApiError> {
    state
        .deployments
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError(orchestrator_types::SchedulerError::DeploymentNotFound(id.to_string())))
}

#[derive(Debug, Deserialize)]
pub struct ListDeploymentsQuery {
    pub client_id: ClientId,
}

async fn list_deployments(State(state): State<AppState>, Query(query): Query<ListDeploymentsQuery>) -> Json<Vec<Deployment>> {
    Json(state.deployments.list_for_client(query.client_id))
}

async fn cancel_deployment(State(state): State<AppState>, Path(id): Path<DeploymentId>) -> StatusCode {
    if state.flow_engine.cancel(id) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

/// `UpdateLimits` (spec.md §4.2): overwrites a session's resource limits and
/// reflects the change to the worker so it can re-advertise capacity.
async fn update_session_limits(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Json(limits): Json<ResourceLimits>,
) -> Result<StatusCode, ApiError> {
    state.registry.update_limits(id, limits.clone())?;
    let _ = state.connections.send(id, Outbound::UpdateLimits { limits });
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkspacesRequest {
    pub workspace_ids: Vec<WorkspaceId>,
}

/// `UpdateWorkspaces` (spec.md §4.2): replaces a session's workspace
/// bindings and notifies the worker of its new bindings.
async fn update_session_workspaces(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Json(request): Json<UpdateWorkspacesRequest>,
) -> Result<StatusCode, ApiError> {
    state.registry.update_workspaces(id, request.workspace_ids.clone())?;
    let _ = state.connections.send(id, Outbound::WorkspacesUpdated { workspace_ids: request.workspace_ids });
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ConsumeShareKeyRequest {
    pub workspace_id: WorkspaceId,
}

#[derive(Debug, Serialize)]
struct ConsumeShareKeyResponse {
    session_id: SessionId,
}

/// Share-key protocol (spec.md §6): the workspace-side "add node" flow binds
/// a just-registered worker to a workspace by single-use share key. Idempotent
/// if the session is already bound to that workspace.
async fn consume_share_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<ConsumeShareKeyRequest>,
) -> Result<Json<ConsumeShareKeyResponse>, ApiError> {
    let session_id = state
        .registry
        .consume_share_key(&ShareKey(key), request.workspace_id)
        .map_err(|_: SchedulerError| ApiError(SchedulerError::ShareKeyNotFound))?;
    if let Some(session) = state.registry.get(session_id) {
        let workspace_ids = session.workspace_bindings.into_iter().collect();
        let _ = state.connections.send(session_id, Outbound::WorkspacesUpdated { workspace_ids });
    }
    Ok(Json(ConsumeShareKeyResponse { session_id }))
}
