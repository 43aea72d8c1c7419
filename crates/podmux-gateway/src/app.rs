// SPDX-License-Identifier: Apache-2.0

//! Process bootstrap: wires `Config`, the runtime/session crates, the
//! file-backed store, the heuristic permission gate, and the axum router
//! together behind the bearer-token auth layer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Router};
use podmux_backend::mock::{MockBackendFactory, MockPermissionGate};
use podmux_backend::{heal_persisted_session_context_windows, SessionStore};
use podmux_bridge::LoopbackBridge;
use podmux_config::Config;
use podmux_runtime::{ModelCatalog, ModelInfo, Session, SessionRegistry, Workspace, WorkspaceRuntime};
use podmux_session::SessionCoordinator;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use uuid::Uuid;

/// REST/WS request bodies (commands, stop envelopes) are small; this bounds
/// a misbehaving client from holding an unbounded body open.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

use crate::auth::{require_bearer_token, AuthState, StoredTokenFile};
use crate::git_status::ShellGitStatusProvider;
use crate::identity::Identity;
use crate::permission::HeuristicPermissionGate;
use crate::store::FileSessionStore;
use crate::ws::{ws_handler, WsState};

#[derive(Clone)]
struct ApiState {
    store: Arc<dyn SessionStore>,
    coordinator: Arc<SessionCoordinator>,
    registry: Arc<SessionRegistry>,
    catalog: Arc<ModelCatalog>,
}

/// Everything built once at startup and handed to the axum router.
pub struct Gateway {
    pub router: Router,
    pub identity: Identity,
    pub bind_addr: String,
}

/// Assemble the gateway from `config`. `data_dir` backs the identity key,
/// bearer token, and (absent a real backend/container driver, both
/// out-of-scope collaborators) the file-backed session/workspace store.
pub async fn build(config: Config, data_dir: PathBuf) -> anyhow::Result<Gateway> {
    std::fs::create_dir_all(&data_dir)?;

    let identity = Identity::load_or_generate(&data_dir)?;
    tracing::info!(fingerprint = %identity.fingerprint(), "server identity ready");

    let token_file = StoredTokenFile::load_or_generate(&data_dir.join("token.yaml"))?;
    let auth_state = AuthState {
        token_hash: Arc::new(token_file.token_hash),
    };

    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(&data_dir)?);
    let workspace_runtime = Arc::new(WorkspaceRuntime::new(&config));
    let registry = Arc::new(SessionRegistry::new(config.session_idle_timeout_ms));
    let catalog = Arc::new(ModelCatalog::new());

    // The agent backend SDK's dynamic model registry is a named out-of-scope
    // collaborator; `config.models` stands in as the statically-registered
    // list until a real backend is wired in.
    catalog.refresh(
        config
            .models
            .iter()
            .map(|m| ModelInfo {
                id: m.id.clone(),
                name: m.name.clone(),
                context_window: m.context_window,
            })
            .collect(),
    );
    heal_persisted_session_context_windows(store.as_ref(), &catalog)
        .await
        .context("healing persisted session context windows")?;

    // The container/sandbox driver and the agent backend SDK are named
    // out-of-scope collaborators; the deterministic mock stands in until a
    // real backend is wired in by the embedder.
    let gate: Arc<dyn podmux_backend::PermissionGate> = if config.permission_gate {
        Arc::new(HeuristicPermissionGate::new(config.heuristics.clone()))
    } else {
        MockPermissionGate::new()
    };
    let backend_factory = MockBackendFactory::new();
    let git_status_provider = Arc::new(ShellGitStatusProvider);
    let bridge = Arc::new(LoopbackBridge::new(config.gateway.gateway_hostname.clone()));

    let coordinator = SessionCoordinator::new(
        config.clone(),
        workspace_runtime,
        registry.clone(),
        catalog.clone(),
        store.clone(),
        gate,
        backend_factory,
        git_status_provider,
        bridge,
    );

    let api_state = ApiState {
        store,
        coordinator: coordinator.clone(),
        registry: registry.clone(),
        catalog,
    };
    let ws_state = WsState { coordinator, registry };

    let api_routes = Router::new()
        .route("/workspaces", post(create_workspace))
        .route("/workspaces/:workspace_id", get(get_workspace))
        .route("/workspaces/:workspace_id/sessions", post(create_session))
        .route("/models", get(list_models))
        .with_state(api_state)
        .route_layer(middleware::from_fn_with_state(auth_state.clone(), require_bearer_token));

    let ws_routes = Router::new()
        .route("/ws/:session_id", get(ws_handler))
        .with_state(ws_state)
        .route_layer(middleware::from_fn_with_state(auth_state, require_bearer_token));

    let router = Router::new()
        .route("/healthz", get(healthz))
        .merge(api_routes)
        .merge(ws_routes)
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
                .layer(CorsLayer::permissive()),
        );

    Ok(Gateway {
        router,
        identity,
        bind_addr: config.gateway.bind_addr.clone(),
    })
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

async fn list_models(State(state): State<ApiState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.catalog.get_all(),
        updated_at: state.catalog.get_updated_at(),
    })
}

#[derive(Debug, Deserialize)]
struct CreateWorkspaceRequest {
    name: String,
    host_mount: Option<String>,
    git_status_enabled: Option<bool>,
}

async fn create_workspace(
    State(state): State<ApiState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<Json<Workspace>, StatusCode> {
    let mut workspace = Workspace::new(Uuid::new_v4().to_string(), req.name);
    workspace.host_mount = req.host_mount;
    workspace.git_status_enabled = req.git_status_enabled.unwrap_or(false);
    state
        .store
        .save_workspace(&workspace)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(workspace))
}

async fn get_workspace(
    State(state): State<ApiState>,
    Path(workspace_id): Path<String>,
) -> Result<Json<Workspace>, StatusCode> {
    state
        .store
        .get_workspace(&workspace_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    name: Option<String>,
}

async fn create_session(
    State(state): State<ApiState>,
    Path(workspace_id): Path<String>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<Session>, StatusCode> {
    let workspace = state
        .store
        .get_workspace(&workspace_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let session_id = Uuid::new_v4().to_string();
    let session = Session::new(session_id.clone(), workspace_id, req.name.unwrap_or_default());
    state
        .store
        .save_session(&session)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state
        .coordinator
        .start_session(session_id.clone(), session_id, Some(workspace))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let started = state
        .registry
        .get(&session.session_id)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    let snapshot = started.lock().await.session.clone();
    Ok(Json(snapshot))
}
