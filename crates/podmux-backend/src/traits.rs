// SPDX-License-Identifier: Apache-2.0

//! Trait seams toward the backend SDK, the permission gate, and storage,
//! generalized into trait objects so the real backend and the deterministic
//! mocks share one interface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use podmux_policy::{GateRequest, PolicyDecision};
use podmux_runtime::{ModelCatalog, Session, Workspace};
use thiserror::Error;

use crate::command::{BackendCommand, BackendResponse};
use crate::event::BackendEvent;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unhandled SDK command: {0}")]
    UnhandledCommand(String),
    #[error("backend operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage operation failed: {0}")]
    Io(String),
}

/// A running backend process for one session.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn send_command(&self, cmd: BackendCommand) -> Result<BackendResponse, BackendError>;
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BackendEvent>;
    async fn dispose(&self) -> Result<(), BackendError>;
}

/// Creates a backend for a session, wired to stream events and be disposed.
#[async_trait]
pub trait AgentBackendFactory: Send + Sync {
    /// `env` is the fully-resolved, non-inheriting host environment for this
    /// session, with any loopback service URLs already rewritten through the
    /// sandbox-reachable bridge.
    async fn create(
        &self,
        session_id: &str,
        workspace_id: &str,
        env: &HashMap<String, String>,
    ) -> Result<Arc<dyn AgentBackend>, BackendError>;
}

/// Evaluates tool calls against the structural policy heuristics.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn evaluate(&self, request: GateRequest) -> PolicyDecision;
    /// Called on startup failure after the gate guard was created but the
    /// session never reached `ready`.
    async fn destroy_session_guard(&self, session_id: &str);
}

/// Best-effort git status lookup for a workspace's host mount.
#[async_trait]
pub trait GitStatusProvider: Send + Sync {
    async fn git_status(&self, workspace: &Workspace) -> Result<serde_json::Value, BackendError>;
}

/// Read/write access to persisted sessions, workspaces, and thinking-level
/// preferences.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;
    async fn save_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn list_sessions(&self, workspace_id: &str) -> Result<Vec<Session>, StoreError>;
    /// Every persisted session across all workspaces, for startup healing passes.
    async fn list_all_sessions(&self) -> Result<Vec<Session>, StoreError>;

    async fn get_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>, StoreError>;
    async fn save_workspace(&self, workspace: &Workspace) -> Result<(), StoreError>;

    async fn get_model_thinking_level_preference(
        &self,
        model_id: &str,
    ) -> Result<Option<String>, StoreError>;
    async fn set_model_thinking_level_preference(
        &self,
        model_id: &str,
        level: &str,
    ) -> Result<(), StoreError>;
}

/// Runs `ensure_session_context_window` across every persisted session.
/// Called once at startup to repair sessions saved before the catalog had
/// resolved their model's real context window.
pub async fn heal_persisted_session_context_windows(
    store: &dyn SessionStore,
    catalog: &ModelCatalog,
) -> Result<(), StoreError> {
    for mut session in store.list_all_sessions().await? {
        if catalog.ensure_session_context_window(&mut session) {
            store.save_session(&session).await?;
        }
    }
    Ok(())
}
