// SPDX-License-Identifier: Apache-2.0

//! Deterministic in-memory implementations used by the session-level test
//! suite; no real process or filesystem involved.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use podmux_policy::{GateRequest, PolicyDecision};
use podmux_runtime::{Session, Workspace};
use tokio::sync::{broadcast, Mutex};

use crate::command::{BackendCommand, BackendResponse};
use crate::event::BackendEvent;
use crate::traits::{
    AgentBackend, AgentBackendFactory, BackendError, GitStatusProvider, PermissionGate,
    SessionStore, StoreError,
};

/// A backend whose replies and emitted events are scripted by the caller
/// through [`MockBackend::push_response`] / direct access to its event
/// sender.
pub struct MockBackend {
    events_tx: broadcast::Sender<BackendEvent>,
    responses: Mutex<HashMap<&'static str, BackendResponse>>,
    commands_seen: Mutex<Vec<BackendCommand>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            events_tx,
            responses: Mutex::new(HashMap::new()),
            commands_seen: Mutex::new(Vec::new()),
        })
    }

    pub fn emit(&self, event: BackendEvent) {
        let _ = self.events_tx.send(event);
    }

    pub async fn set_response(&self, key: &'static str, response: BackendResponse) {
        self.responses.lock().await.insert(key, response);
    }

    pub async fn commands_seen(&self) -> Vec<BackendCommand> {
        self.commands_seen.lock().await.clone()
    }

    fn response_key(cmd: &BackendCommand) -> &'static str {
        match cmd {
            BackendCommand::Prompt { .. } => "prompt",
            BackendCommand::Steer { .. } => "steer",
            BackendCommand::FollowUp { .. } => "follow_up",
            BackendCommand::Abort => "abort",
            BackendCommand::AbortBash => "abort_bash",
            BackendCommand::SetModel { .. } => "set_model",
            BackendCommand::CycleModel => "cycle_model",
            BackendCommand::SetThinkingLevel { .. } => "set_thinking_level",
            BackendCommand::CycleThinkingLevel => "cycle_thinking_level",
            BackendCommand::NewSession => "new_session",
            BackendCommand::SetSessionName { .. } => "set_session_name",
            BackendCommand::Compact => "compact",
            BackendCommand::SetAutoCompaction { .. } => "set_auto_compaction",
            BackendCommand::Fork => "fork",
            BackendCommand::SwitchSession { .. } => "switch_session",
            BackendCommand::SetSteeringMode { .. } => "set_steering_mode",
            BackendCommand::SetFollowUpMode { .. } => "set_follow_up_mode",
            BackendCommand::SetAutoRetry { .. } => "set_auto_retry",
            BackendCommand::AbortRetry => "abort_retry",
            BackendCommand::GetStateSnapshot => "get_state_snapshot",
            BackendCommand::GetMessages => "get_messages",
            BackendCommand::GetSessionStats => "get_session_stats",
            BackendCommand::Dispose => "dispose",
        }
    }
}

#[async_trait]
impl AgentBackend for MockBackend {
    async fn send_command(&self, cmd: BackendCommand) -> Result<BackendResponse, BackendError> {
        let key = Self::response_key(&cmd);
        self.commands_seen.lock().await.push(cmd);
        Ok(self
            .responses
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events_tx.subscribe()
    }

    async fn dispose(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

pub struct MockBackendFactory {
    pub backends: DashMap<String, Arc<MockBackend>>,
}

impl MockBackendFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            backends: DashMap::new(),
        })
    }

    pub fn backend_for(&self, session_id: &str) -> Option<Arc<MockBackend>> {
        self.backends.get(session_id).map(|e| e.value().clone())
    }
}

#[async_trait]
impl AgentBackendFactory for MockBackendFactory {
    async fn create(
        &self,
        session_id: &str,
        _workspace_id: &str,
        _env: &HashMap<String, String>,
    ) -> Result<Arc<dyn AgentBackend>, BackendError> {
        let backend = MockBackend::new();
        self.backends.insert(session_id.to_string(), backend.clone());
        Ok(backend)
    }
}

/// Always allows, unless a path has been explicitly marked denied via
/// [`MockPermissionGate::deny_tool`].
pub struct MockPermissionGate {
    denied_tools: DashMap<String, String>,
    destroyed: Mutex<Vec<String>>,
}

impl MockPermissionGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            denied_tools: DashMap::new(),
            destroyed: Mutex::new(Vec::new()),
        })
    }

    pub fn deny_tool(&self, tool: &str, reason: &str) {
        self.denied_tools.insert(tool.to_string(), reason.to_string());
    }

    pub async fn destroyed_guards(&self) -> Vec<String> {
        self.destroyed.lock().await.clone()
    }
}

#[async_trait]
impl PermissionGate for MockPermissionGate {
    async fn evaluate(&self, request: GateRequest) -> PolicyDecision {
        if let Some(reason) = self.denied_tools.get(&request.tool) {
            return PolicyDecision {
                action: podmux_policy::PolicyAction::Deny,
                reason: reason.clone(),
                layer: podmux_policy::DecisionLayer::Rule,
                rule_label: Some(format!("mock:{}", request.tool)),
            };
        }
        PolicyDecision::allow("mock gate: no rule configured")
    }

    async fn destroy_session_guard(&self, session_id: &str) {
        self.destroyed.lock().await.push(session_id.to_string());
    }
}

/// In-memory session/workspace/preference store.
pub struct MockSessionStore {
    sessions: DashMap<String, Session>,
    workspaces: DashMap<String, Workspace>,
    thinking_prefs: DashMap<String, String>,
}

impl MockSessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            workspaces: DashMap::new(),
            thinking_prefs: DashMap::new(),
        })
    }
}

impl Default for MockSessionStore {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
            workspaces: DashMap::new(),
            thinking_prefs: DashMap::new(),
        }
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(session_id).map(|e| e.value().clone()))
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn list_sessions(&self, workspace_id: &str) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .filter(|e| e.value().workspace_id == workspace_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn list_all_sessions(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions.iter().map(|e| e.value().clone()).collect())
    }

    async fn get_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>, StoreError> {
        Ok(self.workspaces.get(workspace_id).map(|e| e.value().clone()))
    }

    async fn save_workspace(&self, workspace: &Workspace) -> Result<(), StoreError> {
        self.workspaces.insert(workspace.id.clone(), workspace.clone());
        Ok(())
    }

    async fn get_model_thinking_level_preference(
        &self,
        model_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.thinking_prefs.get(model_id).map(|e| e.value().clone()))
    }

    async fn set_model_thinking_level_preference(
        &self,
        model_id: &str,
        level: &str,
    ) -> Result<(), StoreError> {
        self.thinking_prefs.insert(model_id.to_string(), level.to_string());
        Ok(())
    }
}

/// Returns a fixed, configurable status payload; never fails.
pub struct MockGitStatusProvider {
    status: Mutex<serde_json::Value>,
}

impl MockGitStatusProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(serde_json::json!({"clean": true})),
        })
    }

    pub async fn set_status(&self, status: serde_json::Value) {
        *self.status.lock().await = status;
    }
}

#[async_trait]
impl GitStatusProvider for MockGitStatusProvider {
    async fn git_status(&self, _workspace: &Workspace) -> Result<serde_json::Value, BackendError> {
        Ok(self.status.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_backend_echoes_scripted_response() {
        let backend = MockBackend::new();
        backend
            .set_response("set_model", serde_json::json!({"provider": "anthropic", "id": "opus-4"}))
            .await;
        let response = backend
            .send_command(BackendCommand::SetModel {
                provider: "anthropic".into(),
                id: "opus-4".into(),
            })
            .await
            .unwrap();
        assert_eq!(response["id"], "opus-4");
        assert_eq!(backend.commands_seen().await.len(), 1);
    }

    #[tokio::test]
    async fn mock_backend_broadcasts_emitted_events() {
        let backend = MockBackend::new();
        let mut rx = backend.subscribe();
        backend.emit(BackendEvent::AgentStart);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.type_name(), "agent_start");
    }

    #[tokio::test]
    async fn mock_permission_gate_denies_configured_tool() {
        let gate = MockPermissionGate::new();
        gate.deny_tool("bash", "denied for testing");
        let decision = gate
            .evaluate(GateRequest {
                tool: "bash".into(),
                input: serde_json::json!({}),
            })
            .await;
        assert_eq!(decision.action, podmux_policy::PolicyAction::Deny);
    }

    #[tokio::test]
    async fn mock_session_store_roundtrips() {
        let store = MockSessionStore::new();
        let session = Session::new("s1".into(), "w1".into(), "n".into());
        store.save_session(&session).await.unwrap();
        let fetched = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(fetched.session_id, "s1");
    }
}
