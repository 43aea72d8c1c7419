// SPDX-License-Identifier: Apache-2.0

//! Wires EventProcessor, CommandCoordinator, StopCoordinator, and
//! StartCoordinator around the shared registry, workspace runtime, model
//! catalog, and the backend/storage/permission-gate trait seams.
//!
//! One entity owns the command/event routing, the session map, and the
//! spawned per-session event-bridging task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use podmux_backend::{
    AgentBackend, AgentBackendFactory, BackendCommand, BackendEvent, GitStatusProvider,
    PermissionGate, SessionStore,
};
use podmux_bridge::LoopbackBridge;
use podmux_config::Config;
use podmux_runtime::{
    apply_pi_state_snapshot, build_host_env, ActiveSession, IdleTimeoutHandler, ModelCatalog,
    PiStateSnapshot, Session, SessionRegistry, SessionStatus, StopMode, StopSource,
    WorkspaceRuntime,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::commands::{
    changes_visible_session_fields, extract_model_from_response, normalize_error,
    reconcile_model_change, reconcile_session_name, reconcile_thinking_level,
};
use crate::errors::SessionError;
use crate::events::EventProcessor;
use crate::messages::ClientMessage;
use crate::start::resolve_workspace_id;
use crate::stop::StopCoordinator;

const GIT_STATUS_DEBOUNCE: Duration = Duration::from_secs(2);

pub struct SessionCoordinator {
    config: Config,
    workspace_runtime: Arc<WorkspaceRuntime>,
    registry: Arc<SessionRegistry>,
    catalog: Arc<ModelCatalog>,
    store: Arc<dyn SessionStore>,
    gate: Arc<dyn PermissionGate>,
    backend_factory: Arc<dyn AgentBackendFactory>,
    git_status_provider: Arc<dyn GitStatusProvider>,
    bridge: Arc<LoopbackBridge>,
    backends: DashMap<String, Arc<dyn AgentBackend>>,
    git_timers: DashMap<String, JoinHandle<()>>,
    stop_timers: DashMap<String, JoinHandle<()>>,
}

impl SessionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        workspace_runtime: Arc<WorkspaceRuntime>,
        registry: Arc<SessionRegistry>,
        catalog: Arc<ModelCatalog>,
        store: Arc<dyn SessionStore>,
        gate: Arc<dyn PermissionGate>,
        backend_factory: Arc<dyn AgentBackendFactory>,
        git_status_provider: Arc<dyn GitStatusProvider>,
        bridge: Arc<LoopbackBridge>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            workspace_runtime,
            registry,
            catalog,
            store,
            gate,
            backend_factory,
            git_status_provider,
            bridge,
            backends: DashMap::new(),
            git_timers: DashMap::new(),
            stop_timers: DashMap::new(),
        })
    }

    // ---- StartCoordinator (C8) ----------------------------------------

    pub async fn start_session(
        self: &Arc<Self>,
        key: String,
        session_id: String,
        workspace: Option<podmux_runtime::Workspace>,
    ) -> Result<(), SessionError> {
        let session = self
            .store
            .get_session(&session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;
        let workspace_id = resolve_workspace_id(workspace.as_ref(), &session);

        let this = self.clone();
        let wr = self.workspace_runtime.clone();
        let workspace_id_for_lock = workspace_id.clone();
        wr.with_workspace_lock(&workspace_id_for_lock, move || {
            this.start_under_workspace_lock(workspace_id, session_id, key, session)
        })
        .await
    }

    async fn start_under_workspace_lock(
        self: Arc<Self>,
        workspace_id: String,
        session_id: String,
        key: String,
        mut session: Session,
    ) -> Result<(), SessionError> {
        self.workspace_runtime
            .reserve_session_start(&workspace_id, &session_id)?;

        let outcome = self
            .finish_start_after_admission(&workspace_id, &session_id, &key, &mut session)
            .await;

        if outcome.is_err() {
            self.gate.destroy_session_guard(&session_id).await;
            self.workspace_runtime.release_session(&workspace_id, &session_id);
        }
        outcome
    }

    /// Builds the non-inheriting host environment (C10) and rewrites any
    /// loopback service URLs in it through the bridge (C3) so the sandbox
    /// driver hands the container a reachable, non-loopback address.
    async fn build_session_env(&self) -> HashMap<String, String> {
        let mut env = build_host_env(&self.config);
        let loopback: Vec<String> = env
            .values()
            .filter(|v| podmux_bridge::parse_loopback(v).is_some())
            .cloned()
            .collect();
        if loopback.is_empty() {
            return env;
        }
        self.bridge.ensure_for_base_urls(&loopback).await;
        for value in env.values_mut() {
            if podmux_bridge::parse_loopback(value).is_some() {
                *value = self.bridge.rewrite_for_host_gateway(value);
            }
        }
        env
    }

    async fn finish_start_after_admission(
        self: &Arc<Self>,
        workspace_id: &str,
        session_id: &str,
        key: &str,
        session: &mut Session,
    ) -> Result<(), SessionError> {
        let env = self.build_session_env().await;
        let backend = self
            .backend_factory
            .create(session_id, workspace_id, &env)
            .await?;
        self.backends.insert(session_id.to_string(), backend.clone());

        let active = ActiveSession::new(session.clone(), self.config.event_ring_capacity);
        self.registry.insert(key.to_string(), active);
        self.workspace_runtime.mark_session_ready(workspace_id, session_id);

        session.status = SessionStatus::Ready;
        session.last_activity = chrono::Utc::now();
        self.store.save_session(session).await?;

        self.registry
            .reset_idle_timer(key.to_string(), self.clone() as Arc<dyn IdleTimeoutHandler>);
        self.spawn_event_bridge(key.to_string(), session_id.to_string(), backend);
        self.spawn_bootstrap_session_state(key.to_string(), session_id.to_string());

        Ok(())
    }

    /// Schedules the post-start state sync (C8 step 3 / C9 bootstrap
    /// sequencing): query the backend's state snapshot, apply it, then
    /// re-apply a remembered thinking-level preference if it differs from
    /// what the snapshot reported.
    fn spawn_bootstrap_session_state(self: &Arc<Self>, key: String, session_id: String) {
        let this = self.clone();
        tokio::spawn(async move {
            this.bootstrap_session_state(&key, &session_id).await;
        });
    }

    async fn bootstrap_session_state(self: &Arc<Self>, key: &str, session_id: &str) {
        let Some(backend) = self.backends.get(session_id).map(|e| e.value().clone()) else {
            return;
        };
        let response = match backend.send_command(BackendCommand::GetStateSnapshot).await {
            Ok(response) => response,
            Err(err) => {
                warn!(session_id, %err, "bootstrap state snapshot failed");
                return;
            }
        };
        let snapshot: PiStateSnapshot = serde_json::from_value(response).unwrap_or_default();

        let Some(active_handle) = self.registry.get(key) else {
            return;
        };
        let model = {
            let mut active = active_handle.lock().await;
            apply_pi_state_snapshot(&mut active.session, &snapshot, &self.catalog);
            let _ = self.store.save_session(&active.session).await;
            active.session.model.clone()
        };

        if let Ok(Some(preferred)) = self.store.get_model_thinking_level_preference(&model).await {
            let current = active_handle.lock().await.session.thinking_level.clone();
            if current.as_deref() != Some(preferred.as_str()) {
                match backend
                    .send_command(BackendCommand::SetThinkingLevel { level: preferred.clone() })
                    .await
                {
                    Ok(response) => {
                        let mut active = active_handle.lock().await;
                        reconcile_thinking_level(&mut active.session, &response, Some(&preferred));
                        let _ = self.store.save_session(&active.session).await;
                    }
                    Err(err) => {
                        warn!(session_id, %err, "bootstrap thinking-level restore failed");
                    }
                }
            }
        }

        let snapshot = active_handle.lock().await.session.clone();
        self.registry
            .broadcast(key, ClientMessage::State { session: snapshot }.to_json())
            .await;
    }

    fn spawn_event_bridge(
        self: &Arc<Self>,
        key: String,
        session_id: String,
        backend: Arc<dyn AgentBackend>,
    ) {
        let mut rx = backend.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => this.handle_backend_event(&key, &session_id, event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ---- EventProcessor (C5) -------------------------------------------

    async fn handle_backend_event(self: &Arc<Self>, key: &str, session_id: &str, event: BackendEvent) {
        let Some(active_handle) = self.registry.get(key) else {
            return;
        };

        let (outcome, session_snapshot, finalize) = {
            let mut active = active_handle.lock().await;
            let outcome = EventProcessor::process(&mut active, &event);
            if let Some(status) = outcome.new_status {
                active.session.status = status;
            }
            let finalize = if outcome.finalize_pending_abort {
                Some(StopCoordinator::finish_pending_abort_with_success(&mut active))
            } else {
                None
            };
            (outcome, active.session.clone(), finalize)
        };

        if let Err(err) = self.store.save_session(&session_snapshot).await {
            warn!(session_id, %err, "failed to persist session after backend event");
        }

        for msg in &outcome.messages {
            self.registry.broadcast(key, msg.to_json()).await;
        }
        if outcome.broadcast_state {
            self.registry
                .broadcast(key, ClientMessage::State { session: session_snapshot.clone() }.to_json())
                .await;
        }
        if let Some(messages) = finalize {
            for msg in messages {
                self.registry.broadcast(key, msg.to_json()).await;
            }
            self.clear_stop_timer(key);
        }
        if outcome.schedule_git_status {
            self.schedule_git_status(session_snapshot.workspace_id.clone());
        }

        self.registry
            .reset_idle_timer(key.to_string(), self.clone() as Arc<dyn IdleTimeoutHandler>);
    }

    fn schedule_git_status(self: &Arc<Self>, workspace_id: String) {
        // `workspace_id` is the debounce key; one timer per workspace.
        let this = self.clone();
        let key_for_timer = workspace_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(GIT_STATUS_DEBOUNCE).await;
            this.flush_git_status(&key_for_timer).await;
        });
        if let Some(old) = self.git_timers.insert(workspace_id, handle) {
            old.abort();
        }
    }

    async fn flush_git_status(self: &Arc<Self>, workspace_id: &str) {
        let workspace = match self.store.get_workspace(workspace_id).await {
            Ok(Some(w)) => w,
            _ => return,
        };
        if workspace.host_mount.is_none() || !workspace.git_status_enabled {
            return;
        }
        let status = match self.git_status_provider.git_status(&workspace).await {
            Ok(s) => s,
            Err(err) => {
                warn!(workspace_id, %err, "git status lookup failed");
                return;
            }
        };
        for key in self.registry.keys() {
            let Some(active) = self.registry.get(&key) else { continue };
            let matches = active.lock().await.session.workspace_id == workspace_id;
            if matches {
                self.registry
                    .broadcast(
                        &key,
                        ClientMessage::GitStatus {
                            workspace_id: workspace_id.to_string(),
                            status: status.clone(),
                        }
                        .to_json(),
                    )
                    .await;
            }
        }
    }

    // ---- CommandCoordinator (C6) ----------------------------------------

    pub async fn send_fire_and_forget(&self, session_id: &str, cmd: BackendCommand) -> Result<(), SessionError> {
        let backend = self
            .backends
            .get(session_id)
            .map(|e| e.value().clone())
            .ok_or(SessionError::SessionNotActive)?;
        backend.send_command(cmd).await?;
        Ok(())
    }

    pub async fn forward_client_command(
        self: &Arc<Self>,
        key: &str,
        session_id: &str,
        cmd: BackendCommand,
        request_id: Option<String>,
    ) -> Result<(), SessionError> {
        let backend = self
            .backends
            .get(session_id)
            .map(|e| e.value().clone())
            .ok_or(SessionError::SessionNotActive)?;

        let command_label = command_label(&cmd);
        let request_thinking_level = match &cmd {
            BackendCommand::SetThinkingLevel { level } => Some(level.clone()),
            _ => None,
        };

        let result = backend.send_command(cmd.clone()).await;

        let (success, mut data, error) = match &result {
            Ok(response) => (true, Some(response.clone()), None),
            Err(err) => (false, None, Some(normalize_error(&err.to_string()))),
        };

        if let Some(response) = result.as_ref().ok().cloned() {
            self.reconcile(
                &backend,
                key,
                &cmd,
                &response,
                request_thinking_level.as_deref(),
                &mut data,
            )
            .await;
        }

        self.registry
            .broadcast(
                key,
                ClientMessage::CommandResult {
                    command: command_label.to_string(),
                    request_id,
                    success,
                    data,
                    error,
                }
                .to_json(),
            )
            .await;

        if changes_visible_session_fields(&cmd) || is_snapshot_command(&cmd) {
            if let Some(active) = self.registry.get(key) {
                let snapshot = active.lock().await.session.clone();
                self.registry
                    .broadcast(key, ClientMessage::State { session: snapshot }.to_json())
                    .await;
            }
        }

        result.map(|_| ()).map_err(SessionError::from)
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconcile(
        self: &Arc<Self>,
        backend: &Arc<dyn AgentBackend>,
        key: &str,
        cmd: &BackendCommand,
        response: &Value,
        request_thinking_level: Option<&str>,
        outgoing_data: &mut Option<Value>,
    ) {
        let Some(active_handle) = self.registry.get(key) else {
            return;
        };

        match cmd {
            BackendCommand::GetStateSnapshot
            | BackendCommand::Fork
            | BackendCommand::NewSession
            | BackendCommand::SwitchSession { .. } => {
                let snapshot: PiStateSnapshot = serde_json::from_value(response.clone()).unwrap_or_default();
                let mut active = active_handle.lock().await;
                apply_pi_state_snapshot(&mut active.session, &snapshot, &self.catalog);
                let _ = self.store.save_session(&active.session).await;
            }
            BackendCommand::SetThinkingLevel { .. } | BackendCommand::CycleThinkingLevel => {
                let mut active = active_handle.lock().await;
                if let Some(effective) = reconcile_thinking_level(&mut active.session, response, request_thinking_level) {
                    let model = active.session.model.clone();
                    let _ = self.store.set_model_thinking_level_preference(&model, &effective).await;
                    let _ = self.store.save_session(&active.session).await;
                }
            }
            BackendCommand::SetModel { .. } | BackendCommand::CycleModel => {
                if let Some((provider, id)) = extract_model_from_response(cmd, response) {
                    let (workspace_id, new_model) = {
                        let mut active = active_handle.lock().await;
                        let workspace_id = active.session.workspace_id.clone();
                        let Ok(Some(mut workspace)) = self.store.get_workspace(&workspace_id).await else {
                            return;
                        };
                        let new_model =
                            reconcile_model_change(&mut active.session, &mut workspace, &provider, &id, &self.catalog);
                        if new_model.is_some() {
                            let _ = self.store.save_workspace(&workspace).await;
                            let _ = self.store.save_session(&active.session).await;
                        }
                        (workspace_id, new_model)
                    };
                    let _ = workspace_id;

                    if let (Some(new_model), BackendCommand::CycleModel) = (&new_model, cmd) {
                        if let Ok(Some(preferred)) =
                            self.store.get_model_thinking_level_preference(new_model).await
                        {
                            let current = active_handle.lock().await.session.thinking_level.clone();
                            if current.as_deref() != Some(preferred.as_str()) {
                                if let Ok(refreshed) = backend
                                    .send_command(BackendCommand::SetThinkingLevel { level: preferred.clone() })
                                    .await
                                {
                                    let mut active = active_handle.lock().await;
                                    reconcile_thinking_level(&mut active.session, &refreshed, Some(&preferred));
                                    let _ = self.store.save_session(&active.session).await;
                                    if let Some(data) = outgoing_data.as_mut() {
                                        if let Some(obj) = data.as_object_mut() {
                                            obj.insert("thinkingLevel".to_string(), Value::String(preferred));
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
            BackendCommand::SetSessionName { name } => {
                let mut active = active_handle.lock().await;
                if reconcile_session_name(&mut active.session, response, Some(name.as_str())) {
                    let _ = self.store.save_session(&active.session).await;
                }
            }
            _ => {}
        }
    }

    // ---- StopCoordinator (C7) -------------------------------------------

    pub async fn begin_pending_stop(
        self: &Arc<Self>,
        key: &str,
        session_id: &str,
        mode: StopMode,
        source: StopSource,
    ) -> Result<(), SessionError> {
        let active_handle = self.registry.get(key).ok_or(SessionError::SessionNotActive)?;
        let messages = {
            let mut active = active_handle.lock().await;
            StopCoordinator::begin_pending_stop(&mut active, mode, source)?
        };
        for msg in messages {
            self.registry.broadcast(key, msg.to_json()).await;
        }
        self.broadcast_state(key).await;

        if mode == StopMode::Abort {
            self.send_fire_and_forget(session_id, BackendCommand::Abort).await.ok();
            self.send_fire_and_forget(session_id, BackendCommand::AbortBash).await.ok();
            self.schedule_abort_stop_timeout(key.to_string(), session_id.to_string(), false);
        }
        Ok(())
    }

    fn schedule_abort_stop_timeout(self: &Arc<Self>, key: String, session_id: String, is_retry: bool) {
        let this = self.clone();
        let timer_key = key.clone();
        let timeout = if is_retry {
            Duration::from_millis(self.config.stop_abort_retry_timeout_ms)
        } else {
            Duration::from_millis(self.config.stop_abort_timeout_ms)
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            this.on_abort_timeout(timer_key, session_id, is_retry).await;
        });
        if let Some(old) = self.stop_timers.insert(key, handle) {
            old.abort();
        }
    }

    async fn on_abort_timeout(self: &Arc<Self>, key: String, session_id: String, was_retry: bool) {
        let Some(active_handle) = self.registry.get(&key) else { return };
        let still_pending_abort = {
            let active = active_handle.lock().await;
            matches!(active.pending_stop.as_ref().map(|p| p.mode), Some(StopMode::Abort))
        };
        if !still_pending_abort {
            return;
        }

        if !was_retry {
            self.send_fire_and_forget(&session_id, BackendCommand::Abort).await.ok();
            self.send_fire_and_forget(&session_id, BackendCommand::AbortBash).await.ok();
            self.registry
                .broadcast(&key, ClientMessage::StopRequested { source: "user".into(), reason: None }.to_json())
                .await;
            self.schedule_abort_stop_timeout(key, session_id, true);
        } else {
            let messages = {
                let mut active = active_handle.lock().await;
                StopCoordinator::finish_pending_stop_with_failure(
                    &mut active,
                    "the agent may still be processing".to_string(),
                )
            };
            for msg in messages {
                self.registry.broadcast(&key, msg.to_json()).await;
            }
            self.broadcast_state(&key).await;
            self.stop_timers.remove(&key);
        }
    }

    pub async fn force_terminate_session_process(
        self: &Arc<Self>,
        key: &str,
        session_id: &str,
    ) -> Result<(), SessionError> {
        let active_handle = self.registry.get(key).ok_or(SessionError::SessionNotActive)?;

        let backend = self.backends.get(session_id).map(|e| e.value().clone());
        if let Some(backend) = &backend {
            backend
                .dispose()
                .await
                .map_err(|e| SessionError::ForceStopFailed(e.to_string()))?;
        }

        let messages = {
            let mut active = active_handle.lock().await;
            StopCoordinator::force_terminate_session_process(&mut active)
        };
        for msg in messages {
            self.registry.broadcast(key, msg.to_json()).await;
        }
        self.clear_stop_timer(key);
        self.backends.remove(session_id);
        self.registry.remove(key);
        Ok(())
    }

    fn clear_stop_timer(&self, key: &str) {
        if let Some((_, handle)) = self.stop_timers.remove(key) {
            handle.abort();
        }
    }

    async fn broadcast_state(&self, key: &str) {
        if let Some(active) = self.registry.get(key) {
            let snapshot = active.lock().await.session.clone();
            self.registry
                .broadcast(key, ClientMessage::State { session: snapshot }.to_json())
                .await;
        }
    }
}

#[async_trait]
impl IdleTimeoutHandler for SessionCoordinator {
    async fn on_idle_timeout(&self, key: &str) {
        let Some(active_handle) = self.registry.get(key) else { return };
        let session_id = active_handle.lock().await.session.session_id.clone();
        let backend = self.backends.get(&session_id).map(|e| e.value().clone());
        let messages = {
            let mut active = active_handle.lock().await;
            StopCoordinator::begin_pending_stop(&mut active, StopMode::Terminate, StopSource::Timeout)
        };
        if let Ok(messages) = messages {
            for msg in messages {
                self.registry.broadcast(key, msg.to_json()).await;
            }
            self.broadcast_state(key).await;
            if let Some(backend) = backend {
                let _ = backend.send_command(BackendCommand::Abort).await;
            }
        }
    }
}

fn is_snapshot_command(cmd: &BackendCommand) -> bool {
    matches!(
        cmd,
        BackendCommand::GetStateSnapshot
            | BackendCommand::Fork
            | BackendCommand::NewSession
            | BackendCommand::SwitchSession { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use podmux_backend::mock::{MockBackendFactory, MockGitStatusProvider, MockPermissionGate, MockSessionStore};
    use podmux_runtime::{ModelCatalog, Session, SessionRegistry, Workspace, WorkspaceRuntime};

    fn build_coordinator(config: Config) -> (Arc<SessionCoordinator>, Arc<MockSessionStore>, Arc<MockBackendFactory>) {
        let store = MockSessionStore::new();
        let workspace_runtime = Arc::new(WorkspaceRuntime::new(&config));
        let registry = Arc::new(SessionRegistry::new(config.session_idle_timeout_ms));
        let catalog = Arc::new(ModelCatalog::new());
        let gate = MockPermissionGate::new();
        let backend_factory = MockBackendFactory::new();
        let git_status_provider = MockGitStatusProvider::new();
        let bridge = Arc::new(LoopbackBridge::new("host.internal".to_string()));
        let coordinator = SessionCoordinator::new(
            config,
            workspace_runtime,
            registry,
            catalog,
            store.clone(),
            gate,
            backend_factory.clone(),
            git_status_provider,
            bridge,
        );
        (coordinator, store, backend_factory)
    }

    async fn seed_session(store: &MockSessionStore, session_id: &str, workspace_id: &str) {
        store
            .save_workspace(&Workspace::new(workspace_id.to_string(), "ws".to_string()))
            .await
            .unwrap();
        store
            .save_session(&Session::new(session_id.to_string(), workspace_id.to_string(), "s".to_string()))
            .await
            .unwrap();
    }

    /// A successful abort (the backend reports `agent_end` before the first
    /// retry timeout fires) clears the pending stop without escalating to a
    /// retry broadcast or a forced terminate.
    #[tokio::test(start_paused = true)]
    async fn abort_retry_succeeds_before_first_timeout() {
        let mut config = Config::default();
        config.stop_abort_timeout_ms = 1_000;
        config.stop_abort_retry_timeout_ms = 1_000;
        let (coordinator, store, backend_factory) = build_coordinator(config);

        seed_session(&store, "sess-1", "ws-1").await;
        coordinator
            .start_session("sess-1".to_string(), "sess-1".to_string(), None)
            .await
            .unwrap();

        coordinator
            .begin_pending_stop("sess-1", "sess-1", StopMode::Abort, StopSource::User)
            .await
            .unwrap();

        let backend = backend_factory.backend_for("sess-1").unwrap();
        backend.emit(BackendEvent::AgentEnd);
        tokio::time::sleep(Duration::from_millis(10)).await;

        tokio::time::advance(Duration::from_millis(1_500)).await;
        tokio::task::yield_now().await;

        assert!(coordinator.stop_timers.get("sess-1").is_none());
    }

    /// When the backend never reports completion, the abort timeout
    /// escalates once into a retry before the coordinator gives up.
    #[tokio::test(start_paused = true)]
    async fn abort_without_backend_response_escalates_to_retry() {
        let mut config = Config::default();
        config.stop_abort_timeout_ms = 1_000;
        config.stop_abort_retry_timeout_ms = 1_000;
        let (coordinator, store, _backend_factory) = build_coordinator(config);

        seed_session(&store, "sess-2", "ws-2").await;
        coordinator
            .start_session("sess-2".to_string(), "sess-2".to_string(), None)
            .await
            .unwrap();

        coordinator
            .begin_pending_stop("sess-2", "sess-2", StopMode::Abort, StopSource::User)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(1_100)).await;
        tokio::task::yield_now().await;
        assert!(coordinator.stop_timers.get("sess-2").is_some(), "expected a retry timer to be scheduled");

        tokio::time::advance(Duration::from_millis(1_100)).await;
        tokio::task::yield_now().await;
        assert!(coordinator.stop_timers.get("sess-2").is_none());
    }
}

fn command_label(cmd: &BackendCommand) -> &'static str {
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
        BackendCommand::GetStateSnapshot => "get_state",
        BackendCommand::GetMessages => "get_messages",
        BackendCommand::GetSessionStats => "get_session_stats",
        BackendCommand::Dispose => "dispose",
    }
}
