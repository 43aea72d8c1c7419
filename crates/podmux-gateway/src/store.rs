// SPDX-License-Identifier: Apache-2.0

//! File-backed `SessionStore`: one YAML file per session/workspace record,
//! plus a single YAML map for remembered thinking-level preferences.
//!
//! Same atomic-write-with-mode pattern used for the bearer token file in
//! `auth` (serialize to YAML, write via a mode-restricted `OpenOptions`),
//! generalized from "one secret" to "one record per session/workspace id".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use podmux_backend::{SessionStore, StoreError};
use podmux_runtime::{Session, Workspace};
use tokio::sync::Mutex;

pub struct FileSessionStore {
    sessions_dir: PathBuf,
    workspaces_dir: PathBuf,
    prefs_path: PathBuf,
    prefs_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(root: &Path) -> std::io::Result<Self> {
        let sessions_dir = root.join("sessions");
        let workspaces_dir = root.join("workspaces");
        std::fs::create_dir_all(&sessions_dir)?;
        std::fs::create_dir_all(&workspaces_dir)?;
        Ok(Self {
            sessions_dir,
            workspaces_dir,
            prefs_path: root.join("model_thinking_prefs.yaml"),
            prefs_lock: Mutex::new(()),
        })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.yaml"))
    }

    fn workspace_path(&self, workspace_id: &str) -> PathBuf {
        self.workspaces_dir.join(format!("{workspace_id}.yaml"))
    }

    fn read_prefs(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.prefs_path.is_file() {
            return Ok(HashMap::new());
        }
        let text = std::fs::read_to_string(&self.prefs_path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_yaml::from_str(&text).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn write_prefs(&self, prefs: &HashMap<String, String>) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(prefs).map_err(|e| StoreError::Io(e.to_string()))?;
        write_record_file(&self.prefs_path, yaml.as_bytes()).map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let path = self.session_path(session_id);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        let session = serde_yaml::from_str(&text).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Some(session))
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.session_path(&session.session_id);
        let yaml = serde_yaml::to_string(session).map_err(|e| StoreError::Io(e.to_string()))?;
        write_record_file(&path, yaml.as_bytes()).map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn list_sessions(&self, workspace_id: &str) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .list_all_sessions()
            .await?
            .into_iter()
            .filter(|s| s.workspace_id == workspace_id)
            .collect())
    }

    async fn list_all_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions = Vec::new();
        let entries = std::fs::read_dir(&self.sessions_dir).map_err(|e| StoreError::Io(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let text = std::fs::read_to_string(entry.path()).map_err(|e| StoreError::Io(e.to_string()))?;
            let session: Session = serde_yaml::from_str(&text).map_err(|e| StoreError::Io(e.to_string()))?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    async fn get_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>, StoreError> {
        let path = self.workspace_path(workspace_id);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        let workspace = serde_yaml::from_str(&text).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Some(workspace))
    }

    async fn save_workspace(&self, workspace: &Workspace) -> Result<(), StoreError> {
        let path = self.workspace_path(&workspace.id);
        let yaml = serde_yaml::to_string(workspace).map_err(|e| StoreError::Io(e.to_string()))?;
        write_record_file(&path, yaml.as_bytes()).map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn get_model_thinking_level_preference(
        &self,
        model_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let _guard = self.prefs_lock.lock().await;
        Ok(self.read_prefs()?.get(model_id).cloned())
    }

    async fn set_model_thinking_level_preference(
        &self,
        model_id: &str,
        level: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.prefs_lock.lock().await;
        let mut prefs = self.read_prefs()?;
        prefs.insert(model_id.to_string(), level.to_string());
        self.write_prefs(&prefs)
    }
}

fn write_record_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        f.write_all(data)
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        let session = Session::new("s1".into(), "w1".into(), "n".into());
        store.save_session(&session).await.unwrap();
        let fetched = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(fetched.session_id, "s1");
    }

    #[tokio::test]
    async fn missing_session_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        assert!(store.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_sessions_filters_by_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        store.save_session(&Session::new("a".into(), "w1".into(), "n".into())).await.unwrap();
        store.save_session(&Session::new("b".into(), "w2".into(), "n".into())).await.unwrap();
        let sessions = store.list_sessions("w1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "a");
    }

    #[tokio::test]
    async fn thinking_level_preference_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        assert!(store.get_model_thinking_level_preference("anthropic/opus-4").await.unwrap().is_none());
        store
            .set_model_thinking_level_preference("anthropic/opus-4", "high")
            .await
            .unwrap();
        assert_eq!(
            store.get_model_thinking_level_preference("anthropic/opus-4").await.unwrap(),
            Some("high".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn session_file_is_mode_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        store.save_session(&Session::new("s1".into(), "w1".into(), "n".into())).await.unwrap();
        let meta = std::fs::metadata(dir.path().join("sessions/s1.yaml")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
