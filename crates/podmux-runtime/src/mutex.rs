// SPDX-License-Identifier: Apache-2.0

//! Fair FIFO async locking and workspace/session slot admission.
//!
//! `tokio::sync::Mutex` already wakes waiters in arrival order, so it is used
//! directly as the fair lock primitive; this module adds the lazy
//! per-key lock map and the slot-admission bookkeeping layered on top of it.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use podmux_config::Config;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("SESSION_ALREADY_RESERVED")]
    SessionAlreadyReserved,
    #[error("SESSION_LIMIT_WORKSPACE")]
    SessionLimitWorkspace,
    #[error("SESSION_LIMIT_GLOBAL")]
    SessionLimitGlobal,
}

/// Per-workspace and per-session lock maps plus admission-slot tracking.
pub struct WorkspaceRuntime {
    session_locks: DashMap<String, Arc<Mutex<()>>>,
    workspace_locks: DashMap<String, Arc<Mutex<()>>>,
    workspace_slots: DashMap<String, HashSet<String>>,
    max_sessions_per_workspace: u32,
    max_sessions_global: u32,
}

impl WorkspaceRuntime {
    pub fn new(config: &Config) -> Self {
        Self {
            session_locks: DashMap::new(),
            workspace_locks: DashMap::new(),
            workspace_slots: DashMap::new(),
            max_sessions_per_workspace: config.max_sessions_per_workspace,
            max_sessions_global: config.max_sessions_global,
        }
    }

    fn lock_for(map: &DashMap<String, Arc<Mutex<()>>>, key: &str) -> Arc<Mutex<()>> {
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the per-session lock, run `f` while holding it, release on
    /// return or panic-unwind (the guard's `Drop` always runs).
    pub async fn with_session_lock<F, Fut, T>(&self, session_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = Self::lock_for(&self.session_locks, session_id);
        let _guard = lock.lock().await;
        f().await
    }

    /// Acquire the per-workspace lock, run `f` while holding it.
    pub async fn with_workspace_lock<F, Fut, T>(&self, workspace_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = Self::lock_for(&self.workspace_locks, workspace_id);
        let _guard = lock.lock().await;
        f().await
    }

    /// Must be called while holding the workspace lock for `workspace_id`.
    pub fn reserve_session_start(
        &self,
        workspace_id: &str,
        session_id: &str,
    ) -> Result<(), AdmissionError> {
        {
            let slots = self
                .workspace_slots
                .entry(workspace_id.to_string())
                .or_insert_with(HashSet::new);

            if slots.contains(session_id) {
                return Err(AdmissionError::SessionAlreadyReserved);
            }
            if slots.len() as u32 >= self.max_sessions_per_workspace {
                return Err(AdmissionError::SessionLimitWorkspace);
            }
        }
        // Entry guard above is dropped before this call: global_session_count
        // iterates every shard, including the one just held, and DashMap's
        // RwLock is not reentrant.
        if self.global_session_count() as u32 >= self.max_sessions_global {
            return Err(AdmissionError::SessionLimitGlobal);
        }

        self.workspace_slots
            .entry(workspace_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(session_id.to_string());
        Ok(())
    }

    /// Reserved for instrumentation; currently a no-op.
    pub fn mark_session_ready(&self, _workspace_id: &str, _session_id: &str) {}

    /// Idempotent: removes `session_id` from the workspace's slot set,
    /// deleting the set entirely once it is empty.
    pub fn release_session(&self, workspace_id: &str, session_id: &str) {
        let mut remove_entry = false;
        if let Some(mut slots) = self.workspace_slots.get_mut(workspace_id) {
            slots.remove(session_id);
            remove_entry = slots.is_empty();
        }
        if remove_entry {
            self.workspace_slots.remove(workspace_id);
        }
    }

    pub fn get_workspace_session_count(&self, workspace_id: &str) -> usize {
        self.workspace_slots
            .get(workspace_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn global_session_count(&self) -> usize {
        self.workspace_slots.iter().map(|e| e.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(per_ws: u32, global: u32) -> WorkspaceRuntime {
        let mut config = Config::default();
        config.max_sessions_per_workspace = per_ws;
        config.max_sessions_global = global;
        WorkspaceRuntime::new(&config)
    }

    #[test]
    fn admission_scenario_per_workspace_cap() {
        let rt = runtime(2, 10);
        rt.reserve_session_start("wsA", "s1").unwrap();
        rt.reserve_session_start("wsA", "s2").unwrap();
        assert_eq!(
            rt.reserve_session_start("wsA", "s3"),
            Err(AdmissionError::SessionLimitWorkspace)
        );
        rt.release_session("wsA", "s1");
        rt.reserve_session_start("wsA", "s3").unwrap();
    }

    #[test]
    fn admission_scenario_global_cap() {
        let rt = runtime(10, 3);
        rt.reserve_session_start("wsA", "s1").unwrap();
        rt.reserve_session_start("wsB", "s1").unwrap();
        rt.reserve_session_start("wsC", "s1").unwrap();
        assert_eq!(
            rt.reserve_session_start("wsA", "s2"),
            Err(AdmissionError::SessionLimitGlobal)
        );
    }

    #[test]
    fn duplicate_reservation_rejected_without_mutating_slots() {
        let rt = runtime(5, 5);
        rt.reserve_session_start("wsA", "s1").unwrap();
        let before = rt.get_workspace_session_count("wsA");
        assert_eq!(
            rt.reserve_session_start("wsA", "s1"),
            Err(AdmissionError::SessionAlreadyReserved)
        );
        assert_eq!(rt.get_workspace_session_count("wsA"), before);
    }

    #[test]
    fn failed_reservation_leaves_counts_unchanged() {
        let rt = runtime(1, 10);
        rt.reserve_session_start("wsA", "s1").unwrap();
        let before_ws = rt.get_workspace_session_count("wsA");
        let before_global = rt.global_session_count();
        assert!(rt.reserve_session_start("wsA", "s2").is_err());
        assert_eq!(rt.get_workspace_session_count("wsA"), before_ws);
        assert_eq!(rt.global_session_count(), before_global);
    }

    #[test]
    fn release_is_idempotent() {
        let rt = runtime(5, 5);
        rt.reserve_session_start("wsA", "s1").unwrap();
        rt.release_session("wsA", "s1");
        rt.release_session("wsA", "s1");
        assert_eq!(rt.get_workspace_session_count("wsA"), 0);
    }

    #[tokio::test]
    async fn session_lock_serializes_concurrent_callers() {
        let rt = Arc::new(runtime(5, 5));
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let rt = rt.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                rt.with_session_lock("s1", || async move {
                    order.lock().await.push(i);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(order.lock().await.len(), 5);
    }
}
