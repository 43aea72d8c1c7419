// SPDX-License-Identifier: Apache-2.0

//! Session registry: the `key -> ActiveSession` map, broadcaster, and
//! idle-timeout scheduling.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::data::ActiveSession;

/// Invoked when a session's idle timer fires. Implemented by the stop
/// coordinator, which lives in a higher-level crate; kept as a trait here
/// to avoid a dependency on that crate.
#[async_trait::async_trait]
pub trait IdleTimeoutHandler: Send + Sync {
    async fn on_idle_timeout(&self, key: &str);
}

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<ActiveSession>>>,
    idle_timers: DashMap<String, JoinHandle<()>>,
    idle_timeout_ms: u64,
}

impl SessionRegistry {
    pub fn new(idle_timeout_ms: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timers: DashMap::new(),
            idle_timeout_ms,
        }
    }

    pub fn insert(&self, key: String, active: ActiveSession) {
        self.sessions.insert(key, Arc::new(Mutex::new(active)));
    }

    pub fn get(&self, key: &str) -> Option<Arc<Mutex<ActiveSession>>> {
        self.sessions.get(key).map(|e| e.value().clone())
    }

    pub fn remove(&self, key: &str) {
        self.sessions.remove(key);
        if let Some((_, handle)) = self.idle_timers.remove(key) {
            handle.abort();
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Fan out `msg` to every subscriber of `key`. A missing key is a no-op.
    pub async fn broadcast(&self, key: &str, msg: serde_json::Value) {
        if let Some(active) = self.get(key) {
            active.lock().await.broadcast(msg);
        }
    }

    /// Reschedule an absolute idle timeout since now; fires `handler` once,
    /// dropping a previously scheduled timer for the same key.
    pub fn reset_idle_timer(&self, key: String, handler: Arc<dyn IdleTimeoutHandler>) {
        let timeout_ms = self.idle_timeout_ms;
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(timeout_ms)).await;
            handler.on_idle_timeout(&task_key).await;
        });
        if let Some(old) = self.idle_timers.insert(key, handle) {
            old.abort();
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Session;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl IdleTimeoutHandler for CountingHandler {
        async fn on_idle_timeout(&self, _key: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn broadcast_to_missing_key_is_noop() {
        let registry = SessionRegistry::new(600_000);
        registry.broadcast("missing", serde_json::json!({"x": 1})).await;
    }

    #[tokio::test]
    async fn insert_get_remove_roundtrip() {
        let registry = SessionRegistry::new(600_000);
        let session = Session::new("s1".into(), "w1".into(), "n".into());
        registry.insert("s1".into(), ActiveSession::new(session, 16));
        assert!(registry.get("s1").is_some());
        registry.remove("s1");
        assert!(registry.get("s1").is_none());
    }

    #[tokio::test]
    async fn broadcast_delivers_to_subscriber() {
        let registry = SessionRegistry::new(600_000);
        let session = Session::new("s1".into(), "w1".into(), "n".into());
        registry.insert("s1".into(), ActiveSession::new(session, 16));

        let active = registry.get("s1").unwrap();
        let mut rx = {
            let mut guard = active.lock().await;
            guard.subscribe().1
        };

        registry.broadcast("s1", serde_json::json!({"type": "ping"})).await;
        assert_eq!(rx.recv().await, Some(serde_json::json!({"type": "ping"})));
    }
}
