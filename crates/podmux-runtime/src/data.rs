// SPDX-License-Identifier: Apache-2.0

//! Persisted and in-memory data model: sessions, workspaces, pending stops.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTEXT_WINDOW: u32 = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Ready,
    Busy,
    Stopping,
    Ended,
}

/// Durable session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub workspace_id: String,
    pub name: String,
    pub status: SessionStatus,
    /// Canonical `provider/modelId`; empty string means unset.
    pub model: String,
    pub thinking_level: Option<String>,
    pub context_window: u32,
    pub pi_session_file: Option<String>,
    /// Insertion-ordered set of backend session files.
    pub pi_session_files: Vec<String>,
    pub pi_session_id: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub change_stats: ChangeStats,
}

impl Session {
    pub fn new(session_id: String, workspace_id: String, name: String) -> Self {
        Self {
            session_id,
            workspace_id,
            name,
            status: SessionStatus::Ready,
            model: String::new(),
            thinking_level: None,
            context_window: DEFAULT_CONTEXT_WINDOW,
            pi_session_file: None,
            pi_session_files: Vec::new(),
            pi_session_id: None,
            last_activity: Utc::now(),
            change_stats: ChangeStats::default(),
        }
    }

    /// Insert `file` into `pi_session_files`, preserving insertion order and uniqueness.
    pub fn record_pi_session_file(&mut self, file: String) {
        if !self.pi_session_files.contains(&file) {
            self.pi_session_files.push(file.clone());
        }
        self.pi_session_file = Some(file);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeStats {
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

/// Durable workspace record; a container for sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: Option<String>,
    pub host_mount: Option<String>,
    pub skills: Vec<String>,
    pub memory_enabled: bool,
    pub memory_namespace: Option<String>,
    pub git_status_enabled: bool,
    pub last_used_model: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            description: String::new(),
            system_prompt: None,
            host_mount: None,
            skills: Vec::new(),
            memory_enabled: false,
            memory_namespace: None,
            git_status_enabled: false,
            last_used_model: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    Abort,
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSource {
    User,
    Timeout,
    Server,
}

/// Tracks an in-progress stop episode on a session.
#[derive(Debug, Clone)]
pub struct PendingStop {
    pub mode: StopMode,
    pub source: StopSource,
    pub requested_at: DateTime<Utc>,
    pub previous_status: SessionStatus,
}

impl PendingStop {
    pub fn new(mode: StopMode, source: StopSource, previous_status: SessionStatus) -> Self {
        Self {
            mode,
            source,
            requested_at: Utc::now(),
            previous_status,
        }
    }
}

/// Bounded ring of recent event messages, replayed to subscribers that
/// reconnect mid-session. Each entry is tagged with the `seq` it was
/// broadcast at so a reconnecting subscriber can ask for everything strictly
/// after the cursor it last saw.
#[derive(Debug, Clone)]
pub struct EventRing {
    capacity: usize,
    buf: VecDeque<(u64, serde_json::Value)>,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, seq: u64, event: serde_json::Value) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back((seq, event));
    }

    pub fn snapshot(&self) -> Vec<serde_json::Value> {
        self.buf.iter().map(|(_, v)| v.clone()).collect()
    }

    /// Events strictly newer than `since_seq`, oldest first. If `since_seq`
    /// predates everything still buffered, returns the whole buffer — the
    /// caller has no way to know what it missed beyond the ring's capacity.
    pub fn replay_since(&self, since_seq: u64) -> Vec<serde_json::Value> {
        self.buf
            .iter()
            .filter(|(seq, _)| *seq > since_seq)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// In-memory projection of a running session. Owned exclusively by the
/// session registry; subscribers hold only a sink handle.
pub struct ActiveSession {
    pub session: Session,
    pub subscribers: HashMap<u64, tokio::sync::mpsc::UnboundedSender<serde_json::Value>>,
    pub pending_ui_requests: HashMap<String, serde_json::Value>,
    pub partial_results: HashMap<String, String>,
    pub streamed_assistant_text: String,
    pub has_streamed_thinking: bool,
    pub turn_dedupe: HashSet<String>,
    pub event_ring: EventRing,
    pub seq: u64,
    pub pending_stop: Option<PendingStop>,
    next_subscriber_id: u64,
}

impl ActiveSession {
    pub fn new(session: Session, event_ring_capacity: usize) -> Self {
        Self {
            session,
            subscribers: HashMap::new(),
            pending_ui_requests: HashMap::new(),
            partial_results: HashMap::new(),
            streamed_assistant_text: String::new(),
            has_streamed_thinking: false,
            turn_dedupe: HashSet::new(),
            event_ring: EventRing::new(event_ring_capacity),
            seq: 0,
            pending_stop: None,
            next_subscriber_id: 0,
        }
    }

    pub fn subscribe(&mut self) -> (u64, tokio::sync::mpsc::UnboundedReceiver<serde_json::Value>) {
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        (id, rx)
    }

    /// Subscribe and, if `since_seq` is given, immediately replay buffered
    /// ring events newer than that cursor before the channel starts carrying
    /// live traffic.
    pub fn subscribe_from(
        &mut self,
        since_seq: Option<u64>,
    ) -> (u64, Vec<serde_json::Value>, tokio::sync::mpsc::UnboundedReceiver<serde_json::Value>) {
        let replay = since_seq.map(|s| self.event_ring.replay_since(s)).unwrap_or_default();
        let (id, rx) = self.subscribe();
        (id, replay, rx)
    }

    pub fn unsubscribe(&mut self, id: u64) {
        self.subscribers.remove(&id);
    }

    /// Fan out `msg` to every live subscriber; a dead subscriber is pruned
    /// without affecting delivery to the others.
    pub fn broadcast(&mut self, msg: serde_json::Value) {
        self.seq += 1;
        self.event_ring.push(self.seq, msg.clone());
        self.subscribers.retain(|_, tx| tx.send(msg.clone()).is_ok());
    }
}
