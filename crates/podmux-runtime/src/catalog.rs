// SPDX-License-Identifier: Apache-2.0

//! Model catalog: tolerant `modelId -> contextWindow` resolution, and the
//! canonical-id / snapshot-merge helpers that support session bootstrap.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::data::{Session, DEFAULT_CONTEXT_WINDOW};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Canonical `provider/id`.
    pub id: String,
    pub name: String,
    pub context_window: u32,
}

/// Holds the current model list plus the timestamp of the last refresh.
pub struct ModelCatalog {
    state: RwLock<CatalogState>,
}

struct CatalogState {
    models: Vec<ModelInfo>,
    updated_at: DateTime<Utc>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState {
                models: Vec::new(),
                updated_at: Utc::now(),
            }),
        }
    }

    /// Replace the catalog with `models`, deduplicated by canonical id and
    /// defaulting any missing context window to [`DEFAULT_CONTEXT_WINDOW`].
    /// `models` should already be filtered by the caller to prefer entries
    /// with available credentials, falling back to the full registered set.
    pub fn refresh(&self, models: Vec<ModelInfo>) {
        let mut seen = std::collections::HashSet::new();
        let mut deduped = Vec::new();
        for mut m in models {
            if m.context_window == 0 {
                m.context_window = DEFAULT_CONTEXT_WINDOW;
            }
            if seen.insert(m.id.clone()) {
                deduped.push(m);
            }
        }
        let mut state = self.state.write().unwrap();
        state.models = deduped;
        state.updated_at = Utc::now();
    }

    pub fn get_all(&self) -> Vec<ModelInfo> {
        self.state.read().unwrap().models.clone()
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        self.state.read().unwrap().updated_at
    }

    pub fn get_context_window(&self, model_id: &str) -> u32 {
        let models = self.state.read().unwrap();
        resolve_context_window(&models.models, model_id)
    }

    /// Set `session.context_window` if missing/nonpositive, or heal it when
    /// it is still the default fallback and a better resolution exists.
    /// Returns `true` if the session was changed.
    pub fn ensure_session_context_window(&self, session: &mut Session) -> bool {
        let resolved = self.get_context_window(&session.model);
        if session.context_window == 0 {
            session.context_window = resolved;
            return true;
        }
        if session.context_window == DEFAULT_CONTEXT_WINDOW && resolved != DEFAULT_CONTEXT_WINDOW {
            session.context_window = resolved;
            return true;
        }
        false
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn trailing_k_group() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{2,4})[kK]\b").unwrap())
}

fn resolve_context_window(models: &[ModelInfo], model_id: &str) -> u32 {
    if model_id.is_empty() {
        return DEFAULT_CONTEXT_WINDOW;
    }

    let tail = model_id.rsplit('/').next().unwrap_or(model_id).to_string();
    let candidates = [model_id.to_string(), tail.clone()];
    let normalized_candidates: Vec<String> = candidates.iter().map(|c| normalize(c)).collect();

    for m in models {
        if candidates.iter().any(|c| c == &m.id || c == &m.name) {
            return m.context_window;
        }
    }
    for m in models {
        if candidates
            .iter()
            .any(|c| m.id.ends_with(&format!("/{c}")))
        {
            return m.context_window;
        }
    }
    for m in models {
        let norm_id = normalize(&m.id);
        let norm_name = normalize(&m.name);
        let norm_tail = normalize(&tail);
        if normalized_candidates
            .iter()
            .any(|c| *c == norm_id || *c == norm_name || *c == norm_tail)
        {
            return m.context_window;
        }
    }

    if let Some(caps) = trailing_k_group().captures(model_id) {
        if let Ok(n) = caps[1].parse::<u32>() {
            return n * 1_000;
        }
    }

    DEFAULT_CONTEXT_WINDOW
}

/// Returns `id` unchanged if it already begins with `<provider>/`, else
/// prefixes it. Handles nested providers (`openrouter/z.ai/glm-5`).
pub fn compose_model_id(provider: &str, id: &str) -> String {
    let prefix = format!("{provider}/");
    if id.starts_with(&prefix) {
        id.to_string()
    } else {
        format!("{prefix}{id}")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PiStateSnapshot {
    pub session_file: Option<String>,
    pub session_files: Option<Vec<String>>,
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    pub model: Option<String>,
    pub thinking_level: Option<String>,
}

/// Merge a backend state snapshot into `session`, per the guards described
/// in the canonical-model-id design note.
pub fn apply_pi_state_snapshot(session: &mut Session, snapshot: &PiStateSnapshot, catalog: &ModelCatalog) {
    if let Some(file) = &snapshot.session_file {
        session.record_pi_session_file(file.clone());
    }
    if let Some(files) = &snapshot.session_files {
        for f in files {
            session.record_pi_session_file(f.clone());
        }
    }
    if let Some(id) = &snapshot.session_id {
        session.pi_session_id = Some(id.clone());
    }
    if let Some(name) = &snapshot.session_name {
        session.name = name.clone();
    }

    if let Some(candidate) = &snapshot.model {
        let candidate_window = catalog.get_context_window(candidate);
        let existing_window = catalog.get_context_window(&session.model);
        let candidate_is_suspect_downgrade =
            candidate_window == DEFAULT_CONTEXT_WINDOW && existing_window != DEFAULT_CONTEXT_WINDOW;

        if !candidate_is_suspect_downgrade {
            session.model = candidate.clone();
            let resolved = catalog.get_context_window(&session.model);
            let should_update = resolved != session.context_window
                && (resolved != DEFAULT_CONTEXT_WINDOW
                    || session.context_window == 0
                    || session.context_window == DEFAULT_CONTEXT_WINDOW);
            if should_update {
                session.context_window = resolved;
            }
        }
    }

    // The in-memory session field tracks what the backend reports, but the
    // remembered preference in storage is never overwritten from a snapshot
    // — that would clobber a user's stored choice with a factory default.
    if let Some(level) = &snapshot.thinking_level {
        session.thinking_level = Some(level.clone());
    }
}
