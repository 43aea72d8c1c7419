// SPDX-License-Identifier: Apache-2.0

//! CommandCoordinator (C6): client command dispatch and response
//! reconciliation. The backend call itself is made by the owning
//! coordinator; this module holds the pure reconciliation logic applied to
//! the backend's response.

use podmux_backend::{BackendCommand, BackendResponse};
use podmux_runtime::{compose_model_id, ModelCatalog, Session, Workspace};
use serde_json::Value;

/// Visible-field-changing commands also get a `state` broadcast alongside
/// `command_result`.
pub fn changes_visible_session_fields(cmd: &BackendCommand) -> bool {
    matches!(
        cmd,
        BackendCommand::SetModel { .. }
            | BackendCommand::CycleModel
            | BackendCommand::SetThinkingLevel { .. }
            | BackendCommand::CycleThinkingLevel
            | BackendCommand::SetSessionName { .. }
    )
}

/// Extract `{provider, id}` from a `set_model`/`cycle_model` response.
/// `cycle_model` nests the pair under a `model` object.
pub fn extract_model_from_response(cmd: &BackendCommand, response: &BackendResponse) -> Option<(String, String)> {
    let obj = match cmd {
        BackendCommand::SetModel { .. } => response,
        BackendCommand::CycleModel => response.get("model")?,
        _ => return None,
    };
    let provider = obj.get("provider")?.as_str()?.to_string();
    let id = obj.get("id")?.as_str()?.to_string();
    Some((provider, id))
}

/// Compose the canonical id, and if it differs from the session's current
/// model, update `session` and `workspace.last_used_model`. Returns the new
/// canonical id if it changed.
pub fn reconcile_model_change(
    session: &mut Session,
    workspace: &mut Workspace,
    provider: &str,
    id: &str,
    catalog: &ModelCatalog,
) -> Option<String> {
    let canonical = compose_model_id(provider, id);
    if canonical == session.model {
        return None;
    }
    session.model = canonical.clone();
    session.context_window = catalog.get_context_window(&canonical);
    workspace.last_used_model = Some(canonical.clone());
    Some(canonical)
}

/// `set_thinking_level`/`cycle_thinking_level`: effective level is the
/// response's level, falling back to the request's.
pub fn reconcile_thinking_level(
    session: &mut Session,
    response: &BackendResponse,
    request_level: Option<&str>,
) -> Option<String> {
    let effective = response
        .get("level")
        .and_then(Value::as_str)
        .or(request_level)?;
    session.thinking_level = Some(effective.to_string());
    Some(effective.to_string())
}

/// `set_session_name`: use the response's name, falling back to the
/// request's; applied only if nonempty and different.
pub fn reconcile_session_name(
    session: &mut Session,
    response: &BackendResponse,
    request_name: Option<&str>,
) -> bool {
    let name = response
        .get("name")
        .and_then(Value::as_str)
        .or(request_name);
    match name {
        Some(n) if !n.is_empty() && n != session.name => {
            session.name = n.to_string();
            true
        }
        _ => false,
    }
}

/// Normalizes a raw backend error into a user-readable message, keeping
/// known error kinds legible and collapsing everything else to a generic
/// message so internal details never leak to the client.
pub fn normalize_error(raw: &str) -> String {
    const KNOWN_KINDS: &[&str] = &[
        "Command not allowed",
        "Session not active",
        "Unhandled SDK command",
        "Stop timed out",
        "Force stop failed",
    ];
    if KNOWN_KINDS.iter().any(|k| raw.contains(k)) {
        raw.to_string()
    } else {
        "the command could not be completed".to_string()
    }
}
