// SPDX-License-Identifier: Apache-2.0

//! EventProcessor (C5): translates backend events into client messages and
//! applies their side effects to an `ActiveSession`.

use podmux_backend::BackendEvent;
use podmux_runtime::{ActiveSession, StopMode};
use podmux_runtime::SessionStatus;

use crate::messages::ClientMessage;

const STATUS_BROADCAST_EVENTS: &[&str] =
    &["agent_start", "agent_end", "message_end", "tool_execution_start"];

const FIRE_AND_FORGET_UI_METHODS: &[&str] =
    &["notify", "setStatus", "setWidget", "setTitle", "set_editor_text"];

const CHANGE_STAT_TOOLS: &[&str] = &["edit", "write", "bash"];

/// What the caller (the session coordinator) must do after `EventProcessor`
/// has translated one event.
pub struct EventOutcome {
    pub messages: Vec<ClientMessage>,
    pub new_status: Option<SessionStatus>,
    pub broadcast_state: bool,
    pub persist_now: bool,
    pub schedule_git_status: bool,
    pub finalize_pending_abort: bool,
}

impl EventOutcome {
    fn empty() -> Self {
        Self {
            messages: Vec::new(),
            new_status: None,
            broadcast_state: false,
            persist_now: false,
            schedule_git_status: false,
            finalize_pending_abort: false,
        }
    }
}

pub struct EventProcessor;

impl EventProcessor {
    /// Pure-ish translation: mutates only the accumulator-style fields on
    /// `active` (turn dedupe, change stats, pending UI requests); status and
    /// persistence transitions are returned for the caller to apply, since
    /// those also need the owning `Session` record and storage adapter.
    pub fn process(active: &mut ActiveSession, event: &BackendEvent) -> EventOutcome {
        let mut outcome = EventOutcome::empty();
        outcome.broadcast_state = STATUS_BROADCAST_EVENTS.contains(&event.type_name());

        match event {
            BackendEvent::AgentStart => {
                if active.session.status != SessionStatus::Stopping {
                    outcome.new_status = Some(SessionStatus::Busy);
                }
            }
            BackendEvent::AgentEnd => {
                let pending_mode = active.pending_stop.as_ref().map(|p| p.mode);
                outcome.new_status = Some(match pending_mode {
                    Some(StopMode::Terminate) => SessionStatus::Stopping,
                    _ => SessionStatus::Ready,
                });
                outcome.persist_now = true;
                outcome.finalize_pending_abort = pending_mode == Some(StopMode::Abort);
            }
            BackendEvent::TurnStart { turn_id } => {
                // Dedupe gate: a duplicate turn-start within the same
                // episode produces no further side effect.
                active.turn_dedupe.insert(turn_id.clone());
            }
            BackendEvent::TurnEnd { turn_id } => {
                active.turn_dedupe.remove(turn_id);
            }
            BackendEvent::ToolExecutionStart { tool_name, args } => {
                apply_change_stats(active, tool_name, args);
                outcome.schedule_git_status = CHANGE_STAT_TOOLS.contains(&tool_name.as_str());
            }
            BackendEvent::ToolExecutionEnd { .. } => {}
            BackendEvent::MessageEnd { role, content, .. } => {
                if role == "assistant" || role == "user" {
                    outcome.messages.push(ClientMessage::MessageEnd {
                        role: role.clone(),
                        content: content.clone(),
                    });
                }
            }
            BackendEvent::ExtensionUiRequest { id, method, payload } => {
                if FIRE_AND_FORGET_UI_METHODS.contains(&method.as_str()) {
                    outcome.messages.push(ClientMessage::ExtensionUiNotification {
                        method: method.clone(),
                        payload: payload.clone(),
                    });
                } else {
                    active.pending_ui_requests.insert(id.clone(), payload.clone());
                    outcome.messages.push(ClientMessage::ExtensionUiRequest {
                        id: id.clone(),
                        method: method.clone(),
                        payload: payload.clone(),
                    });
                }
            }
            BackendEvent::AutoCompactionStart
            | BackendEvent::AutoCompactionEnd
            | BackendEvent::AutoRetryStart
            | BackendEvent::AutoRetryEnd
            | BackendEvent::Other { .. } => {}
        }

        active.session.last_activity = chrono::Utc::now();
        outcome
    }
}

fn apply_change_stats(active: &mut ActiveSession, tool_name: &str, args: &serde_json::Value) {
    if tool_name != "edit" && tool_name != "write" {
        return;
    }
    let insertions = args.get("insertions").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let deletions = args.get("deletions").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    active.session.change_stats.files_changed += 1;
    active.session.change_stats.insertions += insertions;
    active.session.change_stats.deletions += deletions;
}

#[cfg(test)]
mod tests {
    use super::*;
    use podmux_runtime::Session;

    fn active() -> ActiveSession {
        ActiveSession::new(Session::new("s1".into(), "w1".into(), "n".into()), 16)
    }

    #[test]
    fn agent_start_sets_busy_when_not_stopping() {
        let mut a = active();
        let outcome = EventProcessor::process(&mut a, &BackendEvent::AgentStart);
        assert_eq!(outcome.new_status, Some(SessionStatus::Busy));
        assert!(outcome.broadcast_state);
    }

    #[test]
    fn agent_start_does_not_override_stopping() {
        let mut a = active();
        a.session.status = SessionStatus::Stopping;
        let outcome = EventProcessor::process(&mut a, &BackendEvent::AgentStart);
        assert_eq!(outcome.new_status, None);
    }

    #[test]
    fn agent_end_with_pending_terminate_goes_to_stopping() {
        let mut a = active();
        a.pending_stop = Some(podmux_runtime::PendingStop::new(
            StopMode::Terminate,
            podmux_runtime::StopSource::User,
            SessionStatus::Busy,
        ));
        let outcome = EventProcessor::process(&mut a, &BackendEvent::AgentEnd);
        assert_eq!(outcome.new_status, Some(SessionStatus::Stopping));
        assert!(outcome.persist_now);
        assert!(!outcome.finalize_pending_abort);
    }

    #[test]
    fn agent_end_with_pending_abort_finalizes_and_goes_ready() {
        let mut a = active();
        a.pending_stop = Some(podmux_runtime::PendingStop::new(
            StopMode::Abort,
            podmux_runtime::StopSource::User,
            SessionStatus::Busy,
        ));
        let outcome = EventProcessor::process(&mut a, &BackendEvent::AgentEnd);
        assert_eq!(outcome.new_status, Some(SessionStatus::Ready));
        assert!(outcome.finalize_pending_abort);
    }

    #[test]
    fn tool_execution_start_on_bash_schedules_git_status() {
        let mut a = active();
        let outcome = EventProcessor::process(
            &mut a,
            &BackendEvent::ToolExecutionStart {
                tool_name: "bash".into(),
                args: serde_json::json!({}),
            },
        );
        assert!(outcome.schedule_git_status);
    }

    #[test]
    fn tool_execution_start_on_read_does_not_schedule_git_status() {
        let mut a = active();
        let outcome = EventProcessor::process(
            &mut a,
            &BackendEvent::ToolExecutionStart {
                tool_name: "read".into(),
                args: serde_json::json!({}),
            },
        );
        assert!(!outcome.schedule_git_status);
    }

    #[test]
    fn edit_tool_updates_change_stats() {
        let mut a = active();
        EventProcessor::process(
            &mut a,
            &BackendEvent::ToolExecutionStart {
                tool_name: "edit".into(),
                args: serde_json::json!({"insertions": 3, "deletions": 1}),
            },
        );
        assert_eq!(a.session.change_stats.files_changed, 1);
        assert_eq!(a.session.change_stats.insertions, 3);
        assert_eq!(a.session.change_stats.deletions, 1);
    }

    #[test]
    fn message_end_for_assistant_emits_message() {
        let mut a = active();
        let outcome = EventProcessor::process(
            &mut a,
            &BackendEvent::MessageEnd {
                role: "assistant".into(),
                content: "hi".into(),
                message_id: None,
            },
        );
        assert_eq!(outcome.messages.len(), 1);
    }

    #[test]
    fn message_end_for_system_role_is_not_broadcast_as_message() {
        let mut a = active();
        let outcome = EventProcessor::process(
            &mut a,
            &BackendEvent::MessageEnd {
                role: "system".into(),
                content: "x".into(),
                message_id: None,
            },
        );
        assert!(outcome.messages.is_empty());
    }

    #[test]
    fn extension_ui_notify_is_fire_and_forget() {
        let mut a = active();
        let outcome = EventProcessor::process(
            &mut a,
            &BackendEvent::ExtensionUiRequest {
                id: "1".into(),
                method: "notify".into(),
                payload: serde_json::json!({"text": "hi"}),
            },
        );
        assert!(a.pending_ui_requests.is_empty());
        assert!(matches!(outcome.messages[0], ClientMessage::ExtensionUiNotification { .. }));
    }

    #[test]
    fn extension_ui_dialog_is_stored_pending() {
        let mut a = active();
        EventProcessor::process(
            &mut a,
            &BackendEvent::ExtensionUiRequest {
                id: "req-1".into(),
                method: "confirm".into(),
                payload: serde_json::json!({}),
            },
        );
        assert!(a.pending_ui_requests.contains_key("req-1"));
    }

    #[test]
    fn tool_execution_end_does_not_broadcast_state() {
        let mut a = active();
        let outcome = EventProcessor::process(
            &mut a,
            &BackendEvent::ToolExecutionEnd {
                tool_name: "bash".into(),
                result: serde_json::json!({}),
            },
        );
        assert!(!outcome.broadcast_state);
    }
}
