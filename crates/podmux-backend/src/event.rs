// SPDX-License-Identifier: Apache-2.0

//! Backend event stream types (consumed from the agent SDK).

use serde::Serialize;

/// A single event from the backend's event stream. Constructed by the
/// backend implementation directly (not deserialized off a wire format);
/// `Serialize` is kept for structured logging.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendEvent {
    AgentStart,
    AgentEnd,
    TurnStart { turn_id: String },
    TurnEnd { turn_id: String },
    MessageEnd {
        role: String,
        content: String,
        message_id: Option<String>,
    },
    ToolExecutionStart {
        tool_name: String,
        args: serde_json::Value,
    },
    ToolExecutionEnd {
        tool_name: String,
        result: serde_json::Value,
    },
    AutoCompactionStart,
    AutoCompactionEnd,
    AutoRetryStart,
    AutoRetryEnd,
    ExtensionUiRequest {
        id: String,
        method: String,
        payload: serde_json::Value,
    },
    /// Catch-all for event types this runtime does not act on.
    Other {
        event_type: String,
        payload: serde_json::Value,
    },
}

impl BackendEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            BackendEvent::AgentStart => "agent_start",
            BackendEvent::AgentEnd => "agent_end",
            BackendEvent::TurnStart { .. } => "turn_start",
            BackendEvent::TurnEnd { .. } => "turn_end",
            BackendEvent::MessageEnd { .. } => "message_end",
            BackendEvent::ToolExecutionStart { .. } => "tool_execution_start",
            BackendEvent::ToolExecutionEnd { .. } => "tool_execution_end",
            BackendEvent::AutoCompactionStart => "auto_compaction_start",
            BackendEvent::AutoCompactionEnd => "auto_compaction_end",
            BackendEvent::AutoRetryStart => "auto_retry_start",
            BackendEvent::AutoRetryEnd => "auto_retry_end",
            BackendEvent::ExtensionUiRequest { .. } => "extension_ui_request",
            BackendEvent::Other { .. } => "other",
        }
    }
}
