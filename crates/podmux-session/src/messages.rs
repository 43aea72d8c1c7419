// SPDX-License-Identifier: Apache-2.0

//! Client-facing message types (server -> client over the WebSocket).

use podmux_runtime::Session;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    State {
        session: Session,
    },
    CommandResult {
        command: String,
        #[serde(rename = "requestId")]
        request_id: Option<String>,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    StopRequested {
        source: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    StopConfirmed {
        source: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    StopFailed {
        source: String,
        reason: String,
    },
    MessageEnd {
        role: String,
        content: String,
    },
    ExtensionUiRequest {
        id: String,
        method: String,
        payload: Value,
    },
    ExtensionUiNotification {
        method: String,
        payload: Value,
    },
    GitStatus {
        #[serde(rename = "workspaceId")]
        workspace_id: String,
        status: Value,
    },
}

impl ClientMessage {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("ClientMessage always serializes")
    }
}
