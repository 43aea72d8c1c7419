// SPDX-License-Identifier: Apache-2.0

//! Backend command types (issued to the agent SDK) and its reply envelope.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendCommand {
    Prompt { text: String },
    Steer { text: String },
    FollowUp { text: String },
    Abort,
    AbortBash,
    SetModel { provider: String, id: String },
    CycleModel,
    SetThinkingLevel { level: String },
    CycleThinkingLevel,
    NewSession,
    SetSessionName { name: String },
    Compact,
    SetAutoCompaction { enabled: bool },
    Fork,
    SwitchSession { session_id: String },
    SetSteeringMode { enabled: bool },
    SetFollowUpMode { enabled: bool },
    SetAutoRetry { enabled: bool },
    AbortRetry,
    GetStateSnapshot,
    GetMessages,
    GetSessionStats,
    Dispose,
}

impl BackendCommand {
    /// `prompt`/`steer`/`follow_up`/`abort` are routed fire-and-forget;
    /// everything else goes through request/reply with reconciliation.
    pub fn is_fire_and_forget(&self) -> bool {
        matches!(
            self,
            BackendCommand::Prompt { .. }
                | BackendCommand::Steer { .. }
                | BackendCommand::FollowUp { .. }
                | BackendCommand::Abort
                | BackendCommand::AbortBash
        )
    }
}

/// Raw backend reply; shape depends on the command and is parsed by the
/// caller (the command coordinator) field by field.
pub type BackendResponse = serde_json::Value;
