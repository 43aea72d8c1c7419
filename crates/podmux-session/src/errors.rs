// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Admission(#[from] podmux_runtime::AdmissionError),
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),
    #[error("Session not active")]
    SessionNotActive,
    #[error("Unhandled SDK command: {0}")]
    UnhandledCommand(String),
    #[error("Stop timed out: {0}")]
    StopTimedOut(String),
    #[error("Force stop failed: {0}")]
    ForceStopFailed(String),
    #[error(transparent)]
    Backend(#[from] podmux_backend::BackendError),
    #[error(transparent)]
    Store(#[from] podmux_backend::StoreError),
    #[error(transparent)]
    Stop(#[from] crate::stop::StopError),
}
