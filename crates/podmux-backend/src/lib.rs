// SPDX-License-Identifier: Apache-2.0

//! Trait seams toward the backend SDK, permission gate, and storage, plus
//! deterministic mock implementations for the session-level test suite.

pub mod command;
pub mod event;
pub mod mock;
pub mod traits;

pub use command::{BackendCommand, BackendResponse};
pub use event::BackendEvent;
pub use traits::{
    heal_persisted_session_context_windows, AgentBackend, AgentBackendFactory, BackendError,
    GitStatusProvider, PermissionGate, SessionStore, StoreError,
};
