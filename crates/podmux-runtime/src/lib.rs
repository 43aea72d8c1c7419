// SPDX-License-Identifier: Apache-2.0

//! Workspace/session admission scheduling, the model catalog, the active
//! session registry, and host environment construction.

pub mod catalog;
pub mod data;
pub mod env;
pub mod mutex;
pub mod registry;

pub use catalog::{apply_pi_state_snapshot, compose_model_id, ModelCatalog, ModelInfo, PiStateSnapshot};
pub use data::{
    ActiveSession, ChangeStats, EventRing, PendingStop, Session, SessionStatus, StopMode,
    StopSource, Workspace, DEFAULT_CONTEXT_WINDOW,
};
pub use env::{build_host_env, resolve_executable_on_path};
pub use mutex::{AdmissionError, WorkspaceRuntime};
pub use registry::{IdleTimeoutHandler, SessionRegistry};
