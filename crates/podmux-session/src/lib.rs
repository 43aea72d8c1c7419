// SPDX-License-Identifier: Apache-2.0

pub mod commands;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod messages;
pub mod start;
pub mod stop;

pub use commands::{
    changes_visible_session_fields, extract_model_from_response, normalize_error,
    reconcile_model_change, reconcile_session_name, reconcile_thinking_level,
};
pub use coordinator::SessionCoordinator;
pub use errors::SessionError;
pub use events::{EventOutcome, EventProcessor};
pub use messages::ClientMessage;
pub use start::resolve_workspace_id;
pub use stop::{StopCoordinator, StopError};
