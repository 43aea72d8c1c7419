// SPDX-License-Identifier: Apache-2.0

//! StartCoordinator (C8) pure helpers. The admission/backend-creation
//! sequencing itself lives on `SessionCoordinator` (`coordinator.rs`), since
//! it needs the workspace lock, the backend factory, and storage together.

use podmux_runtime::{Session, Workspace};

/// Resolution order: explicit `workspace.id` > `session.workspace_id` >
/// synthetic `session-<id>`.
pub fn resolve_workspace_id(workspace: Option<&Workspace>, session: &Session) -> String {
    if let Some(w) = workspace {
        return w.id.clone();
    }
    if !session.workspace_id.is_empty() {
        return session.workspace_id.clone();
    }
    format!("session-{}", session.session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_explicit_workspace_id() {
        let session = Session::new("s1".into(), "w-from-session".into(), "n".into());
        let workspace = Workspace::new("w-explicit".into(), "w".into());
        assert_eq!(resolve_workspace_id(Some(&workspace), &session), "w-explicit");
    }

    #[test]
    fn falls_back_to_session_workspace_id() {
        let session = Session::new("s1".into(), "w-from-session".into(), "n".into());
        assert_eq!(resolve_workspace_id(None, &session), "w-from-session");
    }

    #[test]
    fn falls_back_to_synthetic_id() {
        let session = Session::new("s1".into(), String::new(), "n".into());
        assert_eq!(resolve_workspace_id(None, &session), "session-s1");
    }
}
