// SPDX-License-Identifier: Apache-2.0

//! StopCoordinator (C7): the two-phase stop state machine.
//!
//! `PendingStop` is a singleton per `ActiveSession`. This module contains
//! the pure state transitions; the owning coordinator (`coordinator.rs`)
//! drives backend calls, timers, and broadcasts around them.

use podmux_runtime::{ActiveSession, PendingStop, SessionStatus, StopMode, StopSource};
use thiserror::Error;

use crate::messages::ClientMessage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StopError {
    #[error("a stop is already pending for this session")]
    AlreadyPending,
    #[error("no stop is pending for this session")]
    NotPending,
}

pub struct StopCoordinator;

impl StopCoordinator {
    /// Rejected if a pending stop already exists. On success the session
    /// moves to `stopping` and a `stop_requested` + `state` pair should be
    /// broadcast by the caller.
    pub fn begin_pending_stop(
        active: &mut ActiveSession,
        mode: StopMode,
        source: StopSource,
    ) -> Result<Vec<ClientMessage>, StopError> {
        if active.pending_stop.is_some() {
            return Err(StopError::AlreadyPending);
        }
        let previous_status = active.session.status;
        active.pending_stop = Some(PendingStop::new(mode, source, previous_status));
        active.session.status = SessionStatus::Stopping;

        Ok(vec![ClientMessage::StopRequested {
            source: source_label(source).to_string(),
            reason: None,
        }])
    }

    /// Upgrade an existing pending stop to a new mode (e.g. `abort ->
    /// terminate`). The caller is responsible for clearing any scheduled
    /// abort-retry timeout before calling this.
    pub fn promote_pending_stop(
        active: &mut ActiveSession,
        mode: StopMode,
        source: StopSource,
    ) -> Result<(), StopError> {
        let pending = active.pending_stop.as_mut().ok_or(StopError::NotPending)?;
        pending.mode = mode;
        pending.source = source;
        Ok(())
    }

    /// Called by the event processor on `agent_end` when `pendingStop.mode
    /// == abort`. Clears the pending stop and confirms it.
    pub fn finish_pending_abort_with_success(active: &mut ActiveSession) -> Vec<ClientMessage> {
        let source = active
            .pending_stop
            .take()
            .map(|p| source_label(p.source).to_string())
            .unwrap_or_else(|| source_label(StopSource::User).to_string());
        vec![ClientMessage::StopConfirmed { source, reason: None }]
    }

    /// Clears the pending stop and confirms it; the caller still owns
    /// disposing the backend and tearing down the session afterward.
    pub fn force_terminate_session_process(active: &mut ActiveSession) -> Vec<ClientMessage> {
        let source = active
            .pending_stop
            .take()
            .map(|p| source_label(p.source).to_string())
            .unwrap_or_else(|| source_label(StopSource::Server).to_string());
        vec![ClientMessage::StopConfirmed { source, reason: None }]
    }

    /// Restores `previousStatus` (never back to `stopping`; falls back to
    /// `busy` in that degenerate case) and returns `state` + `stop_failed`.
    pub fn finish_pending_stop_with_failure(
        active: &mut ActiveSession,
        reason: String,
    ) -> Vec<ClientMessage> {
        let pending = active.pending_stop.take();
        let restored = match pending.as_ref().map(|p| p.previous_status) {
            Some(SessionStatus::Stopping) | None => SessionStatus::Busy,
            Some(other) => other,
        };
        active.session.status = restored;

        let source = pending
            .map(|p| source_label(p.source).to_string())
            .unwrap_or_else(|| source_label(StopSource::User).to_string());

        vec![ClientMessage::StopFailed { source, reason }]
    }
}

fn source_label(source: StopSource) -> &'static str {
    match source {
        StopSource::User => "user",
        StopSource::Timeout => "timeout",
        StopSource::Server => "server",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podmux_runtime::Session;

    fn active() -> ActiveSession {
        let mut session = Session::new("s1".into(), "w1".into(), "n".into());
        session.status = SessionStatus::Busy;
        ActiveSession::new(session, 16)
    }

    #[test]
    fn begin_pending_stop_moves_to_stopping() {
        let mut a = active();
        let msgs = StopCoordinator::begin_pending_stop(&mut a, StopMode::Abort, StopSource::User).unwrap();
        assert_eq!(a.session.status, SessionStatus::Stopping);
        assert!(a.pending_stop.is_some());
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn begin_pending_stop_rejects_when_already_pending() {
        let mut a = active();
        StopCoordinator::begin_pending_stop(&mut a, StopMode::Abort, StopSource::User).unwrap();
        let err = StopCoordinator::begin_pending_stop(&mut a, StopMode::Terminate, StopSource::User)
            .unwrap_err();
        assert_eq!(err, StopError::AlreadyPending);
    }

    #[test]
    fn finish_pending_abort_with_success_clears_and_confirms() {
        let mut a = active();
        StopCoordinator::begin_pending_stop(&mut a, StopMode::Abort, StopSource::User).unwrap();
        let msgs = StopCoordinator::finish_pending_abort_with_success(&mut a);
        assert!(a.pending_stop.is_none());
        assert!(matches!(msgs[0], ClientMessage::StopConfirmed { .. }));
    }

    #[test]
    fn finish_pending_stop_with_failure_restores_previous_status() {
        let mut a = active();
        StopCoordinator::begin_pending_stop(&mut a, StopMode::Abort, StopSource::User).unwrap();
        let msgs = StopCoordinator::finish_pending_stop_with_failure(&mut a, "timed out".into());
        assert_eq!(a.session.status, SessionStatus::Busy);
        assert!(a.pending_stop.is_none());
        assert!(matches!(&msgs[0], ClientMessage::StopFailed { reason, .. } if reason == "timed out"));
    }

    #[test]
    fn promote_pending_stop_upgrades_mode() {
        let mut a = active();
        StopCoordinator::begin_pending_stop(&mut a, StopMode::Abort, StopSource::User).unwrap();
        StopCoordinator::promote_pending_stop(&mut a, StopMode::Terminate, StopSource::User).unwrap();
        assert_eq!(a.pending_stop.as_ref().unwrap().mode, StopMode::Terminate);
    }

    #[test]
    fn promote_pending_stop_fails_without_pending() {
        let mut a = active();
        let err = StopCoordinator::promote_pending_stop(&mut a, StopMode::Terminate, StopSource::User)
            .unwrap_err();
        assert_eq!(err, StopError::NotPending);
    }
}
