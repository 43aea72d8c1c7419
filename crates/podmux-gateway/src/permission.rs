// SPDX-License-Identifier: Apache-2.0

//! `PermissionGate` wiring the structural policy heuristics (C4) into the
//! backend trait seam the session coordinator calls through.

use async_trait::async_trait;
use podmux_backend::PermissionGate;
use podmux_policy::{GateRequest, PolicyDecision, PolicyHeuristics, ResolvedHeuristics};
use tracing::info;

pub struct HeuristicPermissionGate {
    heuristics: PolicyHeuristics,
}

impl HeuristicPermissionGate {
    pub fn new(config: ResolvedHeuristics) -> Self {
        Self {
            heuristics: PolicyHeuristics::new(config),
        }
    }
}

#[async_trait]
impl PermissionGate for HeuristicPermissionGate {
    async fn evaluate(&self, request: GateRequest) -> PolicyDecision {
        self.heuristics.evaluate(&request)
    }

    async fn destroy_session_guard(&self, session_id: &str) {
        info!(session_id, "session startup failed after guard creation; nothing to clean up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delegates_to_the_configured_heuristics() {
        let gate = HeuristicPermissionGate::new(ResolvedHeuristics::default());
        let decision = gate
            .evaluate(GateRequest {
                tool: "read".into(),
                input: serde_json::json!({"path": "/etc/hostname"}),
            })
            .await;
        assert_eq!(decision.action, podmux_policy::PolicyAction::Allow);
    }
}
