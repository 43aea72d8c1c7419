// SPDX-License-Identifier: Apache-2.0

//! Best-effort git status for a workspace's host mount, shelled out to the
//! system `git` binary. Errors are the caller's concern to swallow (the
//! event-processing debounce treats git status failures as silent, per the
//! workspace-level `gitStatusEnabled` gate).

use std::process::Stdio;

use async_trait::async_trait;
use podmux_backend::{BackendError, GitStatusProvider};
use podmux_runtime::Workspace;
use tokio::process::Command;

pub struct ShellGitStatusProvider;

#[async_trait]
impl GitStatusProvider for ShellGitStatusProvider {
    async fn git_status(&self, workspace: &Workspace) -> Result<serde_json::Value, BackendError> {
        let Some(host_mount) = workspace.host_mount.as_deref() else {
            return Err(BackendError::Operation("workspace has no host mount".into()));
        };

        let output = Command::new("git")
            .arg("-C")
            .arg(host_mount)
            .arg("status")
            .arg("--porcelain=v1")
            .arg("--branch")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BackendError::Operation(format!("spawning git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Operation(format!("git status failed: {stderr}")));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_porcelain(&stdout))
    }
}

fn parse_porcelain(stdout: &str) -> serde_json::Value {
    let mut lines = stdout.lines();
    let branch = lines
        .next()
        .and_then(|l| l.strip_prefix("## "))
        .map(|l| l.split("...").next().unwrap_or(l).to_string())
        .unwrap_or_default();

    let files: Vec<serde_json::Value> = lines
        .filter(|l| !l.is_empty())
        .map(|l| {
            let (status, path) = l.split_at(2.min(l.len()));
            serde_json::json!({"status": status.trim(), "path": path.trim()})
        })
        .collect();

    serde_json::json!({"branch": branch, "files": files})
}
