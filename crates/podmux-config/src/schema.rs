// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use podmux_policy::ResolvedHeuristics;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_max_sessions_per_workspace() -> u32 {
    3
}

fn default_max_sessions_global() -> u32 {
    5
}

fn default_session_idle_timeout_ms() -> u64 {
    600_000
}

fn default_workspace_idle_timeout_ms() -> u64 {
    1_800_000
}

fn default_event_ring_capacity() -> usize {
    256
}

fn default_stop_abort_timeout_ms() -> u64 {
    5_000
}

fn default_stop_abort_retry_timeout_ms() -> u64 {
    5_000
}

fn default_bind_addr() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_gateway_hostname() -> String {
    "host.internal".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One statically-registered model, standing in for the agent backend SDK's
/// own model registry until a real backend is wired in by the embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub context_window: u32,
}

/// Top-level configuration, assembled by merging YAML layers (see [`crate::load`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether tool calls are routed through the permission gate.
    #[serde(default = "default_true")]
    pub permission_gate: bool,

    #[serde(default = "default_max_sessions_per_workspace")]
    pub max_sessions_per_workspace: u32,
    #[serde(default = "default_max_sessions_global")]
    pub max_sessions_global: u32,
    #[serde(default = "default_session_idle_timeout_ms")]
    pub session_idle_timeout_ms: u64,
    #[serde(default = "default_workspace_idle_timeout_ms")]
    pub workspace_idle_timeout_ms: u64,
    #[serde(default = "default_event_ring_capacity")]
    pub event_ring_capacity: usize,
    #[serde(default = "default_stop_abort_timeout_ms")]
    pub stop_abort_timeout_ms: u64,
    #[serde(default = "default_stop_abort_retry_timeout_ms")]
    pub stop_abort_retry_timeout_ms: u64,

    /// `~`-expanded, deduplicated PATH entries handed to the sandbox driver.
    #[serde(default)]
    pub runtime_path_entries: Vec<String>,
    /// Extra environment variables merged into the sandbox environment.
    #[serde(default)]
    pub runtime_env: HashMap<String, String>,

    #[serde(default)]
    pub heuristics: ResolvedHeuristics,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Statically-registered models, consumed by `ModelCatalog::refresh` at
    /// startup.
    #[serde(default)]
    pub models: Vec<ConfiguredModel>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            permission_gate: default_true(),
            max_sessions_per_workspace: default_max_sessions_per_workspace(),
            max_sessions_global: default_max_sessions_global(),
            session_idle_timeout_ms: default_session_idle_timeout_ms(),
            workspace_idle_timeout_ms: default_workspace_idle_timeout_ms(),
            event_ring_capacity: default_event_ring_capacity(),
            stop_abort_timeout_ms: default_stop_abort_timeout_ms(),
            stop_abort_retry_timeout_ms: default_stop_abort_retry_timeout_ms(),
            runtime_path_entries: Vec::new(),
            runtime_env: HashMap::new(),
            heuristics: ResolvedHeuristics::default(),
            gateway: GatewayConfig::default(),
            models: Vec::new(),
        }
    }
}

/// Gateway-specific (HTTP/WS transport, identity) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Hostname sandboxed containers use to reach bridged host loopback ports.
    #[serde(default = "default_gateway_hostname")]
    pub gateway_hostname: String,
    /// Data directory for the bearer token and Ed25519 identity files.
    pub data_dir: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            gateway_hostname: default_gateway_hostname(),
            data_dir: None,
            log_level: default_log_level(),
        }
    }
}
