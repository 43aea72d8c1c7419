// SPDX-License-Identifier: Apache-2.0

//! Deterministic environment/PATH construction handed to the sandbox driver.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use podmux_config::Config;

/// Build the environment passed to the sandbox driver: PATH is replaced
/// entirely (no inheritance) by the deduplicated, `~`-expanded
/// `runtime_path_entries`; `runtime_env` is merged in afterward.
pub fn build_host_env(config: &Config) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();

    let mut seen = std::collections::HashSet::new();
    let mut path_entries = Vec::new();
    for entry in &config.runtime_path_entries {
        let expanded = shellexpand::tilde(entry).into_owned();
        if seen.insert(expanded.clone()) {
            path_entries.push(expanded);
        }
    }
    env.insert("PATH".to_string(), path_entries.join(":"));

    for (k, v) in &config.runtime_env {
        let expanded = shellexpand::tilde(v).into_owned();
        env.insert(k.clone(), expanded);
    }

    env
}

/// Walk `:`-separated `path` entries and return the first existing,
/// executable absolute path for `exe`, or `None`.
pub fn resolve_executable_on_path(exe: &str, path: Option<&str>) -> Option<PathBuf> {
    let path = path?;
    for dir in path.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate = Path::new(dir).join(exe);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
