// SPDX-License-Identifier: Apache-2.0

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "podmux",
    about = "Session runtime gateway fronting a containerized coding agent",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase verbosity (-v = debug, -vv = trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a config file (overrides layered auto-discovery).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway: HTTP/WebSocket transport, bearer-token auth,
    /// server identity, and the session runtime.
    Serve {
        /// Data directory for the identity key, bearer token, and the
        /// file-backed session/workspace store.
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Override the configured bind address (host:port).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the effective merged configuration and exit.
    ShowConfig,

    /// Print the server identity's fingerprint, generating it on first run.
    Identity {
        /// Data directory holding (or to hold) the identity key.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "podmux", &mut std::io::stdout());
}
