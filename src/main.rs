// SPDX-License-Identifier: Apache-2.0

mod cli;

use std::path::PathBuf;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Serve { data_dir, bind }) => serve(cli.config, data_dir, bind).await,
        Some(Commands::ShowConfig) => show_config(cli.config),
        Some(Commands::Identity { data_dir }) => show_identity(data_dir),
        Some(Commands::Completions { shell }) => {
            cli::print_completions(shell);
            Ok(())
        }
        None => serve(cli.config, None, None).await,
    }
}

async fn serve(
    config_path: Option<PathBuf>,
    data_dir_override: Option<PathBuf>,
    bind_override: Option<String>,
) -> anyhow::Result<()> {
    let mut config = podmux_config::load(config_path.as_deref())?;
    if let Some(bind) = bind_override {
        config.gateway.bind_addr = bind;
    }

    let data_dir = data_dir_override
        .or_else(|| config.gateway.data_dir.clone().map(PathBuf::from))
        .unwrap_or_else(default_data_dir);

    let gateway = podmux_gateway::build(config, data_dir).await?;
    tracing::info!(bind = %gateway.bind_addr, "podmux gateway starting");

    let listener = tokio::net::TcpListener::bind(&gateway.bind_addr).await?;
    axum::serve(listener, gateway.router).await?;
    Ok(())
}

fn show_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = podmux_config::load(config_path.as_deref())?;
    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn show_identity(data_dir_override: Option<PathBuf>) -> anyhow::Result<()> {
    let data_dir = data_dir_override.unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let identity = podmux_gateway::Identity::load_or_generate(&data_dir)?;
    println!("{}", identity.fingerprint());
    Ok(())
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("podmux")
}

/// `RUST_LOG`/`PODMUX_LOG` take precedence over `--verbose` if either is set.
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("PODMUX_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
