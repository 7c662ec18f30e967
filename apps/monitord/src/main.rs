use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use monitord::Config;
use monitord::app::App;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "monitord", version, about = "Monitor HTTP endpoints and record their health")]
struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/monitord/config.toml)
    #[arg(short, long, env = "MONITORD_CONFIG")]
    config: Option<PathBuf>,

    /// How long to wait for monitors to stop on shutdown
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    shutdown_timeout: Duration,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_deref()).context("failed to load configuration")?;
    if cli.print_config {
        print!("{config}");
        return Ok(());
    }

    let _log_guard = logger::init_with(&logger::LogOptions {
        level: Some(config.logging.level.clone()),
        format: config.logging.format.as_deref().and_then(|format| format.parse().ok()),
        file: config.logging.path.clone(),
    })?;

    info!("{}", config);

    let app = App::new(config, cli.config.clone()).await?;
    app.start().await?;

    wait_for_signal().await?;
    info!("Shutdown signal received");

    app.shutdown(cli.shutdown_timeout).await
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")
}
