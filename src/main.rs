//! # sync-bridge
//!
//! Sync bridge server binary: loads settings, installs logging and metrics,
//! and serves the push channel and request API until a termination signal.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use bridge_server::metrics::install_recorder;
use bridge_server::{BridgeServer, ServerConfig};
use bridge_settings::{
    BridgeSettings, load_settings, load_settings_from_path, settings_path, validate,
};
use bridge_telemetry::{TelemetryConfig, init_telemetry};
use clap::Parser;
use tracing::info;

/// Real-time session relay between a producer CLI and dashboard subscribers.
#[derive(Parser, Debug)]
#[command(name = "sync-bridge", version, about)]
struct Cli {
    /// Settings file (defaults to `~/.sync-bridge/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,
}

/// Settings file, then env overrides, then CLI flags.
fn resolve_settings(cli: &Cli) -> Result<BridgeSettings> {
    let mut settings = match &cli.config {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => load_settings().with_context(|| {
            format!("Failed to load settings from {}", settings_path().display())
        })?,
    };

    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    validate(&settings).context("Invalid settings")?;
    Ok(settings)
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    init_telemetry(&TelemetryConfig {
        level: settings.logging.level.clone(),
        json: settings.logging.json,
    })
    .context("Failed to initialise logging")?;
    let metrics = install_recorder().context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings);
    let bind = format!("{}:{}", config.host, config.port);
    let server = BridgeServer::new(config, metrics);
    let (addr, handle) = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!(%addr, "sync bridge started");

    wait_for_signal().await?;
    info!("shutdown signal received");
    server.graceful_shutdown(vec![handle], None).await;
    Ok(())
}
