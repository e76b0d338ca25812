use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use thermal_rgbd::{application::Application, cli::Cli, config::ConfigManager, logging};

/// Cancels `cancel` on Ctrl+C or SIGTERM.
fn watch_signals(cancel: CancellationToken) -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown..."),
                Err(e) => error!("Failed to listen for Ctrl+C: {e}"),
            },
            _ = terminate.recv() => info!("Received SIGTERM, initiating graceful shutdown..."),
        }
        cancel.cancel();
    });
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _cli = Cli::parse();

    let config_manager = ConfigManager::load(None)?;
    let config = config_manager.config();
    logging::init(&config.logging, config.log_level()?)?;
    info!("thermal_rgbd {} starting", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    watch_signals(cancel.clone())?;

    let result = match Application::builder()
        .with_config_manager(config_manager)
        .build()
    {
        Ok(app) => app.run(cancel).await,
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        error!("{e:#}");
    }
    log::logger().flush();
    result
}
