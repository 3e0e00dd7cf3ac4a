#[path = "domaind/config.rs"]
mod config;

use config::DaemonConfig;
use sdr_engine::application::{ControlPlane, ControlPlaneSettings};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = DaemonConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    config.validate()?;
    info!(
        domain = %config.domain_name,
        sdr_root = %config.sdr_root.display(),
        node = ?config.node_config,
        "Starting SDR domain daemon"
    );

    let plane = ControlPlane::new(ControlPlaneSettings {
        domain_name: config.domain_name.clone(),
        sdr_root: config.sdr_root.clone(),
        node_config: config.node_config.clone(),
        persistence_file: config.persistence_file.clone(),
        debug_level: config.debug_level,
        logging_config_uri: config.logging_config_uri.clone(),
    });

    if let Err(e) = plane.start().await {
        error!(error = %e, "Control plane failed to start");
        plane.shutdown().await;
        return Err(e.into());
    }

    shutdown_signal().await?;
    info!("Shutdown signal received");
    plane.shutdown().await;
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = terminate.recv() => {}
        _ = interrupt.recv() => {}
    }
    Ok(())
}
