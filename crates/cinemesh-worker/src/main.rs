//! cinemesh-worker — worker node daemon.
//!
//! Dials the coordinator from `COORDINATOR_ADDR`, handshakes, then serves
//! similarity tasks until SIGTERM/ctrl-c or connection loss.

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;

use cinemesh_core::config::WorkerConfig;
use cinemesh_worker::WorkerClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(addr = %config.coordinator_addr, "dialing coordinator");

    let client = WorkerClient::connect(&config.coordinator_addr)
        .await
        .with_context(|| format!("failed to connect to {}", config.coordinator_addr))?;
    tracing::info!(worker_id = %client.id(), "handshake complete, ready for tasks");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("signal received, shutting down");
        let _ = shutdown_tx.send(());
    });

    client.run(shutdown_rx).await.context("worker loop failed")?;
    Ok(())
}
