//! cinemeshd — cinemesh coordinator daemon.
//!
//! Loads the ratings dataset, listens for workers on the TCP dispatch
//! plane, and serves neighbor queries on the HTTP query plane.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{RwLock, broadcast};

use cinemesh_api::ApiState;
use cinemesh_coordinator::{Dispatcher, Recommender, TcpServer, WorkerRegistry};
use cinemesh_core::config::CoordinatorConfig;
use cinemesh_core::ratings::load_user_ratings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = CoordinatorConfig::load().context("loading configuration")?;

    let (ratings, user_ids) = load_user_ratings(&config.ratings_path)
        .with_context(|| format!("loading ratings from {}", config.ratings_path.display()))?;
    tracing::info!(
        users = user_ids.len(),
        path = %config.ratings_path.display(),
        "ratings dataset loaded"
    );

    let (shutdown_tx, _) = broadcast::channel(1);

    let registry = Arc::new(WorkerRegistry::new());
    let (server, inbound_rx) = TcpServer::new(registry.clone(), shutdown_tx.clone());
    let dispatcher = Dispatcher::new(
        registry.clone(),
        config.dispatch.result_timeout(),
        config.dispatch.k,
        shutdown_tx.clone(),
    );
    dispatcher.spawn_router(inbound_rx);

    let recommender = Arc::new(Recommender::new(
        dispatcher,
        Arc::new(RwLock::new(ratings)),
        shutdown_tx.clone(),
    ));

    let api_state = ApiState {
        registry: registry.clone(),
        recommender,
        dataset_users: user_ids.len(),
        started_at: Instant::now(),
        k: config.dispatch.k,
    };
    let http_addr = config.http_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = cinemesh_api::serve(api_state, &http_addr).await {
            tracing::error!(error = %e, "http api failed");
        }
    });

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind worker listener on {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "listening for workers");

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let signal_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("signal received, shutting down");
        let _ = signal_shutdown.send(());
    });

    server.run(listener).await
}
