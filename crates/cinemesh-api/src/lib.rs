//! cinemesh-api — the HTTP query plane.
//!
//! Read-only except for `/api/neighbors/{user_id}`, which triggers a
//! dispatch across the worker pool and waits for the merged answer.

pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub async fn serve(state: ApiState, addr: &str) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/workers", get(handlers::handle_workers))
        .route("/neighbors/{user_id}", get(handlers::handle_neighbors))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "http api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
