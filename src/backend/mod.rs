mod client;
mod handlers;
pub mod models;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::info;

pub use client::{BackendClient, BackendError};

pub const DEFAULT_PING_MESSAGE: &str = "pong";

#[derive(Clone)]
pub struct AppState {
    pub ping_message: Arc<str>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            ping_message: Arc::from(DEFAULT_PING_MESSAGE),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "Backend is running" }))
        .merge(routes::api_routes())
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, ping_message: String) -> anyhow::Result<()> {
    let state = AppState {
        ping_message: Arc::from(ping_message),
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;

    Ok(())
}
