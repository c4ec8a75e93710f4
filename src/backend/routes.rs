use axum::{routing::get, Router};

use crate::backend::{handlers, AppState};

pub fn api_routes() -> Router<AppState> {
    let api = Router::new()
        .route("/health/", get(handlers::health_handler))
        .route("/ping/", get(handlers::ping_handler))
        .route("/demo/", get(handlers::demo_handler));

    Router::new().nest("/api", api)
}
