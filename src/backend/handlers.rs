// src/backend/handlers.rs
use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use tracing::debug;

use crate::backend::models::{DemoData, DemoResponse, HealthResponse, PingResponse};
use crate::backend::AppState;

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        service: concat!(env!("CARGO_PKG_NAME"), "-backend").into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

pub async fn ping_handler(State(state): State<AppState>) -> Json<PingResponse> {
    debug!("ping");
    Json(PingResponse {
        message: state.ping_message.to_string(),
    })
}

pub async fn demo_handler() -> Json<DemoResponse> {
    Json(DemoResponse {
        message: "Hello from the Broke Buster backend!".into(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        data: DemoData {
            framework: "axum".into(),
            version: "0.7".into(),
            api: "REST".into(),
        },
    })
}
