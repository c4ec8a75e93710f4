use std::sync::Arc;

use broke_buster::backend::{self, AppState, BackendClient, BackendError};

async fn spawn_stub(ping_message: &str) -> BackendClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = backend::router(AppState {
        ping_message: Arc::from(ping_message),
    });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    BackendClient::new(format!("http://{addr}/api/")).unwrap()
}

#[tokio::test]
async fn stub_answers_health_ping_and_demo() {
    let client = spawn_stub("hello").await;
    assert!(client.base_url().ends_with("/api"));

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

    let ping = client.ping().await.unwrap();
    assert_eq!(ping.message, "hello");

    let demo = client.demo().await.unwrap();
    assert_eq!(demo.data.framework, "axum");
    assert!(chrono::DateTime::parse_from_rfc3339(&demo.timestamp).is_ok());
}

#[tokio::test]
async fn unknown_endpoint_reports_status() {
    let client = spawn_stub("pong").await;

    let err = client.get::<serde_json::Value>("/missing/").await.unwrap_err();

    assert!(matches!(err, BackendError::Status { status: 404, .. }));
    assert_eq!(err.to_string(), "HTTP error! status: 404");
}
