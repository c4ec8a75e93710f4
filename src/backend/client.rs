//! Client for the alternate backend. Endpoints are relative to the API base,
//! e.g. `/ping/` against `http://localhost:8000/api`.

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use super::models::{DemoResponse, HealthResponse, PingResponse};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },

    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let http = Client::builder()
            .user_agent(concat!("broke-buster/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse, BackendError> {
        self.get("/health/").await
    }

    pub async fn ping(&self) -> Result<PingResponse, BackendError> {
        self.get("/ping/").await
    }

    pub async fn demo(&self) -> Result<DemoResponse, BackendError> {
        self.get("/demo/").await
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, BackendError> {
        self.request::<(), T>(Method::GET, endpoint, None).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<T, BackendError> {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<T, BackendError> {
        self.request(Method::PUT, endpoint, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, BackendError> {
        self.request::<(), T>(Method::DELETE, endpoint, None).await
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T, BackendError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut req = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req
            .send()
            .await
            .inspect_err(|err| error!(error = %err, %method, %url, "backend request failed"))?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!(status = status.as_u16(), %method, %url, "backend returned an error status");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}
