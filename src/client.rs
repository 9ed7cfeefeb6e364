use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::models::{ErrorDetail, ProxyImageResponse, TryOnRequest, TryOnResponse};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("HTTP {status}: {}", .detail.as_deref().unwrap_or("no detail"))] Status { status: u16, detail: Option<String> },
    #[error("transport error: {0}")] Transport(String),
    #[error("unexpected response: {0}")] Decode(String),
}

impl ClientError {
    /// Message supplied by the service itself, if it sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Status { detail, .. } => detail.as_deref().filter(|d| !d.is_empty()),
            _ => None,
        }
    }
}

/// The two calls the try-on workflow makes.
#[async_trait]
pub trait TryOnApi: Send + Sync {
    /// Returns the product image as a full data URI.
    async fn proxy_image(&self, url: &str) -> Result<String, ClientError>;
    async fn try_on(&self, request: &TryOnRequest) -> Result<TryOnResponse, ClientError>;
}

/// Talks to the `/api/proxy-image` and `/api/try-on` endpoints of a running service.
pub struct HttpTryOnClient {
    client: Client,
    base_url: String,
}

impl HttpTryOnClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }
}

#[async_trait]
impl TryOnApi for HttpTryOnClient {
    async fn proxy_image(&self, url: &str) -> Result<String, ClientError> {
        let response = self.client
            .get(format!("{}/api/proxy-image", self.base_url))
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let body: ProxyImageResponse = response.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        if !status.is_success() || body.error.is_some() {
            return Err(ClientError::Status { status: status.as_u16(), detail: body.error });
        }
        body.base64.ok_or_else(|| ClientError::Decode("missing base64 field".into()))
    }

    async fn try_on(&self, request: &TryOnRequest) -> Result<TryOnResponse, ClientError> {
        debug!("Posting try-on request to {}", self.base_url);
        let response = self.client
            .post(format!("{}/api/try-on", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.json::<ErrorDetail>().await.ok().map(|e| e.detail);
            return Err(ClientError::Status { status: status.as_u16(), detail });
        }
        response.json().await.map_err(|e| ClientError::Decode(e.to_string()))
    }
}
