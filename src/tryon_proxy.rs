use axum::http::StatusCode;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client};
use serde_json::Value;
use tracing::{error, info};

use crate::{config::AppConfig, error::TryOnProxyError};

/// Relays try-on requests to the generation backend and normalizes its failures.
pub struct TryOnProxy {
    client: Client,
    endpoint: String,
}

impl TryOnProxy {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.try_on_timeout).build()?;
        Ok(Self { client, endpoint: config.try_on_endpoint() })
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }

    /// Forwards `body` untouched and returns the backend's JSON body untouched.
    pub async fn forward(&self, body: Bytes) -> Result<Bytes, TryOnProxyError> {
        serde_json::from_slice::<Value>(&body).map_err(|e| TryOnProxyError::InvalidBody(e.to_string()))?;

        info!("📤 Forwarding try-on request ({} bytes) to {}", body.len(), self.endpoint);
        let response = self.client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("❌ Try-on proxy error: {}", e);
                TryOnProxyError::Transport(e.to_string())
            })?;

        let status = response.status();
        info!("📥 Try-on backend status: {}", status);
        let payload = response.bytes().await.map_err(|e| {
            error!("❌ Failed to read try-on backend response: {}", e);
            TryOnProxyError::Transport(e.to_string())
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&payload);
            error!("❌ Try-on backend error: {} {}", status, text);
            return Err(TryOnProxyError::Backend {
                status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                detail: error_detail(&text),
            });
        }

        if let Err(e) = serde_json::from_slice::<Value>(&payload) {
            error!("❌ Try-on backend sent a malformed body: {}", e);
            return Err(TryOnProxyError::Transport(format!("malformed backend response: {e}")));
        }

        Ok(payload)
    }
}

/// `detail` from a JSON error body, or the raw text when there is none.
pub fn error_detail(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            Some(Value::Null) | None => text.to_string(),
            Some(other) => other.to_string(),
        },
        _ => text.to_string(),
    }
}
