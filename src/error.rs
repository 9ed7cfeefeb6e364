use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorDetail;

pub const IMAGE_URL_REQUIRED: &str = "Image URL is required";
pub const IMAGE_HOST_NOT_ALLOWED: &str = "Image host not allowed";
pub const IMAGE_PROCESSING_FAILED: &str = "Failed to process image";
pub const TRY_ON_UNREACHABLE: &str = "Failed to connect to try-on service";

#[derive(Debug, Error)]
pub enum ImageProxyError {
    #[error("missing url parameter")] MissingParameter,
    #[error("host not allowed: {0}")] HostNotAllowed(String),
    #[error("invalid image url: {0}")] InvalidUrl(String),
    #[error("failed to fetch image: {0}")] UpstreamFetchFailed(String),
    #[error("transport error: {0}")] Transport(String),
}

impl IntoResponse for ImageProxyError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ImageProxyError::MissingParameter => (StatusCode::BAD_REQUEST, IMAGE_URL_REQUIRED),
            ImageProxyError::HostNotAllowed(_) => (StatusCode::FORBIDDEN, IMAGE_HOST_NOT_ALLOWED),
            // Upstream detail stays in the server log.
            _ => {
                error!("❌ Proxy error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, IMAGE_PROCESSING_FAILED)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Error)]
pub enum TryOnProxyError {
    /// The backend answered with a non-2xx status.
    #[error("backend returned {status}: {detail}")] Backend { status: StatusCode, detail: String },
    #[error("transport error: {0}")] Transport(String),
    #[error("invalid request body: {0}")] InvalidBody(String),
    #[error("request body rejected ({status}): {message}")] BodyRejected { status: StatusCode, message: String },
}

impl TryOnProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            TryOnProxyError::Backend { status, .. } | TryOnProxyError::BodyRejected { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            TryOnProxyError::Backend { detail, .. } => detail.clone(),
            TryOnProxyError::Transport(_) => TRY_ON_UNREACHABLE.to_string(),
            TryOnProxyError::InvalidBody(msg) => format!("Invalid request body: {msg}"),
            TryOnProxyError::BodyRejected { message, .. } => message.clone(),
        }
    }
}

impl IntoResponse for TryOnProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorDetail { detail: self.detail() })).into_response()
    }
}
