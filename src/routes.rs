use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        DefaultBodyLimit, Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    config::AppConfig,
    error::{ImageProxyError, TryOnProxyError},
    image_proxy::ImageProxy,
    models::ProxyImageResponse,
    tryon_proxy::TryOnProxy,
};

#[derive(Clone)]
pub struct AppState {
    pub image_proxy: Arc<ImageProxy>,
    pub try_on: Arc<TryOnProxy>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            image_proxy: Arc::new(ImageProxy::new(config)?),
            try_on: Arc::new(TryOnProxy::new(config)?),
            max_body_bytes: config.max_body_bytes,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route("/health", get(health))
        .route("/api/proxy-image", get(proxy_image))
        .route("/api/try-on", post(try_on).layer(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Only the first `url` parameter counts; repeats are ignored.
pub async fn proxy_image(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<ProxyImageResponse>, ImageProxyError> {
    let Query(pairs) = query.map_err(|e| {
        tracing::warn!("Unreadable proxy-image query: {}", e);
        ImageProxyError::MissingParameter
    })?;
    let url = pairs.into_iter().find(|(key, _)| key == "url").map(|(_, value)| value);
    let uri = state.image_proxy.fetch_data_uri(url.as_deref()).await?;
    Ok(Json(ProxyImageResponse { base64: Some(uri.to_string()), error: None }))
}

pub async fn try_on(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, TryOnProxyError> {
    let body = body.map_err(|e| TryOnProxyError::BodyRejected { status: e.status(), message: e.body_text() })?;
    let payload = state.try_on.forward(body).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], payload).into_response())
}
