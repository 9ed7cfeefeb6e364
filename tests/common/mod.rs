#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;
use tryon_studio::{router, AppConfig, AppState};

pub async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn app_for_backend(backend: SocketAddr) -> Router {
    let config = AppConfig { backend_url: format!("http://{backend}"), ..AppConfig::default() };
    router(AppState::from_config(&config).unwrap())
}

pub async fn call(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response: Response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

pub fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Last body the fake backend received.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Option<Vec<u8>>>>);

impl Captured {
    pub fn set(&self, body: &[u8]) {
        *self.0.lock() = Some(body.to_vec());
    }

    pub fn get(&self) -> Option<Vec<u8>> {
        self.0.lock().clone()
    }
}
