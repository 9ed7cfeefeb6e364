pub mod client;
pub mod config;
pub mod data_uri;
pub mod error;
pub mod image_proxy;
pub mod models;
pub mod routes;
pub mod tryon_proxy;
pub mod workflow;

pub use config::AppConfig;
pub use routes::{router, AppState};
