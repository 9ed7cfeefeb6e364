use std::time::Duration;

use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";
const DEFAULT_IMAGE_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TRY_ON_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Runtime settings, read once in `main` and handed to the services that need them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub backend_url: String,
    pub image_fetch_timeout: Duration,
    pub try_on_timeout: Duration,
    /// Request body cap for `/api/try-on`.
    pub max_body_bytes: usize,
    /// Empty means every host may be fetched by the image proxy.
    pub allowed_image_hosts: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            image_fetch_timeout: Duration::from_secs(DEFAULT_IMAGE_FETCH_TIMEOUT_SECS),
            try_on_timeout: Duration::from_secs(DEFAULT_TRY_ON_TIMEOUT_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            allowed_image_hosts: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let backend_url = lookup("TRY_ON_BACKEND_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.backend_url);

        Self {
            port: parse_or("PORT", lookup("PORT"), defaults.port),
            backend_url,
            image_fetch_timeout: Duration::from_secs(parse_or(
                "IMAGE_FETCH_TIMEOUT_SECS",
                lookup("IMAGE_FETCH_TIMEOUT_SECS"),
                DEFAULT_IMAGE_FETCH_TIMEOUT_SECS,
            )),
            try_on_timeout: Duration::from_secs(parse_or(
                "TRY_ON_TIMEOUT_SECS",
                lookup("TRY_ON_TIMEOUT_SECS"),
                DEFAULT_TRY_ON_TIMEOUT_SECS,
            )),
            max_body_bytes: parse_or("MAX_BODY_BYTES", lookup("MAX_BODY_BYTES"), DEFAULT_MAX_BODY_BYTES),
            allowed_image_hosts: lookup("PROXY_ALLOWED_HOSTS")
                .map(|v| {
                    v.split(',')
                        .map(|h| h.trim().to_ascii_lowercase())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn try_on_endpoint(&self) -> String {
        format!("{}/try-on/", self.backend_url)
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!("⚠️ Ignoring invalid {}={:?}, using {}", key, v, default);
            default
        }),
    }
}
