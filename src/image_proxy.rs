use reqwest::{header::CONTENT_TYPE, Client, Url};
use tracing::{debug, info};

use crate::{config::AppConfig, data_uri::{preview, DataUri}, error::ImageProxyError};

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Fetches remote images server-side and hands them back as data URIs, so
/// browsers never have to hit third-party image hosts cross-origin.
pub struct ImageProxy {
    client: Client,
    allowed_hosts: Vec<String>,
}

impl ImageProxy {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.image_fetch_timeout).build()?;
        Ok(Self { client, allowed_hosts: config.allowed_image_hosts.clone() })
    }

    pub async fn fetch_data_uri(&self, url: Option<&str>) -> Result<DataUri, ImageProxyError> {
        let url = url.filter(|u| !u.is_empty()).ok_or(ImageProxyError::MissingParameter)?;
        let parsed = Url::parse(url).map_err(|e| ImageProxyError::InvalidUrl(format!("{url}: {e}")))?;
        self.check_host(&parsed)?;

        info!("🔗 Fetching product image: {}", parsed);
        let response = self.client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ImageProxyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or(status.as_str()).to_string();
            return Err(ImageProxyError::UpstreamFetchFailed(reason));
        }

        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();
        let bytes = response.bytes().await.map_err(|e| ImageProxyError::Transport(e.to_string()))?;

        let uri = DataUri::encode(mime, &bytes);
        debug!("📦 Encoded {} bytes as {}: {}", bytes.len(), uri.mime(), preview(uri.payload()));
        Ok(uri)
    }

    fn check_host(&self, url: &Url) -> Result<(), ImageProxyError> {
        if self.allowed_hosts.is_empty() {
            return Ok(());
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if self.allowed_hosts.iter().any(|allowed| *allowed == host) {
            Ok(())
        } else {
            Err(ImageProxyError::HostNotAllowed(host))
        }
    }
}
