use serde::{Deserialize, Serialize};

/// `/api/proxy-image` body. Exactly one of the fields is set.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ProxyImageResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Both images as bare base64, no `data:` prefix.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TryOnRequest {
    pub user_image: String,
    pub clothing_image: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TryOnResponse {
    pub generated_image: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub detail: String,
}
