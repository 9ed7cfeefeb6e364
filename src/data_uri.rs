use std::fmt;

use base64::Engine;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// An inline `data:<mime>;base64,<payload>` image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime: String,
    payload: String,
}

impl DataUri {
    pub fn encode(mime: impl Into<String>, bytes: &[u8]) -> Self {
        Self { mime: mime.into(), payload: BASE64.encode(bytes) }
    }

    pub fn from_payload(mime: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { mime: mime.into(), payload: payload.into() }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let mime = header.strip_suffix(";base64")?;
        Some(Self::from_payload(mime, payload))
    }

    pub fn mime(&self) -> &str { &self.mime }

    pub fn payload(&self) -> &str { &self.payload }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(self.payload.as_bytes())
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime, self.payload)
    }
}

/// Everything after the first comma of a data URI. A string without a comma is
/// assumed to already be a bare payload and is returned unchanged.
pub fn strip_prefix(s: &str) -> &str {
    match s.split_once(',') {
        Some((_, payload)) => payload,
        None => s,
    }
}

/// Short form of a base64 string for log lines.
pub fn preview(s: &str) -> String {
    match s.char_indices().nth(50) {
        Some((cut, _)) => format!("{}...[{} chars total]", &s[..cut], s.chars().count()),
        None => s.to_string(),
    }
}
