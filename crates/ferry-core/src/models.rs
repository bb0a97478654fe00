//! Forwarding request and response envelopes.
//!
//! Both types travel as camelCase JSON at the HTTP boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One forwarding intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyRequest {
    pub target_url: String,
    pub method: String,
    pub headers: Option<HashMap<String, String>>,
    pub cookies: Option<HashMap<String, String>>,
    pub body: Option<String>,
    /// Carried through untouched; the relay does not encrypt payloads.
    pub use_encryption: bool,
    pub use_cache: bool,
    /// Outbound timeout; `0` uses the relay's configured request timeout.
    pub timeout_seconds: u64,
    pub rewrite_urls: bool,
    pub follow_redirects: bool,
}

impl Default for ProxyRequest {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            method: "GET".to_string(),
            headers: None,
            cookies: None,
            body: None,
            use_encryption: true,
            use_cache: true,
            timeout_seconds: 0,
            rewrite_urls: true,
            follow_redirects: true,
        }
    }
}

impl ProxyRequest {
    /// A cached, rewriting GET of `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            target_url: url.into(),
            ..Self::default()
        }
    }

    /// Whether this is a GET request.
    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// Result envelope of a forwarded fetch.
///
/// `content` and `binary_content` are mutually exclusive: text responses fill
/// `content`, everything else fills `binary_content`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub content: Option<String>,
    #[serde(default, with = "base64_bytes")]
    pub binary_content: Option<Vec<u8>>,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub from_cache: bool,
    pub response_time_ms: u64,
    pub is_html: bool,
    pub redirect_url: Option<String>,
    pub error: Option<String>,
}

impl ProxyResponse {
    /// An error envelope carrying only a status and message.
    pub fn failure(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            status_code,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Whether the body is text.
    pub fn is_text(&self) -> bool {
        self.content.is_some()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| BASE64.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
