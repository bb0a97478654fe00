//! Outbound HTTP transport.
//!
//! The forwarding engine talks to origins only through [`Transport`], so tests
//! can substitute a scripted fake. [`ReqwestTransport`] is the production
//! implementation.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use tracing::debug;

use ferry_core::ProxySettings;

use crate::error::{ProxyError, Result};

/// Content type attached to forwarded request bodies.
pub const BODY_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// One outbound request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    /// Ordered headers; repeated names are all sent.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
    pub follow_redirects: bool,
}

/// A fully buffered upstream response.
#[derive(Debug, Clone, Default)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// First value of a header, matched case-insensitively.
    pub fn header<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.header_values(name).next()
    }

    /// Every value of a header, in order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `Content-Type` header, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Sends requests to origins.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse>;
}

/// Client-level transport options.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub max_redirects: usize,
    pub decompress: bool,
    pub accept_invalid_certs: bool,
    pub https_only: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from_settings(&ProxySettings::default())
    }
}

impl TransportConfig {
    pub fn from_settings(settings: &ProxySettings) -> Self {
        Self {
            max_redirects: settings.max_redirects,
            decompress: settings.enable_compression,
            accept_invalid_certs: settings.accept_invalid_certs,
            https_only: settings.enforce_ssl,
        }
    }
}

/// [`Transport`] backed by reqwest.
///
/// Holds two clients because the redirect policy is fixed per client: one
/// follows up to `max_redirects`, the other follows none.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    following: Client,
    direct: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given options.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        Ok(Self {
            following: build_client(config, Policy::limited(config.max_redirects))?,
            direct: build_client(config, Policy::none())?,
        })
    }

    /// Creates a transport from relay settings.
    pub fn from_settings(settings: &ProxySettings) -> Result<Self> {
        Self::new(&TransportConfig::from_settings(settings))
    }
}

fn build_client(config: &TransportConfig, redirect: Policy) -> Result<Client> {
    Client::builder()
        .redirect(redirect)
        .gzip(config.decompress)
        .brotli(config.decompress)
        .deflate(config.decompress)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .https_only(config.https_only)
        .build()
        .map_err(|e| ProxyError::Upstream(format!("failed to build HTTP client: {}", e)))
}

fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => debug!("Skipping invalid outbound header: {}", name),
        }
    }
    map
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse> {
        let method = Method::from_str(&request.method.to_ascii_uppercase())
            .map_err(|_| ProxyError::InvalidMethod(request.method.clone()))?;

        let client = if request.follow_redirects {
            &self.following
        } else {
            &self.direct
        };

        let mut headers = header_map(&request.headers);
        if request.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(BODY_CONTENT_TYPE));
        }

        let mut builder = client
            .request(method, &request.url)
            .headers(headers)
            .timeout(request.timeout);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| map_error(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_error(&request.url, e))?
            .to_vec();

        debug!("{} {} -> {}", request.method, request.url, status);

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_error(url: &str, e: reqwest::Error) -> ProxyError {
    if e.is_timeout() {
        ProxyError::Timeout(url.to_string())
    } else if e.is_builder() {
        ProxyError::InvalidUrl(format!("{}: {}", url, e))
    } else {
        ProxyError::Upstream(e.to_string())
    }
}
