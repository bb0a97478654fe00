//! Process-wide relay settings.
//!
//! Loaded once at startup and shared read-only (usually as `Arc<ProxySettings>`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default public base URL of the relay, used when rewriting links.
pub const DEFAULT_PROXY_BASE_URL: &str = "http://127.0.0.1:48765";

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Refuse plain-HTTP outbound fetches.
    pub enforce_ssl: bool,
    /// Accept and transparently decode compressed upstream bodies.
    pub enable_compression: bool,
    /// Cache successful text responses.
    pub enable_caching: bool,
    /// Absolute lifetime of cache entries.
    pub cache_duration_minutes: u64,
    /// Host substrings that are always rejected.
    pub blocked_domains: Vec<String>,
    /// Host substrings that are exclusively permitted, when non-empty.
    pub allowed_domains: Vec<String>,
    /// Upper bound on in-flight outbound fetches.
    pub max_concurrent_connections: usize,
    /// Public base URL that rewritten links point at.
    pub proxy_base_url: String,
    /// Skip certificate validation on outbound TLS.
    ///
    /// Off by default. Turning it on lets any network attacker between the
    /// relay and the origin impersonate the origin.
    pub accept_invalid_certs: bool,
    /// Rewrite links in HTML responses.
    pub rewrite_html: bool,
    /// Rewrite links in CSS responses.
    pub rewrite_css: bool,
    /// Default outbound request timeout.
    pub request_timeout_secs: u64,
    /// Maximum redirects followed per outbound request.
    pub max_redirects: usize,
    /// Sliding session timeout.
    pub session_timeout_minutes: u64,
    /// Interval between cleanup sweeps.
    pub cleanup_interval_secs: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enforce_ssl: false,
            enable_compression: true,
            enable_caching: true,
            cache_duration_minutes: 10,
            blocked_domains: Vec::new(),
            allowed_domains: Vec::new(),
            max_concurrent_connections: 100,
            proxy_base_url: DEFAULT_PROXY_BASE_URL.to_string(),
            accept_invalid_certs: false,
            rewrite_html: true,
            rewrite_css: true,
            request_timeout_secs: 30,
            max_redirects: 5,
            session_timeout_minutes: 120,
            cleanup_interval_secs: 300,
        }
    }
}

impl ProxySettings {
    /// Cache entry lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_duration_minutes.saturating_mul(60))
    }

    /// Sliding session timeout.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes.saturating_mul(60))
    }

    /// Default outbound timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Interval between cleanup sweeps.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// The proxy base URL without a trailing slash.
    pub fn proxy_base(&self) -> &str {
        self.proxy_base_url.trim_end_matches('/')
    }
}
