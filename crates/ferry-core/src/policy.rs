//! Domain allow/block policy.
//!
//! Decides whether a target URL may be fetched through the relay.
//!
//! Entries match as case-insensitive substrings of the host, not as exact
//! hosts or domain suffixes. A block entry of `"ads"` therefore blocks
//! `ads.example.com`, `downloads.example.org`, and `roads.gov` alike. This is a
//! deliberately coarse policy that covers subdomains without a public suffix
//! list; operators who need exact matching should use full host names.

use url::Url;

use crate::settings::ProxySettings;

/// Outcome of evaluating a URL against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The URL may be fetched.
    Allowed,
    /// The host contains a blocked entry.
    Blocked { entry: String },
    /// An allow list is configured and the host matches none of it.
    NotAllowlisted,
    /// The URL could not be parsed or has no host.
    Malformed,
}

impl PolicyDecision {
    /// Whether the decision permits the fetch.
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allowed)
    }
}

/// Domain filter built from the blocked and allowed lists.
#[derive(Debug, Clone, Default)]
pub struct PolicyFilter {
    blocked: Vec<String>,
    allowed: Vec<String>,
}

impl PolicyFilter {
    /// Creates a filter from explicit lists.
    pub fn new<B, A>(blocked: B, allowed: A) -> Self
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        Self {
            blocked: normalize(blocked),
            allowed: normalize(allowed),
        }
    }

    /// Creates a filter from the relay settings.
    pub fn from_settings(settings: &ProxySettings) -> Self {
        Self::new(&settings.blocked_domains, &settings.allowed_domains)
    }

    /// Evaluates a URL.
    pub fn check(&self, url: &str) -> PolicyDecision {
        let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) {
            Some(host) if !host.is_empty() => host,
            _ => return PolicyDecision::Malformed,
        };

        if let Some(entry) = self.blocked.iter().find(|d| host.contains(d.as_str())) {
            return PolicyDecision::Blocked {
                entry: entry.clone(),
            };
        }

        if !self.allowed.is_empty() && !self.allowed.iter().any(|d| host.contains(d.as_str())) {
            return PolicyDecision::NotAllowlisted;
        }

        PolicyDecision::Allowed
    }

    /// Whether a URL may be fetched.
    pub fn is_allowed(&self, url: &str) -> bool {
        self.check(url).is_allowed()
    }
}

/// Whether `url` may be fetched under `settings`.
pub fn is_allowed(url: &str, settings: &ProxySettings) -> bool {
    PolicyFilter::from_settings(settings).is_allowed(url)
}

fn normalize<I>(entries: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    entries
        .into_iter()
        .map(|e| e.as_ref().trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
