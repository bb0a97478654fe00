//! Error types for the relay.

use thiserror::Error;

/// Message returned when a session fails validation.
pub const SESSION_INVALID_MESSAGE: &str = "Invalid or expired VPN session";

/// Message returned when the policy rejects a target.
pub const DOMAIN_BLOCKED_MESSAGE: &str = "Domain is blocked";

/// Forwarding error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Session is unknown, terminated, or expired.
    #[error("{}", SESSION_INVALID_MESSAGE)]
    SessionInvalid,

    /// Target host rejected by the domain policy.
    #[error("{}", DOMAIN_BLOCKED_MESSAGE)]
    DomainBlocked,

    /// Request method is not a valid HTTP token.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Target URL could not be parsed.
    #[error("invalid target URL: {0}")]
    InvalidUrl(String),

    /// Outbound request failed (DNS, connect, TLS, protocol).
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Outbound request exceeded its timeout.
    #[error("upstream request timed out: {0}")]
    Timeout(String),

    /// Rewriting failed in strict mode.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// The relay cannot take more work (connection limiter closed).
    #[error("relay unavailable: {0}")]
    Unavailable(String),
}

impl ProxyError {
    /// HTTP status reported for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::SessionInvalid => 401,
            ProxyError::DomainBlocked => 403,
            _ => 500,
        }
    }
}

/// Link rewriting error type.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// A URL could not be parsed or resolved.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The HTML rewriter failed.
    #[error("HTML rewriting error: {0}")]
    Html(String),

    /// A CSS selector failed to compile.
    #[error("selector error: {0}")]
    Selector(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ProxyError::SessionInvalid.status_code(), 401);
        assert_eq!(ProxyError::DomainBlocked.status_code(), 403);
        assert_eq!(ProxyError::Upstream("dns".into()).status_code(), 500);
        assert_eq!(ProxyError::Timeout("30s".into()).status_code(), 500);
    }

    #[test]
    fn messages_match_envelope_text() {
        assert_eq!(
            ProxyError::SessionInvalid.to_string(),
            "Invalid or expired VPN session"
        );
        assert_eq!(ProxyError::DomainBlocked.to_string(), "Domain is blocked");
    }

    #[test]
    fn rewrite_error_converts() {
        let parse = url::Url::parse("nope").unwrap_err();
        let err: ProxyError = RewriteError::from(parse).into();
        assert!(matches!(err, ProxyError::Rewrite(RewriteError::Url(_))));
    }
}
