//! Ferry Proxy - forwarding, caching, and link rewriting for the web relay.
//!
//! This crate fetches remote resources on behalf of a session and rewrites
//! every embedded reference so follow-on loads keep flowing through the relay.
//!
//! ## Features
//!
//! - Session validation and domain policy before any network traffic
//! - Per-session response cache with absolute TTL
//! - HTML, CSS, and single-URL rewriting with an injected interception script
//! - Cookie jar maintenance from `Set-Cookie`
//! - Bounded concurrency on outbound fetches
//! - Periodic sweep of expired sessions and cache entries
//!
//! ## Architecture
//!
//! ```text
//! forward(request, session)
//!     │
//!     ├─ SessionRegistry.validate ── invalid ──► 401
//!     ├─ PolicyFilter.check ──────── blocked ──► 403
//!     ├─ ResponseCache.get ───────── hit ──────► fromCache
//!     ▼
//! Transport.send ──► classify ──► RewriteEngine (HTML/CSS) ──► ResponseCache.put
//!
//! CleanupTask ── every 5 min ──► sweep sessions + purge cache
//! ```

pub mod cache;
mod cleanup;
pub mod content;
mod error;
mod forward;
pub mod rewrite;
pub mod transport;

pub use cache::{fingerprint, CacheEntry, ResponseCache};
pub use cleanup::{CleanupHandle, CleanupReport, CleanupTask, CLEANUP_INTERVAL};
pub use error::{ProxyError, Result, RewriteError, DOMAIN_BLOCKED_MESSAGE, SESSION_INVALID_MESSAGE};
pub use forward::{ForwardingEngine, DEFAULT_HEADERS, IDENTITY_ENCODING};
pub use rewrite::{interceptor_script, RewriteEngine, RewriteMode, BROWSE_PATH, RESOURCE_PATH};
pub use transport::{
    OutboundRequest, ReqwestTransport, Transport, TransportConfig, UpstreamResponse,
};
