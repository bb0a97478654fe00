//! Link rewriting for relayed content.
//!
//! Every resource or navigation reference found in HTML or CSS is turned into
//! a relay URL of the form
//! `{proxy_base}/api/proxy/resource?url={encoded}&session={session}` so that
//! follow-on loads keep flowing through the relay.
//!
//! Rewriting is a best-effort transform by default: when processing fails the
//! original payload is returned and a warning is logged. [`RewriteMode::Strict`]
//! surfaces the failure instead.

mod css;
mod html;
mod interceptor;
mod links;

use tracing::warn;

use crate::error::RewriteError;

pub use self::interceptor::{interceptor_script, INTERCEPTOR_TEMPLATE};
pub use self::links::resolve_absolute;

/// Path of the resource endpoint rewritten links point at.
pub const RESOURCE_PATH: &str = "/api/proxy/resource";

/// Path of the browsing entry used for new-window navigation.
pub const BROWSE_PATH: &str = "/browse";

/// How rewrite failures are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RewriteMode {
    /// Log the failure and return the input unchanged.
    #[default]
    BestEffort,
    /// Return the failure to the caller.
    Strict,
}

/// Rewrites URLs, HTML documents, and stylesheets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteEngine {
    mode: RewriteMode,
}

impl RewriteEngine {
    /// A best-effort engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with the given failure mode.
    pub fn with_mode(mode: RewriteMode) -> Self {
        Self { mode }
    }

    /// The failure mode.
    pub fn mode(&self) -> RewriteMode {
        self.mode
    }

    /// Rewrites a single reference into a relay URL.
    ///
    /// Never fails: references that cannot be resolved are returned as-is.
    pub fn rewrite_url(&self, url: &str, base_url: &str, proxy_base: &str, session_id: &str) -> String {
        links::rewrite_url(url, base_url, proxy_base, session_id)
    }

    /// Rewrites every reference in an HTML document and injects the
    /// interception script.
    pub fn process_html(
        &self,
        html: &str,
        base_url: &str,
        proxy_base: &str,
        session_id: &str,
    ) -> Result<String, RewriteError> {
        let result = html::process(self, html, base_url, proxy_base, session_id);
        self.finish("HTML", html, result)
    }

    /// Rewrites every `url(...)` and `@import` in a stylesheet.
    pub fn process_css(
        &self,
        css: &str,
        base_url: &str,
        proxy_base: &str,
        session_id: &str,
    ) -> Result<String, RewriteError> {
        let result = css::process(css, base_url, proxy_base, session_id);
        self.finish("CSS", css, result)
    }

    fn finish(
        &self,
        kind: &str,
        original: &str,
        result: Result<String, RewriteError>,
    ) -> Result<String, RewriteError> {
        match (result, self.mode) {
            (Ok(rewritten), _) => Ok(rewritten),
            (Err(e), RewriteMode::BestEffort) => {
                warn!("{} rewrite failed, returning original content: {}", kind, e);
                Ok(original.to_string())
            }
            (Err(e), RewriteMode::Strict) => Err(e),
        }
    }
}
