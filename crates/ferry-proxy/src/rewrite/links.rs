//! Single-reference rewriting.

use url::Url;

use super::RESOURCE_PATH;
use crate::error::RewriteError;

/// Prefixes left untouched by rewriting.
const PASSTHROUGH_PREFIXES: &[&str] = &["data:", "javascript:", "mailto:", "#"];

fn is_passthrough(url: &str) -> bool {
    PASSTHROUGH_PREFIXES.iter().any(|p| {
        url.get(..p.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(p))
    })
}

/// Resolves a reference to an absolute URL.
///
/// Scheme-relative references get `https:`. Absolute references are returned
/// verbatim, not normalized. Anything else is joined onto `base_url`.
pub fn resolve_absolute(url: &str, base_url: &str) -> Result<String, RewriteError> {
    if url.starts_with("//") {
        let absolute = format!("https:{}", url);
        Url::parse(&absolute)?;
        return Ok(absolute);
    }

    if Url::parse(url).is_ok() {
        return Ok(url.to_string());
    }

    Ok(Url::parse(base_url)?.join(url)?.to_string())
}

/// The relay URL for an already-absolute target.
pub(crate) fn relay_url(absolute: &str, proxy_base: &str, session_id: &str) -> String {
    format!(
        "{}{}?url={}&session={}",
        proxy_base.trim_end_matches('/'),
        RESOURCE_PATH,
        urlencoding::encode(absolute),
        urlencoding::encode(session_id)
    )
}

fn relay_prefix(proxy_base: &str) -> String {
    format!("{}{}?", proxy_base.trim_end_matches('/'), RESOURCE_PATH)
}

pub(crate) fn rewrite_url(url: &str, base_url: &str, proxy_base: &str, session_id: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() || is_passthrough(trimmed) {
        return url.to_string();
    }

    // Already routed through this relay.
    if trimmed.starts_with(&relay_prefix(proxy_base)) {
        return url.to_string();
    }

    match resolve_absolute(trimmed, base_url) {
        Ok(absolute) => relay_url(&absolute, proxy_base, session_id),
        Err(_) => url.to_string(),
    }
}
