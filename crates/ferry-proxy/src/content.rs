//! Response classification tables.
//!
//! Pure helpers the forwarding path uses to decide how a response body is
//! treated: text or binary, redirect or not, and how `Set-Cookie` values map
//! onto the session jar.

use url::Url;

/// Content types treated as text. Entries ending in `/` match a whole family.
pub const TEXT_CONTENT_TYPES: &[&str] = &[
    "text/",
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-javascript",
    "application/xhtml+xml",
];

/// Statuses whose `Location` header is surfaced as `redirect_url`.
pub const REDIRECT_STATUSES: &[u16] = &[301, 302, 307];

/// Content type assumed when the origin sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Whether a content type denotes a text body.
pub fn is_text_content(content_type: &str) -> bool {
    let media = media_type(content_type).to_ascii_lowercase();
    TEXT_CONTENT_TYPES.iter().any(|t| {
        if t.ends_with('/') {
            media.starts_with(t)
        } else {
            media == *t
        }
    })
}

/// The media type of a `Content-Type` header, without parameters.
pub fn media_type(content_type: &str) -> &str {
    let media = content_type.split(';').next().unwrap_or("").trim();
    if media.is_empty() {
        DEFAULT_CONTENT_TYPE
    } else {
        media
    }
}

/// Whether the content type is HTML.
pub fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("html")
}

/// Whether the content type is CSS.
pub fn is_css(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("css")
}

/// Whether a status is one of the surfaced redirects.
pub fn is_redirect_status(status: u16) -> bool {
    REDIRECT_STATUSES.contains(&status)
}

/// Splits a `Set-Cookie` value into `(name, value)`.
///
/// Attributes after the first `;` are dropped. The value keeps any further
/// `=` characters.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// `scheme://host[:port]` of a URL, or the input when it does not parse.
///
/// Non-default ports are kept so the base stays reachable; IDN hosts come
/// back in punycode.
pub fn base_url_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => {
            let origin = parsed.origin().ascii_serialization();
            if origin == "null" {
                url.to_string()
            } else {
                origin
            }
        }
        _ => url.to_string(),
    }
}
