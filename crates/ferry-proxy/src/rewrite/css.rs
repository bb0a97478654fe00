//! Stylesheet rewriting.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use super::links::{resolve_absolute, rewrite_url};
use crate::error::RewriteError;

static URL_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\s*\(\s*['"]?([^'"()]+)['"]?\s*\)"#).expect("Invalid regex pattern")
});

static IMPORT_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"@import\s+['"]([^'"]+)['"]"#).expect("Invalid regex pattern"));

pub(super) fn process(
    css: &str,
    base_url: &str,
    proxy_base: &str,
    session_id: &str,
) -> Result<String, RewriteError> {
    let css = try_replace_all(&URL_FUNCTION, css, |caps| {
        let inner = caps[1].trim();
        let target = if inner.starts_with("//") {
            format!("https:{}", inner)
        } else if inner.starts_with("data:") || Url::parse(inner).is_ok() {
            inner.to_string()
        } else {
            resolve_absolute(inner, base_url)?
        };
        Ok(format!(
            "url('{}')",
            rewrite_url(&target, base_url, proxy_base, session_id)
        ))
    })?;

    try_replace_all(&IMPORT_RULE, &css, |caps| {
        let target = resolve_absolute(caps[1].trim(), base_url)?;
        Ok(format!(
            "@import '{}'",
            rewrite_url(&target, base_url, proxy_base, session_id)
        ))
    })
}

/// `Regex::replace_all` with a fallible replacer.
fn try_replace_all<F>(re: &Regex, text: &str, mut replace: F) -> Result<String, RewriteError>
where
    F: FnMut(&Captures<'_>) -> Result<String, RewriteError>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&replace(&caps)?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}
