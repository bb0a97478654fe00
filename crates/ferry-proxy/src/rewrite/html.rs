//! HTML document rewriting.
//!
//! Two passes: a read-only parse finds the effective `<base href>`, then a
//! streaming rewrite mutates attributes, inline styles, and `<head>`.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};

use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, text, RewriteStrSettings};
use scraper::{Html, Selector};
use url::Url;

use super::interceptor::interceptor_script;
use super::RewriteEngine;
use crate::error::RewriteError;

/// Element/attribute pairs holding a single URL.
const URL_ATTRIBUTES: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("img[src]", "src"),
    ("script[src]", "src"),
    ("iframe[src]", "src"),
    ("source[src]", "src"),
    ("video[src]", "src"),
    ("audio[src]", "src"),
    ("form[action]", "action"),
];

/// Elements holding a `srcset` candidate list.
const SRCSET_SELECTORS: &[&str] = &["img[srcset]", "source[srcset]"];

const UPGRADE_INSECURE_META: &str =
    r#"<meta http-equiv="Content-Security-Policy" content="upgrade-insecure-requests">"#;

pub(super) fn process(
    engine: &RewriteEngine,
    html: &str,
    base_url: &str,
    proxy_base: &str,
    session_id: &str,
) -> Result<String, RewriteError> {
    let effective_base = effective_base(html, base_url)?;
    let base: &str = &effective_base;
    let script = format!(
        "<script>{}</script>",
        interceptor_script(proxy_base, session_id, base)
    );

    let base_removed = Cell::new(false);
    let style_buffer = RefCell::new(String::new());
    let base_removed = &base_removed;
    let style_buffer = &style_buffer;

    let mut handlers = vec![element!("base[href]", move |el| {
        if !base_removed.replace(true) {
            el.remove();
        }
        Ok(())
    })];

    for &(selector, attr) in URL_ATTRIBUTES {
        handlers.push(element!(selector, move |el| {
            if let Some(value) = el.get_attribute(attr) {
                if !value.trim().is_empty() {
                    let rewritten = engine.rewrite_url(&value, base, proxy_base, session_id);
                    el.set_attribute(attr, &rewritten)?;
                }
            }
            Ok(())
        }));
    }

    for &selector in SRCSET_SELECTORS {
        handlers.push(element!(selector, move |el| {
            if let Some(value) = el.get_attribute("srcset") {
                let rewritten = rewrite_srcset(engine, &value, base, proxy_base, session_id);
                el.set_attribute("srcset", &rewritten)?;
            }
            Ok(())
        }));
    }

    handlers.push(element!("[style]", move |el| {
        if let Some(style) = el.get_attribute("style") {
            let rewritten = engine.process_css(&style, base, proxy_base, session_id)?;
            el.set_attribute("style", &rewritten)?;
        }
        Ok(())
    }));

    handlers.push(text!("style", move |chunk| {
        style_buffer.borrow_mut().push_str(chunk.as_str());
        if chunk.last_in_text_node() {
            let css = std::mem::take(&mut *style_buffer.borrow_mut());
            let rewritten = engine.process_css(&css, base, proxy_base, session_id)?;
            chunk.replace(&rewritten, ContentType::Html);
        } else {
            chunk.remove();
        }
        Ok(())
    }));

    let script = script.as_str();
    handlers.push(element!("head", move |el| {
        el.prepend(script, ContentType::Html);
        el.append(UPGRADE_INSECURE_META, ContentType::Html);
        Ok(())
    }));

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::new()
        },
    )
    .map_err(|e| RewriteError::Html(e.to_string()));
    rewritten
}

/// The base URL links resolve against: the first `<base href>` joined onto
/// the document URL, or the document URL itself.
fn effective_base<'a>(html: &str, base_url: &'a str) -> Result<Cow<'a, str>, RewriteError> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("base[href]").map_err(|e| RewriteError::Selector(e.to_string()))?;

    let href = document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::trim);

    match href {
        Some(href) => Ok(Cow::Owned(Url::parse(base_url)?.join(href)?.to_string())),
        None => Ok(Cow::Borrowed(base_url)),
    }
}

/// Rewrites the URL part of each `srcset` candidate, keeping descriptors.
fn rewrite_srcset(
    engine: &RewriteEngine,
    srcset: &str,
    base: &str,
    proxy_base: &str,
    session_id: &str,
) -> String {
    srcset
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| {
            let (url, descriptor) = match candidate.find(char::is_whitespace) {
                Some(idx) => candidate.split_at(idx),
                None => (candidate, ""),
            };
            format!(
                "{}{}",
                engine.rewrite_url(url, base, proxy_base, session_id),
                descriptor
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
