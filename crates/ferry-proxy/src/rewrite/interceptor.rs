//! Client-side interception script injected into rewritten pages.
//!
//! The script routes `fetch`, `XMLHttpRequest.open`, and `window.open`
//! through the relay. It is a static template; only the placeholders below
//! are substituted, each as a JSON string literal.

use serde_json::Value;

use super::{BROWSE_PATH, RESOURCE_PATH};

/// Raw script template.
pub const INTERCEPTOR_TEMPLATE: &str = include_str!("interceptor.js");

/// Renders the script for one page.
pub fn interceptor_script(proxy_base: &str, session_id: &str, target_base: &str) -> String {
    INTERCEPTOR_TEMPLATE
        .replace("{{PROXY_BASE}}", &js_string(proxy_base.trim_end_matches('/')))
        .replace("{{SESSION_ID}}", &js_string(session_id))
        .replace("{{TARGET_BASE}}", &js_string(target_base))
        .replace("{{RESOURCE_PATH}}", &js_string(RESOURCE_PATH))
        .replace("{{BROWSE_PATH}}", &js_string(BROWSE_PATH))
}

/// A JSON string literal that cannot close the surrounding `<script>`.
fn js_string(value: &str) -> String {
    Value::String(value.to_string())
        .to_string()
        .replace("</", "<\\/")
}
