//! End-to-end forwarding of one proxied fetch.
//!
//! Validates the session, applies the domain policy, consults the cache,
//! performs the outbound request, classifies and rewrites the body, updates
//! the session's cookie jar, and stores cacheable responses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use ferry_core::{PolicyFilter, ProxyRequest, ProxyResponse, ProxySettings, SessionId, SessionRegistry};

use crate::cache::ResponseCache;
use crate::content::{self, is_css, is_html, is_redirect_status, is_text_content, parse_set_cookie};
use crate::error::{ProxyError, Result};
use crate::rewrite::RewriteEngine;
use crate::transport::{OutboundRequest, Transport, UpstreamResponse};

/// Browser-like headers sent ahead of any caller-supplied ones.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("DNT", "1"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
];

/// `Accept-Encoding` sent when response decompression is disabled.
pub const IDENTITY_ENCODING: &str = "identity";

/// Orchestrates proxied fetches.
///
/// Cheap to clone; clones share the registry, cache, transport, and
/// connection limit.
#[derive(Clone)]
pub struct ForwardingEngine {
    sessions: SessionRegistry,
    cache: ResponseCache,
    policy: PolicyFilter,
    rewriter: RewriteEngine,
    transport: Arc<dyn Transport>,
    settings: Arc<ProxySettings>,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for ForwardingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingEngine")
            .field("sessions", &self.sessions.len())
            .field("cache", &self.cache.len())
            .field("rewriter", &self.rewriter)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl ForwardingEngine {
    /// Creates an engine over shared state.
    pub fn new(
        sessions: SessionRegistry,
        cache: ResponseCache,
        transport: Arc<dyn Transport>,
        settings: Arc<ProxySettings>,
    ) -> Self {
        let permits = settings.max_concurrent_connections.max(1);
        Self {
            policy: PolicyFilter::from_settings(&settings),
            rewriter: RewriteEngine::new(),
            permits: Arc::new(Semaphore::new(permits)),
            sessions,
            cache,
            transport,
            settings,
        }
    }

    /// Replaces the rewrite engine.
    pub fn with_rewriter(mut self, rewriter: RewriteEngine) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    /// Forwards one request on behalf of a session.
    ///
    /// Never fails: every problem is reported through the envelope's status
    /// code and `error`.
    pub async fn forward(&self, request: &ProxyRequest, session_id: &SessionId) -> ProxyResponse {
        let started = Instant::now();

        let Some(session) = self.sessions.validate_and_get(session_id) else {
            debug!("Rejecting request for invalid session {}", session_id);
            return failure(ProxyError::SessionInvalid);
        };

        let decision = self.policy.check(&request.target_url);
        if !decision.is_allowed() {
            debug!("Blocked {}: {:?}", request.target_url, decision);
            return failure(ProxyError::DomainBlocked);
        }

        match self.execute(request, session_id, session.cookies, started).await {
            Ok(response) => response,
            Err(e) => {
                error!("Forwarding {} failed: {}", request.target_url, e);
                let mut response = ProxyResponse::failure(500, e.to_string());
                response.response_time_ms = elapsed_ms(started);
                response
            }
        }
    }

    /// Forwards a cached, rewriting GET of `url`.
    pub async fn get_resource(&self, url: &str, session_id: &SessionId) -> ProxyResponse {
        self.forward(&ProxyRequest::get(url), session_id).await
    }

    async fn execute(
        &self,
        request: &ProxyRequest,
        session_id: &SessionId,
        session_cookies: HashMap<String, String>,
        started: Instant,
    ) -> Result<ProxyResponse> {
        self.sessions
            .set_current_base_url(session_id, &content::base_url_of(&request.target_url));

        let cacheable = self.settings.enable_caching && request.use_cache && request.is_get();

        if cacheable {
            if let Some(entry) = self.cache.get(session_id, &request.target_url) {
                debug!("Cache hit for {}", request.target_url);
                let mut response = entry.response;
                response.from_cache = true;
                response.response_time_ms = elapsed_ms(started);
                return Ok(response);
            }
        }

        let outbound = self.outbound_request(request, &session_cookies);

        let upstream = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| ProxyError::Unavailable(e.to_string()))?;
            self.transport.send(outbound).await?
        };

        let cookies: HashMap<String, String> = upstream
            .header_values("set-cookie")
            .filter_map(parse_set_cookie)
            .collect();
        if !cookies.is_empty() {
            self.sessions
                .merge_cookies(session_id, cookies.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let mut response = self.build_response(request, session_id, &upstream)?;
        response.cookies = cookies;
        response.response_time_ms = elapsed_ms(started);

        info!(
            "{} {} -> {} ({} ms)",
            request.method, request.target_url, response.status_code, response.response_time_ms
        );

        if cacheable && response.is_success() && response.is_text() {
            self.cache.put(
                session_id,
                &request.target_url,
                response.clone(),
                self.settings.cache_ttl(),
            );
        }

        Ok(response)
    }

    fn outbound_request(
        &self,
        request: &ProxyRequest,
        session_cookies: &HashMap<String, String>,
    ) -> OutboundRequest {
        let mut headers: Vec<(String, String)> = DEFAULT_HEADERS
            .iter()
            .map(|&(k, v)| {
                // Bodies are only decoded when compression is on.
                let v = if k == "Accept-Encoding" && !self.settings.enable_compression {
                    IDENTITY_ENCODING
                } else {
                    v
                };
                (k.to_string(), v.to_string())
            })
            .collect();

        if let Some(extra) = &request.headers {
            headers.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let jar = match &request.cookies {
            Some(cookies) if !cookies.is_empty() => cookies,
            _ => session_cookies,
        };
        if let Some(cookie) = cookie_header(jar) {
            headers.push(("Cookie".to_string(), cookie));
        }

        let timeout = if request.timeout_seconds == 0 {
            self.settings.request_timeout()
        } else {
            Duration::from_secs(request.timeout_seconds)
        };

        OutboundRequest {
            method: request.method.clone(),
            url: request.target_url.clone(),
            headers,
            body: request.body.clone().filter(|b| !b.is_empty()),
            timeout,
            follow_redirects: request.follow_redirects,
        }
    }

    fn build_response(
        &self,
        request: &ProxyRequest,
        session_id: &SessionId,
        upstream: &UpstreamResponse,
    ) -> Result<ProxyResponse> {
        let content_type = upstream
            .content_type()
            .unwrap_or(content::DEFAULT_CONTENT_TYPE)
            .to_string();
        let html = is_html(&content_type);

        let mut response = ProxyResponse {
            status_code: upstream.status,
            content_type: content::media_type(&content_type).to_string(),
            headers: joined_headers(&upstream.headers),
            is_html: html,
            ..ProxyResponse::default()
        };

        if is_text_content(&content_type) {
            let text = String::from_utf8_lossy(&upstream.body).into_owned();
            response.content = Some(self.rewrite_text(request, session_id, &content_type, text)?);
        } else {
            response.binary_content = Some(upstream.body.clone());
        }

        if is_redirect_status(upstream.status) {
            response.redirect_url = upstream.header("location").map(str::to_string);
        }

        Ok(response)
    }

    fn rewrite_text(
        &self,
        request: &ProxyRequest,
        session_id: &SessionId,
        content_type: &str,
        text: String,
    ) -> Result<String> {
        if !request.rewrite_urls {
            return Ok(text);
        }

        let proxy_base = self.settings.proxy_base();
        if is_html(content_type) && self.settings.rewrite_html {
            Ok(self
                .rewriter
                .process_html(&text, &request.target_url, proxy_base, session_id.as_str())?)
        } else if is_css(content_type) && self.settings.rewrite_css {
            Ok(self
                .rewriter
                .process_css(&text, &request.target_url, proxy_base, session_id.as_str())?)
        } else {
            Ok(text)
        }
    }
}

fn failure(error: ProxyError) -> ProxyResponse {
    ProxyResponse::failure(error.status_code(), error.to_string())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// `name=value; name=value`, sorted by name, or `None` for an empty jar.
fn cookie_header(cookies: &HashMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let mut pairs: Vec<_> = cookies.iter().collect();
    pairs.sort();
    Some(
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Folds repeated header names into one comma-joined value.
fn joined_headers(headers: &[(String, String)]) -> HashMap<String, String> {
    let mut joined: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        joined
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ferry_core::ManualClock;
    use parking_lot::Mutex;

    use crate::rewrite::RewriteMode;

    type Responder = Box<dyn Fn(&OutboundRequest) -> Result<UpstreamResponse> + Send + Sync>;

    /// Scripted transport that records every request.
    struct FakeTransport {
        responder: Responder,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl FakeTransport {
        fn new<F>(responder: F) -> Arc<Self>
        where
            F: Fn(&OutboundRequest) -> Result<UpstreamResponse> + Send + Sync + 'static,
        {
            Arc::new(Self {
                responder: Box::new(responder),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn serving(status: u16, content_type: &str, body: &[u8]) -> Arc<Self> {
            let response = upstream(status, content_type, body);
            Self::new(move |_| Ok(response.clone()))
        }

        fn calls(&self) -> usize {
            self.seen.lock().len()
        }

        fn last(&self) -> OutboundRequest {
            self.seen.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse> {
            let result = (self.responder)(&request);
            self.seen.lock().push(request);
            result
        }
    }

    fn upstream(status: u16, content_type: &str, body: &[u8]) -> UpstreamResponse {
        UpstreamResponse {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.to_vec(),
        }
    }

    struct Harness {
        engine: ForwardingEngine,
        transport: Arc<FakeTransport>,
        clock: ManualClock,
        session: SessionId,
    }

    fn harness_with(transport: Arc<FakeTransport>, settings: ProxySettings) -> Harness {
        let clock = ManualClock::new();
        let sessions = SessionRegistry::with_clock(Arc::new(clock.clone()));
        let cache = ResponseCache::with_clock(Arc::new(clock.clone()));
        let session = sessions.create("alice", "127.0.0.1").id;
        let engine = ForwardingEngine::new(sessions, cache, transport.clone(), Arc::new(settings));
        Harness {
            engine,
            transport,
            clock,
            session,
        }
    }

    fn harness(transport: Arc<FakeTransport>) -> Harness {
        harness_with(
            transport,
            ProxySettings {
                proxy_base_url: "http://relay".to_string(),
                ..ProxySettings::default()
            },
        )
    }

    fn header<'a>(request: &'a OutboundRequest, name: &str) -> Vec<&'a str> {
        request
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    // ==================== Session And Policy Tests ====================

    #[tokio::test]
    async fn test_invalid_session_is_401() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"hi"));

        let response = h
            .engine
            .forward(&ProxyRequest::get("https://ex.com/"), &SessionId::from_string("nope"))
            .await;

        assert_eq!(response.status_code, 401);
        assert_eq!(response.error.as_deref(), Some("Invalid or expired VPN session"));
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_is_401() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"hi"));
        h.clock.advance(Duration::from_secs(2 * 60 * 60));

        let response = h.engine.get_resource("https://ex.com/", &h.session).await;

        assert_eq!(response.status_code, 401);
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_blocked_domain_is_403() {
        let settings = ProxySettings {
            blocked_domains: vec!["ads.example".to_string()],
            ..ProxySettings::default()
        };
        let h = harness_with(FakeTransport::serving(200, "text/plain", b"x"), settings);

        let response = h.engine.get_resource("https://ads.example.com/x", &h.session).await;

        assert_eq!(response.status_code, 403);
        assert_eq!(response.error.as_deref(), Some("Domain is blocked"));
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_url_is_403() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"x"));
        let response = h.engine.get_resource("not a url", &h.session).await;
        assert_eq!(response.status_code, 403);
    }

    // ==================== Classification Tests ====================

    #[tokio::test]
    async fn test_html_is_rewritten() {
        let h = harness(FakeTransport::serving(
            200,
            "text/html; charset=utf-8",
            br#"<html><head></head><body><a href="/next">n</a></body></html>"#,
        ));

        let response = h.engine.get_resource("https://ex.com/page", &h.session).await;

        assert_eq!(response.status_code, 200);
        assert!(response.is_html);
        assert!(!response.from_cache);
        let content = response.content.unwrap();
        assert!(content.contains("http://relay/api/proxy/resource?url=https%3A%2F%2Fex.com%2Fnext"));
        assert!(content.contains("<script>"));
        assert!(response.binary_content.is_none());

        let session = h.engine.sessions().get(&h.session).unwrap();
        assert_eq!(session.current_base_url, "https://ex.com");
    }

    #[tokio::test]
    async fn test_css_is_rewritten() {
        let h = harness(FakeTransport::serving(200, "text/css", b"a{b:url(i.png)}"));

        let response = h.engine.get_resource("https://ex.com/s/site.css", &h.session).await;

        let content = response.content.unwrap();
        assert!(content.contains("url('http://relay/api/proxy/resource?url=https%3A%2F%2Fex.com%2Fs%2Fi.png"));
        assert!(!response.is_html);
    }

    #[tokio::test]
    async fn test_rewrite_disabled_by_request() {
        let body = r#"<html><head></head><a href="/x">x</a></html>"#;
        let h = harness(FakeTransport::serving(200, "text/html", body.as_bytes()));
        let request = ProxyRequest {
            rewrite_urls: false,
            ..ProxyRequest::get("https://ex.com/")
        };

        let response = h.engine.forward(&request, &h.session).await;

        assert_eq!(response.content.as_deref(), Some(body));
        assert!(response.is_html);
    }

    #[tokio::test]
    async fn test_json_is_text_but_not_rewritten() {
        let h = harness(FakeTransport::serving(200, "application/json", br#"{"u":"/x"}"#));
        let response = h.engine.get_resource("https://ex.com/api", &h.session).await;
        assert_eq!(response.content.as_deref(), Some(r#"{"u":"/x"}"#));
    }

    #[tokio::test]
    async fn test_binary_body_is_untouched_and_not_cached() {
        let png = [0x89, b'P', b'N', b'G', 0x00, 0xff];
        let h = harness(FakeTransport::serving(200, "image/png", &png));

        let first = h.engine.get_resource("https://ex.com/i.png", &h.session).await;
        let second = h.engine.get_resource("https://ex.com/i.png", &h.session).await;

        assert_eq!(first.binary_content.as_deref(), Some(&png[..]));
        assert!(first.content.is_none());
        assert!(!second.from_cache);
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_content_type_is_binary() {
        let transport = FakeTransport::new(|_| {
            Ok(UpstreamResponse {
                status: 200,
                headers: Vec::new(),
                body: b"raw".to_vec(),
            })
        });
        let h = harness(transport);

        let response = h.engine.get_resource("https://ex.com/blob", &h.session).await;

        assert_eq!(response.content_type, "application/octet-stream");
        assert_eq!(response.binary_content.as_deref(), Some(&b"raw"[..]));
    }

    // ==================== Cache Tests ====================

    #[tokio::test]
    async fn test_second_get_is_served_from_cache() {
        let h = harness(FakeTransport::serving(
            200,
            "text/html",
            br#"<html><head></head><img src="a.png"></html>"#,
        ));

        let first = h.engine.get_resource("https://ex.com/", &h.session).await;
        let second = h.engine.get_resource("https://ex.com/", &h.session).await;

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.content, second.content);
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"x"));

        h.engine.get_resource("https://ex.com/", &h.session).await;
        h.clock.advance(Duration::from_secs(10 * 60));
        let again = h.engine.get_resource("https://ex.com/", &h.session).await;

        assert!(!again.from_cache);
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_use_cache_false_bypasses_cache() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"x"));
        let request = ProxyRequest {
            use_cache: false,
            ..ProxyRequest::get("https://ex.com/")
        };

        h.engine.forward(&request, &h.session).await;
        let second = h.engine.forward(&request, &h.session).await;

        assert!(!second.from_cache);
        assert_eq!(h.transport.calls(), 2);
        assert!(h.engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_post_is_not_cached() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"ok"));
        let request = ProxyRequest {
            method: "POST".to_string(),
            body: Some(r#"{"a":1}"#.to_string()),
            ..ProxyRequest::get("https://ex.com/submit")
        };

        h.engine.forward(&request, &h.session).await;
        h.engine.forward(&request, &h.session).await;

        assert_eq!(h.transport.calls(), 2);
        assert_eq!(h.transport.last().body.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(h.transport.last().method, "POST");
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let h = harness(FakeTransport::serving(404, "text/html", b"<p>missing</p>"));

        h.engine.get_resource("https://ex.com/gone", &h.session).await;
        let second = h.engine.get_resource("https://ex.com/gone", &h.session).await;

        assert_eq!(second.status_code, 404);
        assert!(!second.from_cache);
    }

    #[tokio::test]
    async fn test_caching_disabled_in_settings() {
        let settings = ProxySettings {
            enable_caching: false,
            ..ProxySettings::default()
        };
        let h = harness_with(FakeTransport::serving(200, "text/plain", b"x"), settings);

        h.engine.get_resource("https://ex.com/", &h.session).await;
        h.engine.get_resource("https://ex.com/", &h.session).await;

        assert_eq!(h.transport.calls(), 2);
    }

    // ==================== Header And Cookie Tests ====================

    #[tokio::test]
    async fn test_default_and_caller_headers_coexist() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"x"));
        let request = ProxyRequest {
            headers: Some(HashMap::from([("Accept".to_string(), "application/json".to_string())])),
            use_cache: false,
            ..ProxyRequest::get("https://ex.com/")
        };

        h.engine.forward(&request, &h.session).await;

        let sent = h.transport.last();
        let accept = header(&sent, "accept");
        assert_eq!(accept.len(), 2);
        assert!(accept.contains(&"application/json"));
        assert_eq!(header(&sent, "dnt"), vec!["1"]);
        assert!(header(&sent, "user-agent")[0].contains("Mozilla/5.0"));
        assert!(header(&sent, "cookie").is_empty());
    }

    #[tokio::test]
    async fn test_set_cookie_merges_into_session() {
        let transport = FakeTransport::new(|_| {
            Ok(UpstreamResponse {
                status: 200,
                headers: vec![
                    ("content-type".into(), "text/plain".into()),
                    ("set-cookie".into(), "sid=abc; Path=/; HttpOnly".into()),
                    ("set-cookie".into(), "theme=dark".into()),
                ],
                body: b"ok".to_vec(),
            })
        });
        let h = harness(transport);

        let first = h.engine.get_resource("https://ex.com/login", &h.session).await;

        assert_eq!(first.cookies.get("sid").map(String::as_str), Some("abc"));
        assert_eq!(first.headers.get("set-cookie").map(String::as_str), Some("sid=abc; Path=/; HttpOnly, theme=dark"));
        let jar = h.engine.sessions().cookies(&h.session).unwrap();
        assert_eq!(jar.get("theme").map(String::as_str), Some("dark"));

        h.engine.get_resource("https://ex.com/home", &h.session).await;
        assert_eq!(header(&h.transport.last(), "cookie"), vec!["sid=abc; theme=dark"]);
    }

    #[tokio::test]
    async fn test_caller_cookies_replace_session_cookies() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"x"));
        h.engine
            .sessions()
            .merge_cookies(&h.session, [("sid".to_string(), "stored".to_string())]);
        let request = ProxyRequest {
            cookies: Some(HashMap::from([("mine".to_string(), "1".to_string())])),
            ..ProxyRequest::get("https://ex.com/")
        };

        h.engine.forward(&request, &h.session).await;

        assert_eq!(header(&h.transport.last(), "cookie"), vec!["mine=1"]);
    }

    #[tokio::test]
    async fn test_request_options_reach_transport() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"x"));
        let request = ProxyRequest {
            timeout_seconds: 7,
            follow_redirects: false,
            body: Some(String::new()),
            ..ProxyRequest::get("https://ex.com/")
        };

        h.engine.forward(&request, &h.session).await;

        let sent = h.transport.last();
        assert_eq!(sent.timeout, Duration::from_secs(7));
        assert!(!sent.follow_redirects);
        assert!(sent.body.is_none());
    }

    #[tokio::test]
    async fn test_default_timeout_comes_from_settings() {
        let transport = FakeTransport::serving(200, "text/plain", b"x");
        let h = harness_with(
            transport,
            ProxySettings {
                request_timeout_secs: 90,
                ..ProxySettings::default()
            },
        );

        h.engine.get_resource("https://ex.com/a", &h.session).await;
        assert_eq!(h.transport.last().timeout, Duration::from_secs(90));

        let request: ProxyRequest =
            serde_json::from_str(r#"{"targetUrl": "https://ex.com/b"}"#).unwrap();
        h.engine.forward(&request, &h.session).await;
        assert_eq!(h.transport.last().timeout, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_accept_encoding_follows_compression_setting() {
        let h = harness(FakeTransport::serving(200, "text/plain", b"x"));
        h.engine.get_resource("https://ex.com/", &h.session).await;
        assert_eq!(
            header(&h.transport.last(), "accept-encoding"),
            vec!["gzip, deflate, br"]
        );

        let h = harness_with(
            FakeTransport::serving(200, "text/plain", b"x"),
            ProxySettings {
                enable_compression: false,
                ..ProxySettings::default()
            },
        );
        h.engine.get_resource("https://ex.com/", &h.session).await;
        assert_eq!(header(&h.transport.last(), "accept-encoding"), vec!["identity"]);
    }

    #[tokio::test]
    async fn test_envelope_content_type_drops_parameters() {
        let h = harness(FakeTransport::serving(200, "text/html; charset=utf-8", b"<p>x</p>"));

        let response = h.engine.get_resource("https://ex.com/", &h.session).await;

        assert_eq!(response.content_type, "text/html");
        assert!(response.is_html);
    }

    // ==================== Redirect And Failure Tests ====================

    #[tokio::test]
    async fn test_redirect_location_is_surfaced() {
        let transport = FakeTransport::new(|_| {
            Ok(UpstreamResponse {
                status: 302,
                headers: vec![
                    ("content-type".into(), "text/html".into()),
                    ("location".into(), "https://ex.com/elsewhere".into()),
                ],
                body: Vec::new(),
            })
        });
        let h = harness(transport);

        let response = h.engine.get_resource("https://ex.com/", &h.session).await;

        assert_eq!(response.status_code, 302);
        assert_eq!(response.redirect_url.as_deref(), Some("https://ex.com/elsewhere"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_500() {
        let transport = FakeTransport::new(|_| Err(ProxyError::Upstream("connection refused".into())));
        let h = harness(transport);

        let response = h.engine.get_resource("https://ex.com/", &h.session).await;

        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.error.as_deref(),
            Some("upstream request failed: connection refused")
        );
    }

    #[tokio::test]
    async fn test_strict_rewrite_failure_is_500() {
        // The base element cannot be joined onto the page URL.
        let body = r#"<html><head><base href="http://[::1"></head><a href="x">x</a></html>"#;
        let h = harness(FakeTransport::serving(200, "text/html", body.as_bytes()));
        let strict = h
            .engine
            .clone()
            .with_rewriter(RewriteEngine::with_mode(RewriteMode::Strict));

        let failed = strict.get_resource("https://ex.com/", &h.session).await;
        assert_eq!(failed.status_code, 500);
        assert!(failed.error.is_some());
        assert!(h.engine.cache().is_empty());

        let fallback = h.engine.get_resource("https://ex.com/", &h.session).await;
        assert_eq!(fallback.status_code, 200);
        assert_eq!(fallback.content.as_deref(), Some(body));
    }

    // ==================== Helper Tests ====================

    #[test]
    fn test_cookie_header_is_sorted() {
        let jar = HashMap::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        assert_eq!(cookie_header(&jar).as_deref(), Some("a=1; b=2"));
        assert_eq!(cookie_header(&HashMap::new()), None);
    }

    #[test]
    fn test_joined_headers() {
        let joined = joined_headers(&[
            ("Vary".into(), "Accept".into()),
            ("vary".into(), "Origin".into()),
            ("X-One".into(), "1".into()),
        ]);
        assert_eq!(joined.get("vary").map(String::as_str), Some("Accept, Origin"));
        assert_eq!(joined.get("x-one").map(String::as_str), Some("1"));
    }
}
