// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The co-located proxy used by the local backend: a forward-proxy HTTP
//! listener the daemon spawns per sandbox, configured by an in-process
//! method call rather than an admin HTTP round-trip. The sandbox is
//! given this listener's address via `HTTP_PROXY`/`HTTPS_PROXY` (spec
//! §6); every outbound request it sends arrives here in absolute-URI
//! form, gets checked against the allow-list, signed, and forwarded.

use super::{CredentialProxy, ProxyError};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use wco_core::{ContainerId, ProxyRule};

/// Absolute cap on a proxied request/response body; sandbox traffic is
/// small tool-call and inference payloads, not file transfer.
const MAX_PROXY_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone, Default)]
struct RuleSet {
    rules: Vec<ProxyRule>,
    tokens: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct InProcessProxy {
    rules: Arc<RwLock<HashMap<ContainerId, RuleSet>>>,
    listeners: Arc<Mutex<HashMap<ContainerId, tokio::task::JoinHandle<()>>>>,
}

impl InProcessProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the rules currently enforced for `container_id`, as read by
    /// `workspacectl` diagnostics and tests; the data-plane listener
    /// consults [`Self::headers_for`] directly instead.
    pub fn rules_for(&self, container_id: &ContainerId) -> Vec<ProxyRule> {
        self.rules.read().get(container_id).map(|set| set.rules.clone()).unwrap_or_default()
    }

    pub fn set_rules(&self, container_id: ContainerId, rules: Vec<ProxyRule>, tokens: HashMap<String, String>) {
        self.rules.write().insert(container_id, RuleSet { rules, tokens });
    }

    pub fn remove_rules(&self, container_id: &ContainerId) {
        self.rules.write().remove(container_id);
    }

    /// Resolve the headers to attach for an outbound request to `host`
    /// from `container_id`'s sandbox: the first matching rule's
    /// templates, rendered against that execution's ephemeral tokens,
    /// merged with the daemon's own signing credential. `None` means no
    /// rule allow-lists `host` and the request must be rejected.
    fn headers_for(&self, container_id: &ContainerId, host: &str) -> Option<HashMap<String, String>> {
        let guard = self.rules.read();
        let set = guard.get(container_id)?;
        let rule = set.rules.iter().find(|rule| rule.matches(host))?;
        let mut headers = rule.render_headers(&set.tokens);
        if let Some(credential) = crate::credential::resolve() {
            headers.extend(credential.to_headers());
        }
        Some(headers)
    }

    /// Bind and run the forward-proxy listener for one sandbox. Every
    /// request is resolved through [`Self::headers_for`] and either
    /// rejected (host not allow-listed) or forwarded upstream with the
    /// resolved headers merged in. Runs until the listener is aborted by
    /// [`Self::stop_listener`] or the bind itself fails.
    pub async fn serve(self, container_id: ContainerId, addr: SocketAddr) -> std::io::Result<()> {
        let state = ListenerState { proxy: self, container_id, http: reqwest::Client::new() };
        let app = axum::Router::new().fallback(forward).with_state(state);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await
    }

    /// Record the listener task for `container_id` so it can be aborted
    /// on container destroy rather than leaking a bound socket for the
    /// lifetime of the daemon process.
    pub fn track_listener(&self, container_id: ContainerId, handle: tokio::task::JoinHandle<()>) {
        self.listeners.lock().insert(container_id, handle);
    }

    /// Abort the listener task for `container_id` and drop its rules.
    pub fn stop_listener(&self, container_id: &ContainerId) {
        if let Some(handle) = self.listeners.lock().remove(container_id) {
            handle.abort();
        }
        self.remove_rules(container_id);
    }
}

#[derive(Clone)]
struct ListenerState {
    proxy: InProcessProxy,
    container_id: ContainerId,
    http: reqwest::Client,
}

/// The single handler for every request this listener accepts: it never
/// routes on path, only on the absolute-URI authority the sandbox's HTTP
/// client addressed (standard forward-proxy behavior).
async fn forward(State(state): State<ListenerState>, req: axum::extract::Request) -> Response {
    let uri = req.uri().clone();
    let Some(host) = uri.host().map(str::to_string) else {
        return (StatusCode::BAD_REQUEST, "proxy requires an absolute-form request target").into_response();
    };

    let Some(extra_headers) = state.proxy.headers_for(&state.container_id, &host) else {
        return (StatusCode::FORBIDDEN, format!("{host} is not allow-listed for this sandbox")).into_response();
    };

    let method = req.method().clone();
    let mut headers = req.headers().clone();
    let body = match axum::body::to_bytes(req.into_body(), MAX_PROXY_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    for (name, value) in &extra_headers {
        let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) else {
            continue;
        };
        headers.insert(name, value);
    }
    headers.remove(axum::http::header::HOST);

    let upstream = state.http.request(method, uri.to_string()).headers(headers).body(body).send().await;
    match upstream {
        Ok(resp) => {
            let status = resp.status();
            let resp_headers = resp.headers().clone();
            let bytes = resp.bytes().await.unwrap_or_default();
            let mut builder = Response::builder().status(status);
            for (name, value) in &resp_headers {
                builder = builder.header(name, value);
            }
            builder.body(axum::body::Body::from(bytes)).unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
        }
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

/// A per-sandbox handle bound at proxy-configuration time, satisfying
/// [`CredentialProxy`] against a single container's rule slot.
pub struct InProcessHandle {
    proxy: InProcessProxy,
    container_id: ContainerId,
}

impl InProcessHandle {
    pub fn new(proxy: InProcessProxy, container_id: ContainerId) -> Self {
        Self { proxy, container_id }
    }
}

#[async_trait]
impl CredentialProxy for InProcessHandle {
    async fn update_rules(&self, rules: &[ProxyRule], tokens: &HashMap<String, String>) -> Result<(), ProxyError> {
        self.proxy.set_rules(self.container_id.clone(), rules.to_vec(), tokens.clone());
        Ok(())
    }

    async fn health(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_read_round_trips() {
        let proxy = InProcessProxy::new();
        let id: ContainerId = "cnt-abcdefghijklmnopqrs".into();
        assert!(proxy.rules_for(&id).is_empty());
        let rule = ProxyRule { host_pattern: "*.anthropic.com".to_string(), header_templates: HashMap::new() };
        proxy.set_rules(id.clone(), vec![rule], HashMap::new());
        assert_eq!(proxy.rules_for(&id).len(), 1);
    }

    #[test]
    fn headers_for_rejects_unlisted_host() {
        let proxy = InProcessProxy::new();
        let id: ContainerId = "cnt-abcdefghijklmnopqrs".into();
        let rule = ProxyRule { host_pattern: "*.anthropic.com".to_string(), header_templates: HashMap::new() };
        proxy.set_rules(id.clone(), vec![rule], HashMap::new());
        assert!(proxy.headers_for(&id, "evil.example.com").is_none());
    }

    #[test]
    fn headers_for_renders_templates_from_tokens() {
        let proxy = InProcessProxy::new();
        let id: ContainerId = "cnt-abcdefghijklmnopqrs".into();
        let mut templates = HashMap::new();
        templates.insert("Authorization".to_string(), "Bearer ${api_key}".to_string());
        let rule = ProxyRule { host_pattern: "*.anthropic.com".to_string(), header_templates: templates };
        let mut tokens = HashMap::new();
        tokens.insert("api_key".to_string(), "secret123".to_string());
        proxy.set_rules(id.clone(), vec![rule], tokens);

        let headers = proxy.headers_for(&id, "api.anthropic.com").expect("host allow-listed");
        assert_eq!(headers.get("Authorization"), Some(&"Bearer secret123".to_string()));
    }

    #[test]
    fn remove_rules_clears_the_container_slot() {
        let proxy = InProcessProxy::new();
        let id: ContainerId = "cnt-abcdefghijklmnopqrs".into();
        let rule = ProxyRule { host_pattern: "*.anthropic.com".to_string(), header_templates: HashMap::new() };
        proxy.set_rules(id.clone(), vec![rule], HashMap::new());
        proxy.remove_rules(&id);
        assert!(proxy.rules_for(&id).is_empty());
    }
}
