// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sidecar proxy used by the remote backend: a separate container
//! in the sandbox pod (see [`crate::backend::remote`]), configured over
//! its admin HTTP surface (spec §4.5, §6).

use super::{CredentialProxy, ProxyError};
use async_trait::async_trait;
use std::collections::HashMap;
use wco_core::ProxyRule;

#[derive(Clone)]
pub struct SidecarProxy {
    http: reqwest::Client,
    endpoint: String,
}

impl SidecarProxy {
    /// `endpoint` is the sidecar's host:port within the pod, e.g.
    /// `"10.1.2.3:8089"`.
    pub fn new(endpoint: String) -> Self {
        Self { http: reqwest::Client::new(), endpoint }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.endpoint)
    }
}

#[derive(serde::Serialize)]
struct UpdateRulesBody<'a> {
    rules: &'a [ProxyRule],
    tokens: &'a HashMap<String, String>,
}

#[async_trait]
impl CredentialProxy for SidecarProxy {
    async fn update_rules(&self, rules: &[ProxyRule], tokens: &HashMap<String, String>) -> Result<(), ProxyError> {
        let resp = self
            .http
            .post(self.url("/admin/update-rules"))
            .json(&UpdateRulesBody { rules, tokens })
            .send()
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProxyError::RuleRejected(format!("sidecar returned {}", resp.status())));
        }
        Ok(())
    }

    async fn health(&self) -> bool {
        self.http.get(self.url("/health")).send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_endpoint_and_path() {
        let proxy = SidecarProxy::new("10.1.2.3:8089".to_string());
        assert_eq!(proxy.url("/health"), "http://10.1.2.3:8089/health");
    }
}
