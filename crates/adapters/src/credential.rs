// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution of the signing credential used by the credential-injection
//! proxy (spec §4.5). The fallback chain is the same shape the teacher
//! uses to locate an agent's model credential
//! (`crates/daemon/src/adapters/credential.rs`); the injection point is
//! different here — these credentials sign *outbound proxy requests*,
//! they are never forwarded into the sandbox.

use std::collections::HashMap;

/// A resolved signing credential for a cloud-provider inference API.
#[derive(Clone)]
pub enum SigningCredential {
    OAuthToken(String),
    ApiKey(String),
}

impl SigningCredential {
    /// Compute the header(s) this credential contributes to a signed
    /// request. Real cloud-provider request signing (SigV4, etc.) is out
    /// of scope here; this returns the bearer/API-key header the proxy
    /// attaches before forwarding.
    pub fn to_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        match self {
            SigningCredential::OAuthToken(token) => {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
            SigningCredential::ApiKey(key) => {
                headers.insert("X-Api-Key".to_string(), key.clone());
            }
        }
        headers
    }
}

/// Resolve the signing credential for the configured inference API:
/// env var -> OS keychain -> config file -> secondary env var.
pub fn resolve() -> Option<SigningCredential> {
    if let Ok(token) = std::env::var("WCO_SIGNING_OAUTH_TOKEN") {
        if !token.is_empty() {
            return Some(SigningCredential::OAuthToken(token));
        }
    }

    if let Some(token) = resolve_from_keychain() {
        return Some(SigningCredential::OAuthToken(token));
    }

    if let Some(key) = resolve_from_config_file() {
        return Some(SigningCredential::ApiKey(key));
    }

    if let Ok(key) = std::env::var("WCO_SIGNING_API_KEY") {
        if !key.is_empty() {
            return Some(SigningCredential::ApiKey(key));
        }
    }

    None
}

#[cfg(target_os = "macos")]
fn resolve_from_keychain() -> Option<String> {
    let output = std::process::Command::new("security")
        .args(["find-generic-password", "-s", "wco-signing-credential", "-w"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(not(target_os = "macos"))]
fn resolve_from_keychain() -> Option<String> {
    None
}

fn resolve_from_config_file() -> Option<String> {
    let home = dirs::home_dir()?;
    let path = home.join(".wco").join("credentials.json");
    let contents = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&contents).ok()?;
    value.get("apiKey")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_token_renders_bearer_header() {
        let cred = SigningCredential::OAuthToken("tok123".into());
        let headers = cred.to_headers();
        assert_eq!(headers.get("Authorization"), Some(&"Bearer tok123".to_string()));
    }

    #[test]
    fn api_key_renders_header() {
        let cred = SigningCredential::ApiKey("key456".into());
        let headers = cred.to_headers();
        assert_eq!(headers.get("X-Api-Key"), Some(&"key456".to_string()));
    }
}
