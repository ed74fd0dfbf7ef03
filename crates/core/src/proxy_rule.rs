// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant-provided MCP rules consumed by the credential-injection proxy.
//!
//! Scoped to a single execution: pushed at "install runtime configuration"
//! (spec §4.2 step 5) and never persisted beyond the life of that request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A mapping of an outbound-host pattern to a header template. Template
/// values may contain `${token_name}` placeholders substituted from the
/// in-flight execution's ephemeral token map (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRule {
    pub host_pattern: String,
    pub header_templates: HashMap<String, String>,
}

impl ProxyRule {
    /// Whether `host` matches this rule's pattern. Patterns may start
    /// with `*.` to match any subdomain.
    pub fn matches(&self, host: &str) -> bool {
        match self.host_pattern.strip_prefix("*.") {
            Some(suffix) => host == suffix || host.ends_with(&format!(".{suffix}")),
            None => host == self.host_pattern,
        }
    }

    /// Render this rule's header templates, substituting `${name}` from
    /// `tokens`. Unresolved placeholders are left verbatim.
    pub fn render_headers(&self, tokens: &HashMap<String, String>) -> HashMap<String, String> {
        self.header_templates
            .iter()
            .map(|(k, template)| (k.clone(), substitute(template, tokens)))
            .collect()
    }
}

fn substitute(template: &str, tokens: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find('}') {
            let name = &after[..end];
            match tokens.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    out.push_str("${");
                    out.push_str(name);
                    out.push('}');
                }
            }
            rest = &after[end + 1..];
        } else {
            out.push_str("${");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_subdomains() {
        let rule = ProxyRule { host_pattern: "*.example.com".into(), header_templates: HashMap::new() };
        assert!(rule.matches("api.example.com"));
        assert!(rule.matches("example.com"));
        assert!(!rule.matches("example.org"));
    }

    #[test]
    fn substitutes_known_tokens_and_leaves_unknown() {
        let mut tokens = HashMap::new();
        tokens.insert("api_key".to_string(), "secret123".to_string());
        let rendered = substitute("Bearer ${api_key} / ${missing}", &tokens);
        assert_eq!(rendered, "Bearer secret123 / ${missing}");
    }
}
