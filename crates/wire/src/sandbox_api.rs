// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTOs for the sandbox agent API (spec §6): `/health`, `/execute`
//! (newline-delimited JSON events), `/exec`, `/exec/binary`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Body of `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub user_input: String,
    /// Resume handle for multi-turn context; `None` on the first turn.
    pub resume_session_id: Option<String>,
    pub allowed_tools: Vec<String>,
    pub model: String,
    /// Ephemeral tokens made available to the credential-injection proxy
    /// for this execution only (spec §4.5).
    pub ephemeral_tokens: HashMap<String, String>,
}

/// One line of the `/execute` NDJSON response body. This is the
/// in-sandbox agent's own event shape, re-serialized by the orchestrator
/// into [`wco_core::StreamEvent`] (spec §4.2 step 7) — intentionally a
/// separate, looser type since the sandbox agent is not required to
/// match the orchestrator's wire taxonomy exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEventLine {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: serde_json::Value,
}

/// Body of `POST /exec` and `POST /exec/binary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResponse {
    pub exit_code: i32,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecBinaryResponse {
    pub exit_code: i32,
    #[serde(with = "base64_bytes")]
    pub output: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_binary_response_round_trips_bytes() {
        let resp = ExecBinaryResponse { exit_code: 0, output: vec![0, 1, 2, 255, 254, 253, 10] };
        let json = serde_json::to_string(&resp).unwrap();
        let back: ExecBinaryResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.output, resp.output);
        assert_eq!(back.exit_code, 0);
    }

    #[test]
    fn agent_event_line_keeps_extra_fields() {
        let json = r#"{"type":"assistant","text":"hi"}"#;
        let line: AgentEventLine = serde_json::from_str(json).unwrap();
        assert_eq!(line.kind, "assistant");
        assert_eq!(line.fields["text"], "hi");
    }
}
