// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The forwarded event taxonomy (spec §4.2), re-serialized by the
//! orchestrator onto the caller's SSE stream.
//!
//! Serializes with `{"type": "event:name", ...fields}`, matching the
//! tagged-enum convention used throughout this codebase's event types.

use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneStatus {
    Success,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Generating,
    Tool,
    /// Emitted only when the active model is in the engine's
    /// extended-reasoning allow-list (`EngineConfig::extended_reasoning_models`,
    /// spec §9(c)); otherwise the progress line is dropped entirely, not
    /// forwarded with a placeholder.
    Thinking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "init")]
    Init { session_id: String, tools: Vec<String>, model: String },

    #[serde(rename = "assistant")]
    Assistant {
        /// Text-only content blocks; non-text blocks are dropped at the
        /// boundary per spec §4.2.
        text: Vec<String>,
        /// Present when this event was produced by a nested subagent.
        parent_agent_id: Option<String>,
    },

    #[serde(rename = "tool_call")]
    ToolCall {
        tool_use_id: String,
        tool_name: String,
        /// Truncated input preview, not the full payload.
        input_preview: String,
        summary: String,
        parent_agent_id: Option<String>,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        status: String,
        content_preview: String,
        is_error: bool,
        parent_agent_id: Option<String>,
    },

    #[serde(rename = "subagent_start")]
    SubagentStart { agent_id: String, agent_type: String, model: String },

    #[serde(rename = "subagent_end")]
    SubagentEnd { agent_id: String, status: String, preview: String },

    #[serde(rename = "progress")]
    Progress {
        kind: ProgressKind,
        message: String,
        tool_name: Option<String>,
        tool_use_id: Option<String>,
    },

    /// At most once per conversation (first turn only).
    #[serde(rename = "title")]
    Title { title: String },

    #[serde(rename = "ping")]
    Ping { elapsed_ms: u64 },

    /// Once, immediately before `done`.
    #[serde(rename = "context_status")]
    ContextStatus {
        current_tokens: u64,
        max_tokens: u64,
        usage_pct: f64,
        warning_level: crate::conversation::ContextWarningLevel,
    },

    /// Once, last. Terminates the stream on success.
    #[serde(rename = "done")]
    Done {
        status: DoneStatus,
        result_preview: String,
        by_model_cost_usd: HashMap<String, f64>,
        total_cost_usd: f64,
        turn_count: u32,
        duration_ms: u64,
        session_id: String,
    },

    /// Terminates the stream.
    #[serde(rename = "error")]
    Error { error: OrchestratorError, recoverable: bool },
}

impl StreamEvent {
    /// Whether this variant is allowed to be the final frame of a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }

    /// The SSE `event:` field name.
    pub fn wire_type(&self) -> &'static str {
        match self {
            StreamEvent::Init { .. } => "init",
            StreamEvent::Assistant { .. } => "assistant",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::SubagentStart { .. } => "subagent_start",
            StreamEvent::SubagentEnd { .. } => "subagent_end",
            StreamEvent::Progress { .. } => "progress",
            StreamEvent::Title { .. } => "title",
            StreamEvent::Ping { .. } => "ping",
            StreamEvent::ContextStatus { .. } => "context_status",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_done_and_error_are_terminal() {
        assert!(!StreamEvent::Ping { elapsed_ms: 0 }.is_terminal());
        assert!(StreamEvent::Done {
            status: DoneStatus::Success,
            result_preview: String::new(),
            by_model_cost_usd: HashMap::new(),
            total_cost_usd: 0.0,
            turn_count: 1,
            duration_ms: 10,
            session_id: "s".into(),
        }
        .is_terminal());
        assert!(StreamEvent::Error { error: OrchestratorError::TimeoutError { secs: 300 }, recoverable: true }
            .is_terminal());
    }

    #[test]
    fn wire_type_matches_serde_tag() {
        let ev = StreamEvent::Ping { elapsed_ms: 5 };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "ping");
        assert_eq!(ev.wire_type(), "ping");
    }
}
