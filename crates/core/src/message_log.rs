// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-conversation append-only message log.

use crate::ids::ConversationId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLogType {
    User,
    Assistant,
    ToolUse,
    ToolResult,
    System,
    Result,
}

crate::simple_display! {
    MessageLogType {
        User => "user",
        Assistant => "assistant",
        ToolUse => "tool_use",
        ToolResult => "tool_result",
        System => "system",
        Result => "result",
    }
}

/// One row of the message log. `seq` is per-conversation, starts at 1,
/// and increments only on successful persist (spec §3, §8
/// "Seq monotonicity").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLogRow {
    pub conversation_id: ConversationId,
    pub seq: u64,
    pub kind: MessageLogType,
    /// Opaque payload, typically the event's JSON body.
    pub content: serde_json::Value,
    pub created_at_ms: u64,
}
