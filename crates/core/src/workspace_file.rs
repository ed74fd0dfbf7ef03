// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracked workspace files. Bytes live in the object store; this row is
//! the catalog entry.

use crate::ids::ConversationId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceFileSource {
    UserUpload,
    AiCreated,
    AiModified,
}

crate::simple_display! {
    WorkspaceFileSource {
        UserUpload => "user_upload",
        AiCreated => "ai_created",
        AiModified => "ai_modified",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceFile {
    pub conversation_id: ConversationId,
    pub path: String,
    pub size: u64,
    pub content_type: String,
    pub source: WorkspaceFileSource,
    /// Set only by an explicit `present_files` tool call from the agent
    /// (design decision (b) in DESIGN.md) — never inferred from `path`.
    pub is_presented: bool,
    pub checksum: String,
    pub updated_at_ms: u64,
}

/// Metadata for one client-uploaded attachment accompanying a request
/// (spec §4.6). `filename` carries a collision-proof identifier;
/// `original_name` is display-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub original_name: String,
    pub relative_path: String,
    pub original_relative_path: String,
    pub content_type: String,
    pub size: u64,
}
