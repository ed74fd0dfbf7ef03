// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request DTOs for `POST /api/tenants/{tenant}/conversations/{conv}/stream`
//! (spec §6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wco_core::AttachmentMeta;

/// The `executor` field identifying who issued the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Executor {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub employee_id: Option<String>,
}

/// The JSON-encoded `request_data` multipart field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestData {
    pub user_input: String,
    pub executor: Executor,
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    #[serde(default)]
    pub preferred_skills: Vec<String>,
}

/// A fully parsed `/stream` request: `request_data` plus uploaded file
/// bytes paired with their metadata (`file_metadata` is 1:1 aligned with
/// `files[]` in the multipart body).
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub request_data: RequestData,
    pub attachments: Vec<(AttachmentMeta, Vec<u8>)>,
}
