// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("row at {0} was malformed: {1}")]
    Malformed(String, serde_json::Error),

    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    #[error("blocking task panicked: {0}")]
    JoinError(String),
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::JoinError(e.to_string())
    }
}
