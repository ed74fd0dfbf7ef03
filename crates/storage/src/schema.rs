// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog schema. `input_tokens`/`output_tokens` are deliberately not
//! columns on `conversations` — they are derived at read time as a
//! `SUM` over `usage_log` rows (see `store.rs`) so accumulation survives
//! idempotent replay (spec §3, §8; DESIGN.md).

use crate::error::StorageError;
use rusqlite::Connection;

pub fn initialize(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            session_id TEXT,
            status TEXT NOT NULL,
            estimated_context_tokens INTEGER NOT NULL DEFAULT 0,
            context_window INTEGER NOT NULL DEFAULT 0,
            title TEXT
        );

        CREATE TABLE IF NOT EXISTS message_log (
            conversation_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, seq)
        );

        CREATE TABLE IF NOT EXISTS usage_log (
            execution_id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            turn_count INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            by_model TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS usage_log_conversation_idx
            ON usage_log (conversation_id);

        CREATE TABLE IF NOT EXISTS workspace_file (
            conversation_id TEXT NOT NULL,
            path TEXT NOT NULL,
            size INTEGER NOT NULL,
            content_type TEXT NOT NULL,
            source TEXT NOT NULL,
            is_presented INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, path)
        );
        ",
    )?;
    Ok(())
}
