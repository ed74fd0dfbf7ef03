// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog persistence. Every public method dispatches its blocking
//! `rusqlite` call onto `spawn_blocking` so the streaming bridge never
//! stalls waiting on disk I/O (spec §5, §9 "cooperative suspension of
//! synchronous client libraries").
//!
//! Per spec §5's "database sessions" note, a request handler and the
//! background task it spawns to drive the execution hold *separate*
//! `Store` handles (each wrapping its own `rusqlite::Connection`) so
//! that a request-scoped cleanup never closes the connection the
//! background task is still using to persist message/usage rows after
//! a client disconnect.

use crate::error::StorageError;
use crate::schema;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wco_core::{
    ContextWarningLevel, Conversation, ConversationId, ConversationStatus, ExecutionId,
    MessageLogRow, MessageLogType, ModelUsage, TenantId, UsageLog, WorkspaceFile,
    WorkspaceFileSource,
};

#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open a fresh connection against the catalog database at `path`,
    /// running migrations if needed. Call this once per logical
    /// session (request-scoped read, or the spawned execution task) —
    /// see the module doc on session bifurcation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let owned = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StorageError> {
            let conn = Connection::open(&owned)?;
            schema::initialize(&conn)?;
            Ok(conn)
        })
        .await??;
        Ok(Self { path, conn: Arc::new(Mutex::new(conn)) })
    }

    /// Open a second, independent connection against the same database
    /// file this handle was opened from. Used by the request handler to
    /// hand the spawned streaming task its own session.
    pub async fn open_sibling(&self) -> Result<Self, StorageError> {
        Self::open(&self.path).await
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await?
    }

    pub async fn create_conversation(
        &self,
        tenant_id: TenantId,
        context_window: u64,
    ) -> Result<Conversation, StorageError> {
        let id = ConversationId::new();
        let conv = Conversation {
            id: id.clone(),
            tenant_id,
            session_id: None,
            status: ConversationStatus::Active,
            input_tokens: 0,
            output_tokens: 0,
            estimated_context_tokens: 0,
            context_window,
            title: None,
        };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, tenant_id, session_id, status, estimated_context_tokens, context_window, title)
                 VALUES (?1, ?2, NULL, ?3, 0, ?4, NULL)",
                params![conv.id.as_str(), conv.tenant_id.as_str(), status_str(conv.status), conv.context_window],
            )?;
            Ok(())
        })
        .await?;
        Ok(conv)
    }

    pub async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StorageError> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT tenant_id, session_id, status, estimated_context_tokens, context_window, title
                     FROM conversations WHERE id = ?1",
                    params![id.as_str()],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, Option<String>>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, u64>(3)?,
                            r.get::<_, u64>(4)?,
                            r.get::<_, Option<String>>(5)?,
                        ))
                    },
                )
                .optional()?;
            let Some((tenant_id, session_id, status, estimated_context_tokens, context_window, title)) = row else {
                return Ok(None);
            };
            let mut stmt = conn.prepare("SELECT by_model FROM usage_log WHERE conversation_id = ?1")?;
            let mut input_tokens = 0u64;
            let mut output_tokens = 0u64;
            let rows = stmt.query_map(params![id.as_str()], |r| r.get::<_, String>(0))?;
            for row in rows {
                let by_model: std::collections::HashMap<String, ModelUsage> =
                    serde_json::from_str(&row?).map_err(|e| StorageError::Malformed("usage_log.by_model".into(), e))?;
                for usage in by_model.values() {
                    input_tokens += usage.input_tokens;
                    output_tokens += usage.output_tokens;
                }
            }
            Ok(Some(Conversation {
                id,
                tenant_id: TenantId::from(tenant_id),
                session_id,
                status: parse_status(&status),
                input_tokens,
                output_tokens,
                estimated_context_tokens,
                context_window,
                title,
            }))
        })
        .await
    }

    pub async fn set_estimated_context_tokens(
        &self,
        id: &ConversationId,
        tokens: u64,
    ) -> Result<(), StorageError> {
        let id = id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE conversations SET estimated_context_tokens = ?2 WHERE id = ?1",
                params![id.as_str(), tokens],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_session_id(
        &self,
        id: &ConversationId,
        session_id: &str,
    ) -> Result<(), StorageError> {
        let id = id.clone();
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE conversations SET session_id = ?2 WHERE id = ?1",
                params![id.as_str(), session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_title(&self, id: &ConversationId, title: &str) -> Result<(), StorageError> {
        let id = id.clone();
        let title = title.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE conversations SET title = ?2 WHERE id = ?1",
                params![id.as_str(), title],
            )?;
            Ok(())
        })
        .await
    }

    /// Append one row, assigning it the next per-conversation `seq`
    /// (starts at 1, increments by exactly 1 — spec §8 "seq
    /// monotonicity"). The conversation lock already serializes writers,
    /// so a plain select-then-insert is race-free in practice.
    pub async fn append_message_log(
        &self,
        conversation_id: &ConversationId,
        kind: MessageLogType,
        content: serde_json::Value,
        created_at_ms: u64,
    ) -> Result<MessageLogRow, StorageError> {
        let conversation_id = conversation_id.clone();
        self.with_conn(move |conn| {
            let next_seq: u64 = conn.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM message_log WHERE conversation_id = ?1",
                params![conversation_id.as_str()],
                |r| r.get(0),
            )?;
            let content_str = content.to_string();
            conn.execute(
                "INSERT INTO message_log (conversation_id, seq, kind, content, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![conversation_id.as_str(), next_seq, kind.to_string(), content_str, created_at_ms],
            )?;
            Ok(MessageLogRow { conversation_id, seq: next_seq, kind, content, created_at_ms })
        })
        .await
    }

    /// Insert a usage row for one execution. Insert-once on
    /// `execution_id`: a retried insert for an execution that already
    /// landed is a silent no-op, which is what keeps token accumulation
    /// idempotent under retried writes (DESIGN.md).
    pub async fn insert_usage_log(&self, log: &UsageLog) -> Result<(), StorageError> {
        let log = log.clone();
        self.with_conn(move |conn| {
            let by_model = serde_json::to_string(&log.by_model)
                .map_err(|e| StorageError::Malformed("usage_log.by_model".into(), e))?;
            conn.execute(
                "INSERT INTO usage_log (execution_id, conversation_id, turn_count, duration_ms, by_model, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(execution_id) DO NOTHING",
                params![
                    log.execution_id.as_str(),
                    log.conversation_id.as_str(),
                    log.turn_count,
                    log.duration_ms,
                    by_model,
                    log.created_at_ms,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_usage_log(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<UsageLog>, StorageError> {
        let execution_id = execution_id.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT conversation_id, turn_count, duration_ms, by_model, created_at_ms
                 FROM usage_log WHERE execution_id = ?1",
                params![execution_id.as_str()],
                |r| {
                    let conversation_id: String = r.get(0)?;
                    let turn_count: u32 = r.get(1)?;
                    let duration_ms: u64 = r.get(2)?;
                    let by_model: String = r.get(3)?;
                    let created_at_ms: u64 = r.get(4)?;
                    Ok((conversation_id, turn_count, duration_ms, by_model, created_at_ms))
                },
            )
            .optional()?
            .map(|(conversation_id, turn_count, duration_ms, by_model, created_at_ms)| {
                let by_model = serde_json::from_str::<std::collections::HashMap<String, ModelUsage>>(&by_model)
                    .map_err(|e| StorageError::Malformed("usage_log.by_model".into(), e))?;
                Ok(UsageLog {
                    execution_id: execution_id.clone(),
                    conversation_id: ConversationId::from(conversation_id),
                    turn_count,
                    duration_ms,
                    by_model,
                    created_at_ms,
                })
            })
            .transpose()
        })
        .await
    }

    pub async fn upsert_workspace_file(&self, file: &WorkspaceFile) -> Result<(), StorageError> {
        let file = file.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO workspace_file (conversation_id, path, size, content_type, source, is_presented, checksum, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(conversation_id, path) DO UPDATE SET
                    size = excluded.size,
                    content_type = excluded.content_type,
                    source = excluded.source,
                    is_presented = excluded.is_presented,
                    checksum = excluded.checksum,
                    updated_at_ms = excluded.updated_at_ms",
                params![
                    file.conversation_id.as_str(),
                    file.path,
                    file.size,
                    file.content_type,
                    source_str(file.source),
                    file.is_presented as i64,
                    file.checksum,
                    file.updated_at_ms,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_workspace_files(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<WorkspaceFile>, StorageError> {
        let conversation_id = conversation_id.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT path, size, content_type, source, is_presented, checksum, updated_at_ms
                 FROM workspace_file WHERE conversation_id = ?1 ORDER BY path",
            )?;
            let rows = stmt
                .query_map(params![conversation_id.as_str()], |r| {
                    Ok(WorkspaceFile {
                        conversation_id: conversation_id.clone(),
                        path: r.get(0)?,
                        size: r.get(1)?,
                        content_type: r.get(2)?,
                        source: parse_source(&r.get::<_, String>(3)?),
                        is_presented: r.get::<_, i64>(4)? != 0,
                        checksum: r.get(5)?,
                        updated_at_ms: r.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Context status for the event emitted just before `done` (spec
    /// §4.2 step 8).
    pub fn context_warning(conversation: &Conversation) -> ContextWarningLevel {
        conversation.warning_level()
    }
}

fn status_str(status: ConversationStatus) -> &'static str {
    match status {
        ConversationStatus::Active => "active",
        ConversationStatus::Closed => "closed",
    }
}

fn parse_status(s: &str) -> ConversationStatus {
    match s {
        "closed" => ConversationStatus::Closed,
        _ => ConversationStatus::Active,
    }
}

fn source_str(source: WorkspaceFileSource) -> &'static str {
    match source {
        WorkspaceFileSource::UserUpload => "user_upload",
        WorkspaceFileSource::AiCreated => "ai_created",
        WorkspaceFileSource::AiModified => "ai_modified",
    }
}

fn parse_source(s: &str) -> WorkspaceFileSource {
    match s {
        "user_upload" => WorkspaceFileSource::UserUpload,
        "ai_created" => WorkspaceFileSource::AiCreated,
        _ => WorkspaceFileSource::AiModified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    async fn test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("catalog.sqlite3")).await.expect("open store");
        (store, dir)
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let (store, _dir) = test_store().await;
        let conv = store.create_conversation(TenantId::new(), 200_000).await.expect("create");
        let fetched = store.get_conversation(&conv.id).await.expect("get").expect("present");
        assert_eq!(fetched.id, conv.id);
        assert_eq!(fetched.context_window, 200_000);
        assert_eq!(fetched.input_tokens, 0);
    }

    #[tokio::test]
    async fn usage_log_accumulates_across_executions() {
        let (store, _dir) = test_store().await;
        let conv = store.create_conversation(TenantId::new(), 200_000).await.expect("create");

        for (input, output) in [(10u64, 5u64), (20, 7)] {
            let mut by_model = std::collections::HashMap::new();
            by_model.insert(
                "claude".to_string(),
                ModelUsage { input_tokens: input, output_tokens: output, ..Default::default() },
            );
            let log = UsageLog {
                execution_id: ExecutionId::new(),
                conversation_id: conv.id.clone(),
                turn_count: 1,
                duration_ms: 100,
                by_model,
                created_at_ms: 0,
            };
            store.insert_usage_log(&log).await.expect("insert");
        }

        let fetched = store.get_conversation(&conv.id).await.expect("get").expect("present");
        assert_eq!(fetched.input_tokens, 30);
        assert_eq!(fetched.output_tokens, 12);
    }

    #[tokio::test]
    async fn usage_log_insert_is_idempotent_on_retry() {
        let (store, _dir) = test_store().await;
        let conv = store.create_conversation(TenantId::new(), 200_000).await.expect("create");
        let mut by_model = std::collections::HashMap::new();
        by_model.insert("claude".to_string(), ModelUsage { input_tokens: 10, output_tokens: 5, ..Default::default() });
        let log = UsageLog {
            execution_id: ExecutionId::new(),
            conversation_id: conv.id.clone(),
            turn_count: 1,
            duration_ms: 100,
            by_model,
            created_at_ms: 0,
        };
        store.insert_usage_log(&log).await.expect("insert");
        store.insert_usage_log(&log).await.expect("retry insert");

        let fetched = store.get_conversation(&conv.id).await.expect("get").expect("present");
        assert_eq!(fetched.input_tokens, 10);
    }

    #[tokio::test]
    async fn message_log_seq_is_monotonic_from_one() {
        let (store, _dir) = test_store().await;
        let conv = store.create_conversation(TenantId::new(), 200_000).await.expect("create");
        let first = store
            .append_message_log(&conv.id, MessageLogType::User, serde_json::json!({"text": "hi"}), 1)
            .await
            .expect("append");
        let second = store
            .append_message_log(&conv.id, MessageLogType::Assistant, serde_json::json!({"text": "hello"}), 2)
            .await
            .expect("append");
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
    }

    #[tokio::test]
    async fn sibling_connection_reads_writes_from_primary() {
        let (store, _dir) = test_store().await;
        let conv = store.create_conversation(TenantId::new(), 200_000).await.expect("create");
        let sibling = store.open_sibling().await.expect("sibling");
        sibling.set_title(&conv.id, "hello world").await.expect("set title");
        let fetched = store.get_conversation(&conv.id).await.expect("get").expect("present");
        assert_eq!(fetched.title.as_deref(), Some("hello world"));
    }

    proptest! {
        /// Spec §8 "seq monotonicity" under genuinely concurrent writers,
        /// not just two sequential appends: `n` tasks append to the same
        /// conversation through the same `Store` handle at once, and the
        /// resulting `seq` values must land on exactly `1..=n` with no
        /// gaps or duplicates regardless of task interleaving.
        #[test]
        fn message_log_seq_is_monotonic_under_concurrent_writers(n in 2usize..20) {
            let rt = tokio::runtime::Runtime::new().expect("rt");
            let mut seqs: Vec<u64> = rt.block_on(async move {
                let dir = tempfile::tempdir().expect("tempdir");
                let store = Store::open(dir.path().join("catalog.sqlite3")).await.expect("open store");
                let conv = store.create_conversation(TenantId::new(), 200_000).await.expect("create");

                let mut tasks = Vec::with_capacity(n);
                for i in 0..n {
                    let store = store.clone();
                    let conv_id = conv.id.clone();
                    tasks.push(tokio::spawn(async move {
                        store
                            .append_message_log(&conv_id, MessageLogType::User, serde_json::json!({"i": i}), i as u64)
                            .await
                            .expect("append")
                            .seq
                    }));
                }

                let mut seqs = Vec::with_capacity(n);
                for task in tasks {
                    seqs.push(task.await.expect("join"));
                }
                seqs
            });
            seqs.sort_unstable();
            let expected: Vec<u64> = (1..=n as u64).collect();
            prop_assert_eq!(seqs, expected);
        }
    }
}
