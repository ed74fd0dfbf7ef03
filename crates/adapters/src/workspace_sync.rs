// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace file synchronizer (spec §4.6): pull moves object-store
//! entries into the sandbox before execution, push uploads changed
//! files afterward. Both directions go through the sandbox's
//! `exec_binary` RPC rather than a mount, since the sandbox may be a
//! remote pod with no shared filesystem.
//!
//! Every method here does network I/O against the object store and the
//! sandbox; per spec §4.6 ("must not block the request scheduler"),
//! callers spawn pull/push onto a background task rather than awaiting
//! them inline while holding the conversation lock.

use crate::backend::{BackendError, LifecycleBackend};
use crate::object_store::{ObjectStoreClient, ObjectStoreError};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use wco_core::{AttachmentMeta, ContainerId, ConversationId, TenantId, WorkspaceFile, WorkspaceFileSource};

#[derive(Debug, Error)]
pub enum WorkspaceSyncError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    #[error("sandbox exec error: {0}")]
    Backend(#[from] BackendError),
    #[error("write into sandbox failed for {0}: exit code {1}")]
    WriteFailed(String, i32),
}

pub struct WorkspaceSync {
    store: ObjectStoreClient,
    prefix: String,
}

impl WorkspaceSync {
    pub fn new(store: ObjectStoreClient, prefix: String) -> Self {
        Self { store, prefix }
    }

    fn conversation_prefix(&self, tenant_id: &TenantId, conversation_id: &ConversationId) -> String {
        format!("{}/{}/{}/", self.prefix, tenant_id, conversation_id)
    }

    /// Stream every object-store entry for this conversation into the
    /// sandbox workspace, plus any attachments accompanying this turn's
    /// request (spec §4.6). Attachments are addressed by their
    /// collision-proof `filename`, written at `relative_path`.
    pub async fn pull(
        &self,
        backend: &Arc<dyn LifecycleBackend>,
        container_id: &ContainerId,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        attachments: &[(AttachmentMeta, Vec<u8>)],
    ) -> Result<usize, WorkspaceSyncError> {
        let prefix = self.conversation_prefix(tenant_id, conversation_id);
        let entries = self.store.list_prefix(&prefix).await?;
        let mut written = 0usize;

        for entry in &entries {
            let relpath = entry.key.strip_prefix(&prefix).unwrap_or(&entry.key);
            let bytes = self.store.get_object(&entry.key).await?;
            write_into_sandbox(backend, container_id, relpath, bytes).await?;
            written += 1;
        }

        for (meta, bytes) in attachments {
            write_into_sandbox(backend, container_id, &meta.relative_path, bytes.clone()).await?;
            written += 1;
        }

        Ok(written)
    }

    /// Sync tenant "skills" — static file bundles selected by name for
    /// this turn — into a conventional sandbox directory (spec §4.2 step
    /// 5). Skills live under a tenant-wide prefix rather than the
    /// per-conversation one `pull` uses, since the same bundle is shared
    /// across every conversation for that tenant.
    pub async fn sync_skills(
        &self,
        backend: &Arc<dyn LifecycleBackend>,
        container_id: &ContainerId,
        tenant_id: &TenantId,
        skill_names: &[String],
    ) -> Result<usize, WorkspaceSyncError> {
        let mut written = 0usize;
        for skill in skill_names {
            let prefix = format!("{}/skills/{}/{}/", self.prefix, tenant_id, skill);
            let entries = self.store.list_prefix(&prefix).await?;
            for entry in &entries {
                let relpath = entry.key.strip_prefix(&prefix).unwrap_or(&entry.key);
                let bytes = self.store.get_object(&entry.key).await?;
                let target = format!(".skills/{skill}/{relpath}");
                write_into_sandbox(backend, container_id, &target, bytes).await?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Enumerate files under `/workspace` the agent touched since
    /// `since_ms`, upload each as the newest version, and return catalog
    /// rows for the caller to persist. `is_presented` is always `false`
    /// here — it is only ever set by the engine in response to an
    /// explicit `present_files` tool call (spec §4.6, §9).
    pub async fn push(
        &self,
        backend: &Arc<dyn LifecycleBackend>,
        container_id: &ContainerId,
        conversation_id: &ConversationId,
        tenant_id: &TenantId,
        since_ms: u64,
        now_ms: u64,
    ) -> Result<Vec<WorkspaceFile>, WorkspaceSyncError> {
        let find_cmd = vec![
            "find".to_string(),
            "/workspace".to_string(),
            "-type".to_string(),
            "f".to_string(),
            "-newermt".to_string(),
            format!("@{}", since_ms / 1000),
        ];
        let (exit_code, output) = backend.exec(container_id, &find_cmd).await?;
        if exit_code != 0 {
            return Ok(Vec::new());
        }

        let prefix = self.conversation_prefix(tenant_id, conversation_id);
        let mut rows = Vec::new();
        for path in output.lines().filter(|l| !l.trim().is_empty()) {
            let (read_code, bytes) =
                backend.exec_binary(container_id, &["cat".to_string(), path.to_string()]).await?;
            if read_code != 0 {
                continue;
            }
            let relpath = path.strip_prefix("/workspace/").unwrap_or(path);
            let key = format!("{prefix}{relpath}");
            let checksum = checksum_of(&bytes);
            let size = bytes.len() as u64;
            self.store.put_object(&key, bytes).await?;

            rows.push(WorkspaceFile {
                conversation_id: conversation_id.clone(),
                path: relpath.to_string(),
                size,
                content_type: "application/octet-stream".to_string(),
                source: WorkspaceFileSource::AiModified,
                is_presented: false,
                checksum,
                updated_at_ms: now_ms,
            });
        }
        Ok(rows)
    }
}

async fn write_into_sandbox(
    backend: &Arc<dyn LifecycleBackend>,
    container_id: &ContainerId,
    relpath: &str,
    bytes: Vec<u8>,
) -> Result<(), WorkspaceSyncError> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let target = format!("/workspace/{relpath}");
    let encoded = STANDARD.encode(&bytes);
    let cmd = vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("mkdir -p \"$(dirname '{target}')\" && echo '{encoded}' | base64 -d > '{target}'"),
    ];
    let (exit_code, _) = backend.exec(container_id, &cmd).await?;
    if exit_code != 0 {
        return Err(WorkspaceSyncError::WriteFailed(relpath.to_string(), exit_code));
    }
    Ok(())
}

fn checksum_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable() {
        assert_eq!(checksum_of(b"hello"), checksum_of(b"hello"));
        assert_ne!(checksum_of(b"hello"), checksum_of(b"world"));
    }
}
