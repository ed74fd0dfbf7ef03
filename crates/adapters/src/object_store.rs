// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-store client backing the workspace file synchronizer (spec
//! §4.6). A thin wrapper over `aws-sdk-s3` scoped to the operations the
//! synchronizer needs: list a prefix, stream an object down, and upload
//! a new version.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object store list failed: {0}")]
    List(String),
    #[error("object store get failed: {0}")]
    Get(String),
    #[error("object store put failed: {0}")]
    Put(String),
}

#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
    pub last_modified_ms: i64,
}

#[derive(Clone)]
pub struct ObjectStoreClient {
    client: Client,
    bucket: String,
}

impl ObjectStoreClient {
    pub async fn from_env(bucket: String) -> Self {
        let config = aws_config::load_from_env().await;
        Self { client: Client::new(&config), bucket }
    }

    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// List every object under `prefix`, handling continuation tokens
    /// transparently. Used by [`crate::workspace_sync::WorkspaceSync`] to
    /// enumerate `prefix/tenant/conversation/` before a pull.
    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>, ObjectStoreError> {
        let mut entries = Vec::new();
        let mut continuation = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let resp = req.send().await.map_err(|e| ObjectStoreError::List(e.to_string()))?;
            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                entries.push(ObjectEntry {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0),
                    last_modified_ms: obj.last_modified().map(|t| t.to_millis().unwrap_or(0)).unwrap_or(0),
                });
            }
            if resp.is_truncated().unwrap_or(false) {
                continuation = resp.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(entries)
    }

    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Get(e.to_string()))?;
        let bytes =
            resp.body.collect().await.map_err(|e| ObjectStoreError::Get(e.to_string()))?.into_bytes();
        Ok(bytes.to_vec())
    }

    pub async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Put(e.to_string()))?;
        Ok(())
    }
}
