// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared KV client (spec §3, §6): the container forward/reverse/task
//! triple, the warm-pool list, and the per-conversation lock. Backed by
//! Redis via a pooled [`redis::aio::ConnectionManager`] so every call
//! site shares one reconnecting connection instead of opening a fresh
//! one per request.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use wco_core::{ContainerId, ConversationId, LockToken};
use wco_wire::kv_schema::{self, ContainerRecord, WarmPoolInfo, DEFAULT_LOCK_TTL_SECS};

#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis transport error: {0}")]
    Transport(#[from] redis::RedisError),
    #[error("record at {0} was malformed: {1}")]
    Malformed(String, serde_json::Error),
}

#[derive(Clone)]
pub struct KvClient {
    conn: ConnectionManager,
}

impl KvClient {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Write the container forward/reverse/task triple atomically via a
    /// pipeline, all sharing `ttl_secs`. A pipeline is the closest
    /// single-round-trip primitive redis gives us to "atomic group";
    /// the GC sweeper is responsible for reconciling any triple that a
    /// crash leaves partially written (spec §5).
    pub async fn put_container_triple(
        &self,
        conversation_id: &ConversationId,
        record: &ContainerRecord,
        ttl_secs: u64,
    ) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let forward = kv_schema::container_key(conversation_id);
        let reverse = kv_schema::container_reverse_key(&record.container_id);
        let payload = serde_json::to_string(record).expect("ContainerRecord serializes");

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.set_ex(&forward, &payload, ttl_secs).ignore();
        pipe.set_ex(&reverse, conversation_id.to_string(), ttl_secs).ignore();
        if let Some(ref task_handle) = record.task_handle {
            let task = kv_schema::task_key(&record.container_id);
            pipe.set_ex(&task, task_handle.to_string(), ttl_secs).ignore();
        }
        pipe.query_async(&mut conn).await?;
        Ok(())
    }

    pub async fn get_container(&self, conversation_id: &ConversationId) -> Result<Option<ContainerRecord>, KvError> {
        let mut conn = self.conn.clone();
        let key = kv_schema::container_key(conversation_id);
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(s) => serde_json::from_str(&s).map(Some).map_err(|e| KvError::Malformed(key, e)),
            None => Ok(None),
        }
    }

    pub async fn get_reverse(&self, container_id: &ContainerId) -> Result<Option<ConversationId>, KvError> {
        let mut conn = self.conn.clone();
        let key = kv_schema::container_reverse_key(container_id);
        let raw: Option<String> = conn.get(&key).await?;
        Ok(raw.map(ConversationId::from))
    }

    /// Delete all three legs of the triple. Safe to call on a
    /// partially-written or already-deleted triple (spec §4.4).
    pub async fn delete_container_triple(
        &self,
        conversation_id: &ConversationId,
        container_id: &ContainerId,
    ) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let forward = kv_schema::container_key(conversation_id);
        let reverse = kv_schema::container_reverse_key(container_id);
        let task = kv_schema::task_key(container_id);
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(&forward).ignore();
        pipe.del(&reverse).ignore();
        pipe.del(&task).ignore();
        pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Touch `last_used_at_ms` forward, resetting the TTL on all three
    /// keys (GC only destroys entries whose `last_used_at + ttl < now`).
    pub async fn refresh_container_ttl(
        &self,
        conversation_id: &ConversationId,
        container_id: &ContainerId,
        mut record: ContainerRecord,
        now_ms: u64,
        ttl_secs: u64,
    ) -> Result<(), KvError> {
        record.last_used_at_ms = now_ms;
        self.put_container_triple(conversation_id, &record, ttl_secs).await
    }

    pub async fn push_warm_pool(&self, container_id: &ContainerId, info: &WarmPoolInfo, ttl_secs: u64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let info_key = kv_schema::warm_pool_info_key(container_id);
        let payload = serde_json::to_string(info).expect("WarmPoolInfo serializes");
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.rpush(kv_schema::WARM_POOL_KEY, container_id.to_string()).ignore();
        pipe.set_ex(&info_key, payload, ttl_secs).ignore();
        pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Pop the oldest warm-pool entry (FIFO is advisory, spec §5).
    pub async fn pop_warm_pool(&self) -> Result<Option<ContainerId>, KvError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.lpop(kv_schema::WARM_POOL_KEY, None).await?;
        Ok(raw.map(ContainerId::from))
    }

    pub async fn get_warm_pool_info(&self, container_id: &ContainerId) -> Result<Option<WarmPoolInfo>, KvError> {
        let mut conn = self.conn.clone();
        let key = kv_schema::warm_pool_info_key(container_id);
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(s) => serde_json::from_str(&s).map(Some).map_err(|e| KvError::Malformed(key, e)),
            None => Ok(None),
        }
    }

    pub async fn warm_pool_ids(&self) -> Result<Vec<ContainerId>, KvError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(kv_schema::WARM_POOL_KEY, 0, -1).await?;
        Ok(raw.into_iter().map(ContainerId::from).collect())
    }

    pub async fn remove_from_warm_pool(&self, container_id: &ContainerId) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let info_key = kv_schema::warm_pool_info_key(container_id);
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.lrem(kv_schema::WARM_POOL_KEY, 0, container_id.to_string()).ignore();
        pipe.del(&info_key).ignore();
        pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Acquire the per-conversation lock with `SET NX EX`, returning the
    /// token on success. The token must be presented back to
    /// [`Self::release_lock`] so a caller can never release a lock it
    /// does not hold (e.g. after its own TTL already expired and someone
    /// else acquired it).
    pub async fn acquire_lock(&self, conversation_id: &ConversationId, token: &LockToken) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let key = kv_schema::lock_key(conversation_id);
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(token.to_string())
            .arg("NX")
            .arg("EX")
            .arg(DEFAULT_LOCK_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// Non-mutating probe used to reject a `/stream` request with a
    /// pre-stream 409 before `Orchestrator::execute` ever commits to
    /// `Sse::new` (spec §7): whether another execution currently holds
    /// the per-conversation lock, without acquiring or releasing it.
    pub async fn is_locked(&self, conversation_id: &ConversationId) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let key = kv_schema::lock_key(conversation_id);
        let held: Option<String> = conn.get(&key).await?;
        Ok(held.is_some())
    }

    pub async fn release_lock(&self, conversation_id: &ConversationId, token: &LockToken) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let key = kv_schema::lock_key(conversation_id);
        let held: Option<String> = conn.get(&key).await?;
        if held.as_deref() == Some(token.as_str()) {
            let _: () = conn.del(&key).await?;
        }
        Ok(())
    }
}
