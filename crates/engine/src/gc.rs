// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sweeper loop for expired and orphaned containers (spec §4.4).

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wco_adapters::{BackendError, KvClient, LifecycleBackend};
use wco_core::{Clock, ContainerId, ConversationId};
use wco_wire::kv_schema;

pub struct GarbageCollector<C: Clock> {
    backend: Arc<dyn LifecycleBackend>,
    kv: KvClient,
    clock: C,
    period_secs: u64,
    ttl_secs: u64,
    orphan_cycle_k: u32,
    cycle: AtomicU32,
    destroyed_count: Arc<AtomicU64>,
    orphan_count: Arc<AtomicU64>,
    last_sweep_ms: Arc<AtomicU64>,
    shutdown: Arc<Mutex<bool>>,
}

impl<C: Clock + 'static> GarbageCollector<C> {
    pub fn new(
        backend: Arc<dyn LifecycleBackend>,
        kv: KvClient,
        clock: C,
        period_secs: u64,
        ttl_secs: u64,
        orphan_cycle_k: u32,
    ) -> Self {
        Self {
            backend,
            kv,
            clock,
            period_secs,
            ttl_secs,
            orphan_cycle_k,
            cycle: AtomicU32::new(0),
            destroyed_count: Arc::new(AtomicU64::new(0)),
            orphan_count: Arc::new(AtomicU64::new(0)),
            last_sweep_ms: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    pub fn destroyed_count(&self) -> u64 {
        self.destroyed_count.load(Ordering::Relaxed)
    }

    pub fn orphan_count(&self) -> u64 {
        self.orphan_count.load(Ordering::Relaxed)
    }

    /// Epoch ms of the most recently completed sweep, for `/healthz`.
    pub fn last_sweep_ms(&self) -> u64 {
        self.last_sweep_ms.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        *self.shutdown.lock() = true;
    }

    /// Sweep every conversation with a container the backend currently
    /// lists *and* a live KV reverse mapping, destroying whichever have
    /// gone stale (backend no longer has them) or idle past `ttl_secs`.
    /// The tracked set is derived fresh each cycle from the backend's own
    /// listing cross-referenced against the KV reverse index — not from
    /// whatever HTTP streams happen to be open at the instant the sweep
    /// runs, since a conversation's container needs TTL tracking for its
    /// entire idle lifetime, long after its last stream closed.
    pub async fn sweep_once(&self) {
        for conversation_id in self.tracked_conversations().await {
            if let Err(e) = self.sweep_one(&conversation_id).await {
                tracing::warn!(%conversation_id, error = %e, "gc sweep failed for conversation");
            }
        }

        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed) + 1;
        if cycle % self.orphan_cycle_k == 0 {
            if let Err(e) = self.sweep_orphans().await {
                tracing::warn!(error = %e, "orphan sweep failed");
            }
        }
        self.last_sweep_ms.store(self.clock.epoch_ms(), Ordering::Relaxed);
    }

    /// Cross-reference the backend's live container listing against the
    /// KV reverse index to recover which conversations currently own a
    /// container (the "forward-key scan" spec §4.4 describes), so the
    /// per-conversation idle sweep above reaches every live container
    /// regardless of whether a request is in flight for it right now.
    async fn tracked_conversations(&self) -> Vec<ConversationId> {
        let live = match self.backend.list_workspace_containers().await {
            Ok(live) => live,
            Err(e) => {
                tracing::warn!(error = %e, "gc: failed to list live containers for sweep");
                return Vec::new();
            }
        };

        let mut tracked = Vec::with_capacity(live.len());
        for listing in live {
            match self.kv.get_reverse(&listing.id).await {
                Ok(Some(conversation_id)) => tracked.push(conversation_id),
                Ok(None) => {}
                Err(e) => tracing::warn!(container_id = %listing.id, error = %e, "gc: reverse lookup failed during sweep"),
            }
        }
        tracked
    }

    async fn sweep_one(&self, conversation_id: &ConversationId) -> Result<(), BackendError> {
        let record = self.kv.get_container(conversation_id).await.map_err(|e| BackendError::Transport(e.to_string()))?;
        let Some(record) = record else { return Ok(()) };

        let still_exists = self.backend.is_healthy(&record.container_id, false).await;
        if !still_exists {
            self.kv
                .delete_container_triple(conversation_id, &record.container_id)
                .await
                .map_err(|e| BackendError::Transport(e.to_string()))?;
            self.destroyed_count.fetch_add(1, Ordering::Relaxed);
            tracing::info!(%conversation_id, container_id = %record.container_id, "gc: container already gone, cleared kv triple");
            return Ok(());
        }

        let now_ms = self.clock.epoch_ms();
        let idle_ms = now_ms.saturating_sub(record.last_used_at_ms);
        if idle_ms >= self.ttl_secs.saturating_mul(1000) {
            // Graceful destroy is re-entrant: destroy() is idempotent and
            // the KV triple is only removed after it succeeds.
            self.backend.destroy(&record.container_id, Duration::from_secs(10)).await?;
            self.kv
                .delete_container_triple(conversation_id, &record.container_id)
                .await
                .map_err(|e| BackendError::Transport(e.to_string()))?;
            self.destroyed_count.fetch_add(1, Ordering::Relaxed);
            tracing::info!(%conversation_id, container_id = %record.container_id, idle_ms, "gc: destroyed expired container");
        }
        Ok(())
    }

    /// Cross-reference every live sandbox the backend knows about
    /// against the KV reverse index; any sandbox with no reverse
    /// mapping is an orphan (e.g. a crash left a container running
    /// after its KV triple expired) and gets destroyed.
    async fn sweep_orphans(&self) -> Result<(), BackendError> {
        let live = self.backend.list_workspace_containers().await?;
        let mut known: HashSet<ContainerId> = HashSet::new();
        for listing in &live {
            if self
                .kv
                .get_reverse(&listing.id)
                .await
                .map_err(|e| BackendError::Transport(e.to_string()))?
                .is_some()
            {
                known.insert(listing.id.clone());
            }
        }

        for listing in live {
            if known.contains(&listing.id) {
                continue;
            }
            self.backend.destroy(&listing.id, Duration::from_secs(5)).await?;
            let reverse_key = kv_schema::container_reverse_key(&listing.id);
            let _ = reverse_key;
            self.orphan_count.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(container_id = %listing.id, "gc: destroyed orphaned sandbox with no kv record");
        }
        Ok(())
    }

    pub fn spawn_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if *self.shutdown.lock() {
                    break;
                }
                self.sweep_once().await;
                tokio::time::sleep(Duration::from_secs(self.period_secs)).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_sweep_runs_on_every_kth_cycle() {
        let k = 5u32;
        let mut triggered_on = Vec::new();
        for cycle in 1..=15u32 {
            if cycle % k == 0 {
                triggered_on.push(cycle);
            }
        }
        assert_eq!(triggered_on, vec![5, 10, 15]);
    }
}
