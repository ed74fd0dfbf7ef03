// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-started, unassigned sandboxes (spec §4.3). `acquire()` pops in
//! O(1) from the shared KV list, verifying health before handing a
//! container back; a background replenisher keeps the pool between
//! `[min, max]`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wco_adapters::backend::ContainerInfo;
use wco_adapters::{BackendError, KvClient, LifecycleBackend};
use wco_core::{Clock, ContainerId};
use wco_wire::kv_schema::WarmPoolInfo;

pub struct WarmPool<C: Clock> {
    backend: Arc<dyn LifecycleBackend>,
    kv: KvClient,
    clock: C,
    min: usize,
    max: usize,
    ttl_secs: u64,
    replenish_secs: u64,
    /// Count of in-flight `create()` calls from the replenisher, so it
    /// never exceeds `max` concurrent creations (spec §4.3).
    in_flight: Arc<AtomicU64>,
    /// Incremented every time `acquire()` finds the pool empty — the
    /// exhaustion metric spec §4.3 calls for.
    exhaustion_count: Arc<AtomicU64>,
    shutdown: Arc<Mutex<bool>>,
}

impl<C: Clock + 'static> WarmPool<C> {
    pub fn new(
        backend: Arc<dyn LifecycleBackend>,
        kv: KvClient,
        clock: C,
        min: usize,
        max: usize,
        ttl_secs: u64,
        replenish_secs: u64,
    ) -> Self {
        Self {
            backend,
            kv,
            clock,
            min,
            max,
            ttl_secs,
            replenish_secs,
            in_flight: Arc::new(AtomicU64::new(0)),
            exhaustion_count: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    pub fn exhaustion_count(&self) -> u64 {
        self.exhaustion_count.load(Ordering::Relaxed)
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Pop one healthy entry, discarding stale ones along the way.
    /// Returns `None` if the pool is empty (recording the exhaustion
    /// metric); the caller falls through to creating a fresh container.
    pub async fn acquire(&self) -> Result<Option<ContainerInfo>, BackendError> {
        loop {
            let Some(id) = self.kv.pop_warm_pool().await.map_err(|e| BackendError::Transport(e.to_string()))? else {
                self.exhaustion_count.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            };
            if !self.backend.is_healthy(&id, true).await {
                tracing::info!(%id, "discarding stale warm-pool entry");
                let _ = self.kv.remove_from_warm_pool(&id).await;
                continue;
            }
            let info = self.kv.get_warm_pool_info(&id).await.map_err(|e| BackendError::Transport(e.to_string()))?;
            let Some(info) = info else {
                // Info hash expired independently of the list entry; treat as stale.
                tracing::info!(%id, "warm-pool entry missing its info hash, discarding");
                let _ = self.kv.remove_from_warm_pool(&id).await;
                continue;
            };
            return Ok(Some(ContainerInfo {
                id: info.container_id,
                endpoint: info.endpoint,
                manager_type: info.manager_type,
                task_handle: None,
            }));
        }
    }

    /// Create one fresh warm container and push it onto the pool.
    async fn create_one(&self) -> Result<(), BackendError> {
        let id = ContainerId::new();
        let info = self.backend.create(&id).await?;
        let warm_info = WarmPoolInfo {
            container_id: info.id.clone(),
            endpoint: info.endpoint.clone(),
            created_at_ms: self.clock.epoch_ms(),
            manager_type: info.manager_type,
        };
        self.kv
            .push_warm_pool(&info.id, &warm_info, self.ttl_secs)
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(())
    }

    /// One replenishment pass: top the pool up to `min`, never exceeding
    /// `max` concurrent creations in flight.
    async fn replenish_once(&self) {
        let current_len = self.kv.warm_pool_ids().await.map(|v| v.len()).unwrap_or(0);
        let to_create = creates_needed(current_len, self.min, self.max, self.in_flight.load(Ordering::Relaxed) as usize);
        for _ in 0..to_create {
            self.in_flight.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.create_one().await {
                tracing::warn!(error = %e, "warm-pool replenish create failed");
            }
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub fn stop(&self) {
        *self.shutdown.lock() = true;
    }

    /// Spawn the background replenisher loop. Per spec §5 "graceful
    /// shutdown cancels the warm pool first", the returned handle should
    /// be aborted before the backend itself is torn down.
    pub fn spawn_replenisher(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if *self.shutdown.lock() {
                    break;
                }
                self.replenish_once().await;
                tokio::time::sleep(Duration::from_secs(self.replenish_secs)).await;
            }
        })
    }
}

/// How many containers the replenisher should start this pass: enough to
/// close the gap to `min`, capped by how much of `max` concurrent
/// creations is still unused (spec §4.3: "never exceeds max concurrent
/// creations").
fn creates_needed(current_len: usize, min: usize, max: usize, in_flight: usize) -> usize {
    if current_len >= min {
        return 0;
    }
    let deficit = min - current_len;
    let budget = max.saturating_sub(in_flight);
    deficit.min(budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        below_min_with_budget = { 0, 2, 5, 0, 2 },
        at_min_creates_nothing = { 2, 2, 5, 0, 0 },
        capped_by_in_flight = { 0, 3, 3, 2, 1 },
        fully_saturated = { 0, 3, 3, 3, 0 },
    )]
    fn replenish_math_respects_bounds(current_len: usize, min: usize, max: usize, in_flight: usize, expected: usize) {
        assert_eq!(creates_needed(current_len, min, max, in_flight), expected);
    }
}
