// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process wiring: construct every adapter, the orchestrator, and the
//! two background loops, then hand a ready [`AppState`] to the HTTP
//! layer. Ordering mirrors the teacher's `lifecycle/startup.rs`
//! convention (directories/state first, background loops last, bind
//! the listener only once everything else has succeeded).

use crate::env;
use crate::http::AppState;
use metrics_exporter_prometheus::PrometheusBuilder;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use wco_adapters::backend::{BackendKind, LifecycleBackend};
use wco_adapters::proxy::in_process::InProcessProxy;
use wco_adapters::{KvClient, ObjectStoreClient, SandboxClient, WorkspaceSync};
use wco_core::SystemClock;
use wco_engine::{EngineConfig, GarbageCollector, Orchestrator, SubprocessTitleGenerator, WarmPool};
use wco_storage::Store;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unknown CONTAINER_BACKEND: {0}")]
    Backend(String),
    #[error("kv connect failed: {0}")]
    Kv(#[from] wco_adapters::KvError),
    #[error("storage open failed: {0}")]
    Storage(#[from] wco_storage::StorageError),
    #[error("remote backend init failed: {0}")]
    RemoteBackend(wco_adapters::BackendError),
    #[error("metrics recorder install failed: {0}")]
    Metrics(String),
}

/// Build every adapter and background service, returning the state the
/// HTTP layer needs plus the two loop handles so the caller can cancel
/// them in the right order on shutdown (spec §5).
pub async fn build() -> Result<(AppState, BackgroundLoops), StartupError> {
    let config: EngineConfig = env::engine_config();
    let clock = SystemClock;

    let backend_kind = env::container_backend().map_err(StartupError::Backend)?;
    let (backend, in_process_proxy): (Arc<dyn LifecycleBackend>, Option<InProcessProxy>) = match backend_kind {
        BackendKind::Local => {
            let proxy = InProcessProxy::new();
            let backend = wco_adapters::backend::local::LocalBackend::new(proxy.clone());
            (Arc::new(backend), Some(proxy))
        }
        BackendKind::Remote => {
            let backend = wco_adapters::backend::remote::RemoteBackend::new()
                .await
                .map_err(StartupError::RemoteBackend)?;
            (Arc::new(backend), None)
        }
    };

    let kv = KvClient::connect(&env::redis_url()).await?;
    let store = Store::open(env::catalog_db_path()).await?;

    let object_store = ObjectStoreClient::from_env(env::object_store_bucket()).await;
    let workspace_sync = Arc::new(WorkspaceSync::new(object_store, env::object_store_prefix()));

    let warm_pool = Arc::new(WarmPool::new(
        backend.clone(),
        kv.clone(),
        clock.clone(),
        config.warm_pool_min,
        config.warm_pool_max,
        config.container_ttl_secs,
        config.warm_pool_replenish_secs,
    ));

    let gc = Arc::new(GarbageCollector::new(
        backend.clone(),
        kv.clone(),
        clock.clone(),
        config.gc_period_secs,
        config.container_ttl_secs,
        config.gc_orphan_cycle_k,
    ));

    let (title_program, title_args) = env::title_command();
    let title_generator = Arc::new(SubprocessTitleGenerator::new(title_program, title_args));

    let sandbox_client = SandboxClient::new();

    let orchestrator = Arc::new(Orchestrator::new(
        backend.clone(),
        kv.clone(),
        store.clone(),
        warm_pool.clone(),
        workspace_sync,
        sandbox_client,
        in_process_proxy,
        title_generator,
        clock,
        config,
    ));

    let active_conversations = Arc::new(Mutex::new(HashSet::new()));

    let warm_pool_loop = warm_pool.clone().spawn_replenisher();
    let gc_loop = gc.clone().spawn_loop();

    let metrics_handle = PrometheusBuilder::new().install_recorder().map_err(|e| StartupError::Metrics(e.to_string()))?;

    tracing::info!(backend = ?backend_kind, "daemon started");

    Ok((
        AppState {
            orchestrator,
            store,
            backend,
            warm_pool,
            gc,
            kv,
            active_conversations,
            metrics_handle,
            started_at: Instant::now(),
            last_error: Arc::new(Mutex::new(None)),
        },
        BackgroundLoops { warm_pool_loop, gc_loop },
    ))
}

pub struct BackgroundLoops {
    pub warm_pool_loop: tokio::task::JoinHandle<()>,
    pub gc_loop: tokio::task::JoinHandle<()>,
}

impl BackgroundLoops {
    /// Spec §5: "Graceful shutdown cancels the warm pool first (to
    /// avoid double destroys), stops GC, then drains active
    /// containers." The drain of active containers happens naturally
    /// as in-flight `Orchestrator::execute` background tasks finish
    /// within `drain_timeout`; this only stops the two loops.
    pub async fn shutdown(self, gc: &GarbageCollector<SystemClock>, warm_pool: &WarmPool<SystemClock>) {
        warm_pool.stop();
        self.warm_pool_loop.abort();
        gc.stop();
        self.gc_loop.abort();
    }
}
