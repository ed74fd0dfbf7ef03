// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunables recognized per spec §6 "Environment". The daemon crate
//! reads these from the process environment and constructs one
//! `EngineConfig` at startup; the engine itself has no knowledge of env
//! vars.

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub container_ttl_secs: u64,
    pub warm_pool_min: usize,
    pub warm_pool_max: usize,
    pub warm_pool_replenish_secs: u64,
    pub gc_period_secs: u64,
    /// Orphan reclamation runs every `gc_orphan_cycle_k`-th GC sweep
    /// (spec §4.4).
    pub gc_orphan_cycle_k: u32,
    pub heartbeat_interval_secs: u64,
    pub event_timeout_secs: u64,
    pub lock_ttl_secs: u64,
    /// Model identifiers whose runtime supports extended reasoning;
    /// `progress.type=thinking` is forwarded only when the active
    /// model is a member of this set (spec §9(c)).
    pub extended_reasoning_models: std::collections::HashSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            container_ttl_secs: 3600,
            warm_pool_min: 1,
            warm_pool_max: 5,
            warm_pool_replenish_secs: 15,
            gc_period_secs: 60,
            gc_orphan_cycle_k: 5,
            heartbeat_interval_secs: 10,
            event_timeout_secs: 300,
            lock_ttl_secs: 600,
            extended_reasoning_models: ["claude-sonnet-4-5", "claude-opus-4-5"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
