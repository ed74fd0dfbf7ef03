// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon health snapshot, exposed on `GET /healthz` alongside the
//! Prometheus `/metrics` surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonHealth {
    pub uptime_secs: u64,
    pub warm_pool_size: usize,
    pub active_executions: usize,
    pub last_gc_sweep_ms: u64,
    pub last_error: Option<String>,
}
