// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP client over the daemon's `/admin/*` and `/healthz`
//! surface (`crates/daemon/src/http.rs`). `workspacectl` never speaks
//! the orchestrator's domain types directly — it round-trips whatever
//! JSON the daemon already serializes for its own diagnostics.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DaemonHealth {
    pub uptime_secs: u64,
    pub warm_pool_size: usize,
    pub active_executions: usize,
    pub last_gc_sweep_ms: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PoolStatus {
    pub min: usize,
    pub max: usize,
    pub size: usize,
    pub exhaustion_count: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GcRunResult {
    pub destroyed_count: u64,
    pub orphan_count: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ContainerEntry {
    pub id: String,
    pub state: String,
    pub created_at_ms: u64,
    pub conversation_id: Option<String>,
}

impl DaemonClient {
    /// Reads `WCO_DAEMON_URL`, falling back to the default bind address
    /// `crates/daemon/src/env.rs::bind_addr` would use on localhost.
    pub fn new() -> Self {
        let base_url = std::env::var("WCO_DAEMON_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
        Self { base_url, http: reqwest::Client::new() }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let resp = self.http.get(format!("{}{}", self.base_url, path)).send().await?;
        if !resp.status().is_success() {
            bail!("daemon returned {}: {}", resp.status(), resp.text().await.unwrap_or_default());
        }
        Ok(resp.json().await?)
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let resp = self.http.post(format!("{}{}", self.base_url, path)).send().await?;
        if !resp.status().is_success() {
            bail!("daemon returned {}: {}", resp.status(), resp.text().await.unwrap_or_default());
        }
        Ok(resp.json().await?)
    }

    pub async fn health(&self) -> Result<DaemonHealth> {
        self.get("/healthz").await
    }

    pub async fn pool_status(&self) -> Result<PoolStatus> {
        self.get("/admin/pool").await
    }

    pub async fn run_gc(&self) -> Result<GcRunResult> {
        self.post("/admin/gc/run").await
    }

    pub async fn list_containers(&self) -> Result<Vec<ContainerEntry>> {
        self.get("/admin/containers").await
    }

    pub async fn destroy_container(&self, id: &str) -> Result<()> {
        let resp = self.http.post(format!("{}/admin/containers/{}/destroy", self.base_url, id)).send().await?;
        if !resp.status().is_success() {
            bail!("daemon returned {}: {}", resp.status(), resp.text().await.unwrap_or_default());
        }
        Ok(())
    }
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}
