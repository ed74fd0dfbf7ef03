// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The local backend: one sandbox per container, started and torn down
//! with the `docker` CLI (spec §4.1 "Local backend contract").
//!
//! Unlike the teacher's `DockerAdapter` — which runs a cooperative agent
//! with a single bind-mounted workspace and no network restriction — a
//! workspace sandbox is untrusted tenant-controlled code, so every
//! container is started locked down: attached only to an `--internal`
//! bridge network (no route beyond the docker host), a read-only root
//! filesystem with scratch `tmpfs` mounts, a dropped capability set, and
//! a fixed non-root UID. The one thing on that network's far side the
//! sandbox can reach is the credential-injection proxy this backend
//! spawns per container (see [`crate::proxy::in_process`]), addressed
//! via `HTTP_PROXY`/`HTTPS_PROXY` and the docker host gateway.

use super::{auth_token, BackendError, ContainerInfo, SandboxListing};
use crate::proxy::in_process::InProcessProxy;
use crate::sandbox_client::SandboxClient;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wco_core::{ContainerId, ManagerType};

const CONTAINER_PORT: u16 = 8088;
const LABEL_APP: &str = "app=wco-sandbox";
const NETWORK_NAME: &str = "wco-sandbox-net";

pub struct LocalBackend {
    client: SandboxClient,
    proxy: InProcessProxy,
    image: String,
    port_counter: Arc<AtomicU16>,
    memory_limit: String,
    cpu_limit: String,
    pids_limit: String,
}

impl LocalBackend {
    pub fn new(proxy: InProcessProxy) -> Self {
        let base_port: u16 =
            std::env::var("WCO_LOCAL_BASE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(9200);
        Self {
            client: SandboxClient::new(),
            proxy,
            image: std::env::var("WCO_SANDBOX_IMAGE").unwrap_or_else(|_| "wco-sandbox:latest".into()),
            port_counter: Arc::new(AtomicU16::new(base_port)),
            memory_limit: std::env::var("WCO_CONTAINER_MEMORY").unwrap_or_else(|_| "2g".into()),
            cpu_limit: std::env::var("WCO_CONTAINER_CPUS").unwrap_or_else(|_| "2".into()),
            pids_limit: std::env::var("WCO_CONTAINER_PIDS").unwrap_or_else(|_| "256".into()),
        }
    }

    fn next_port(&self) -> u16 {
        self.port_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn container_name(id: &ContainerId) -> String {
        format!("wco-{id}")
    }

    /// Best-effort, idempotent: the network only needs to exist once per
    /// host, and "already exists" is the expected steady-state outcome.
    async fn ensure_network(&self) {
        let _ = run_docker(&["network", "create", "--internal", "--driver", "bridge", NETWORK_NAME]).await;
    }
}

#[async_trait]
impl super::LifecycleBackend for LocalBackend {
    async fn create(&self, id: &ContainerId) -> Result<ContainerInfo, BackendError> {
        self.ensure_network().await;

        let name = Self::container_name(id);
        let host_port = self.next_port();
        let proxy_port = self.next_port();
        let port_mapping = format!("{host_port}:{CONTAINER_PORT}");
        let auth_token = auth_token(id);
        let auth_env = format!("WCO_AUTH_TOKEN={auth_token}");
        let proxy_url = format!("http://host.docker.internal:{proxy_port}");
        let http_proxy_env = format!("HTTP_PROXY={proxy_url}");
        let https_proxy_env = format!("HTTPS_PROXY={proxy_url}");
        let label_container = format!("wco.dev/container-id={id}");
        let port_arg = format!("{CONTAINER_PORT}");
        let memory_arg = self.memory_limit.clone();
        let cpus_arg = self.cpu_limit.clone();
        let pids_arg = self.pids_limit.clone();
        let tmp_run = "type=tmpfs,destination=/tmp";
        let tmp_workspace = "type=tmpfs,destination=/workspace,tmpfs-size=4g";

        let args: Vec<&str> = vec![
            "run",
            "-d",
            "--name",
            &name,
            "--label",
            LABEL_APP,
            "--label",
            &label_container,
            "-p",
            &port_mapping,
            "-e",
            &auth_env,
            "-e",
            &http_proxy_env,
            "-e",
            &https_proxy_env,
            "--network",
            NETWORK_NAME,
            "--add-host",
            "host.docker.internal:host-gateway",
            "--read-only",
            "--mount",
            tmp_run,
            "--mount",
            tmp_workspace,
            "--cap-drop",
            "ALL",
            "--cap-add",
            "CHOWN",
            "--cap-add",
            "SETUID",
            "--cap-add",
            "SETGID",
            "--cap-add",
            "DAC_OVERRIDE",
            "--security-opt",
            "no-new-privileges",
            "--user",
            "1000:1000",
            "--memory",
            &memory_arg,
            "--cpus",
            &cpus_arg,
            "--pids-limit",
            &pids_arg,
            &self.image,
            "--port",
            &port_arg,
        ];

        // Start the credential-injection proxy this sandbox's
        // HTTP(S)_PROXY points at before the sandbox itself, so an
        // outbound call made the instant the agent comes up has
        // somewhere to land.
        let proxy_addr = SocketAddr::from(([0, 0, 0, 0], proxy_port));
        let proxy = self.proxy.clone();
        let listener_id = id.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = proxy.serve(listener_id.clone(), proxy_addr).await {
                tracing::error!(container_id = %listener_id, error = %e, "credential-injection proxy listener exited");
            }
        });
        self.proxy.track_listener(id.clone(), handle);

        if let Err(e) = run_docker(&args).await {
            self.proxy.stop_listener(id);
            return Err(BackendError::StartupFailed(e));
        }

        let endpoint = format!("127.0.0.1:{host_port}");
        if !self.wait_for_agent_ready(id, Duration::from_secs(15)).await {
            let _ = run_docker(&["rm", "-f", &name]).await;
            self.proxy.stop_listener(id);
            return Err(BackendError::StartupFailed(format!("sandbox {id} did not become ready")));
        }

        Ok(ContainerInfo { id: id.clone(), endpoint, manager_type: ManagerType::Local, task_handle: Some(name) })
    }

    async fn destroy(&self, id: &ContainerId, grace: Duration) -> Result<(), BackendError> {
        let name = Self::container_name(id);
        let _ = run_docker(&["stop", "-t", &grace.as_secs().to_string(), &name]).await;
        if let Err(e) = run_docker(&["rm", "-f", &name]).await {
            tracing::warn!(%id, error = %e, "container already gone during destroy");
        }
        self.proxy.stop_listener(id);
        Ok(())
    }

    async fn is_healthy(&self, id: &ContainerId, check_agent: bool) -> bool {
        let name = Self::container_name(id);
        let Ok(status) = run_docker(&["inspect", "-f", "{{.State.Running}}", &name]).await else {
            return false;
        };
        if status.trim() != "true" {
            return false;
        }
        if !check_agent {
            return true;
        }
        let Some(endpoint) = self.endpoint_of(id).await else {
            return false;
        };
        self.client.health(&endpoint, &auth_token(id)).await.is_ok()
    }

    async fn exec(&self, id: &ContainerId, cmd: &[String]) -> Result<(i32, String), BackendError> {
        let endpoint = self.endpoint_of(id).await.ok_or_else(|| BackendError::NotFound(id.clone()))?;
        self.client
            .exec(&endpoint, &auth_token(id), cmd.to_vec())
            .await
            .map_err(|e| BackendError::ExecFailed(e.to_string()))
    }

    async fn exec_binary(&self, id: &ContainerId, cmd: &[String]) -> Result<(i32, Vec<u8>), BackendError> {
        let endpoint = self.endpoint_of(id).await.ok_or_else(|| BackendError::NotFound(id.clone()))?;
        self.client
            .exec_binary(&endpoint, &auth_token(id), cmd.to_vec())
            .await
            .map_err(|e| BackendError::ExecFailed(e.to_string()))
    }

    async fn list_workspace_containers(&self) -> Result<Vec<SandboxListing>, BackendError> {
        let label_filter = format!("label={LABEL_APP}");
        let output = run_docker(&[
            "ps",
            "-a",
            "--filter",
            &label_filter,
            "--format",
            "{{.Label \"wco.dev/container-id\"}}\t{{.State}}\t{{.CreatedAt}}",
        ])
        .await
        .map_err(BackendError::Transport)?;

        let mut out = Vec::new();
        for line in output.lines() {
            let mut parts = line.splitn(3, '\t');
            let Some(id_str) = parts.next().filter(|s| !s.is_empty()) else { continue };
            let id = ContainerId::from(id_str);
            let state = parts.next().unwrap_or("unknown").to_string();
            out.push(SandboxListing { id, state, created_at_ms: 0, conversation_id: None });
        }
        Ok(out)
    }

    async fn wait_for_agent_ready(&self, id: &ContainerId, timeout: Duration) -> bool {
        let Some(endpoint) = self.endpoint_of(id).await else { return false };
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.client.health(&endpoint, &auth_token(id)).await.is_ok() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        false
    }

    async fn get_logs(&self, id: &ContainerId, tail: usize) -> Result<String, BackendError> {
        let name = Self::container_name(id);
        run_docker(&["logs", "--tail", &tail.to_string(), &name]).await.map_err(BackendError::Transport)
    }
}

impl LocalBackend {
    async fn endpoint_of(&self, id: &ContainerId) -> Option<String> {
        let name = Self::container_name(id);
        let container_port = format!("{CONTAINER_PORT}/tcp");
        let mapping = run_docker(&["port", &name, &container_port]).await.ok()?;
        let line = mapping.lines().next()?;
        let port = line.rsplit(':').next()?;
        Some(format!("127.0.0.1:{port}"))
    }
}

async fn run_docker(args: &[&str]) -> Result<String, String> {
    let output = tokio::process::Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to exec docker: {e}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("docker {} failed: {}", args.first().unwrap_or(&""), stderr.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_name_is_namespaced() {
        let id: ContainerId = "cnt-abcdefghijklmnopqrs".into();
        assert!(LocalBackend::container_name(&id).starts_with("wco-cnt-"));
    }
}
