// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The remote backend: one pod per container, created and torn down via
//! the Kubernetes API (spec §4.1 "Remote backend contract").
//!
//! Each pod holds two sibling containers: `agent`, running the sandbox
//! HTTP surface, and `proxy`, the credential-injection sidecar that
//! signs and forwards the agent's outbound model calls so the model
//! credential never reaches tenant-controlled code (spec §4.5). The
//! teacher's `KubernetesAdapter` builds a single-container pod per
//! agent; this generalizes `pod::build_pod` to the sibling-container
//! shape and drops the credential env-injection path entirely.

use super::{auth_token, BackendError, ContainerInfo, SandboxListing};
use crate::sandbox_client::SandboxClient;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, HTTPGetAction, Pod, PodSpec, Probe,
    ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use wco_core::{ContainerId, ManagerType};

const AGENT_PORT: i32 = 8088;
const PROXY_PORT: i32 = 8089;

pub struct RemoteBackend {
    client: Client,
    namespace: String,
    image: String,
    proxy_image: String,
    sandbox_client: SandboxClient,
}

impl RemoteBackend {
    pub async fn new() -> Result<Self, BackendError> {
        let client = Client::try_default()
            .await
            .map_err(|e| BackendError::Transport(format!("failed to create kube client: {e}")))?;
        Ok(Self {
            client,
            namespace: std::env::var("WCO_K8S_NAMESPACE").unwrap_or_else(|_| "default".into()),
            image: std::env::var("WCO_SANDBOX_IMAGE").unwrap_or_else(|_| "wco-sandbox:latest".into()),
            proxy_image: std::env::var("WCO_PROXY_IMAGE").unwrap_or_else(|_| "wco-credential-proxy:latest".into()),
            sandbox_client: SandboxClient::new(),
        })
    }

    fn pod_name(id: &ContainerId) -> String {
        format!("wco-{id}")
    }


    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn build_pod(&self, id: &ContainerId) -> Pod {
        let pod_name = Self::pod_name(id);
        let auth_token = auth_token(id);

        let workspace_volume = Volume {
            name: "workspace".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        };
        let workspace_mount =
            VolumeMount { name: "workspace".to_string(), mount_path: "/workspace".to_string(), ..Default::default() };

        let agent_container = Container {
            name: "agent".to_string(),
            image: Some(self.image.clone()),
            args: Some(vec!["--port".to_string(), AGENT_PORT.to_string()]),
            working_dir: Some("/workspace".to_string()),
            ports: Some(vec![ContainerPort { container_port: AGENT_PORT, ..Default::default() }]),
            volume_mounts: Some(vec![workspace_mount]),
            env: Some(vec![
                env_var("WCO_AUTH_TOKEN", &auth_token),
                env_var("HTTP_PROXY", &format!("http://127.0.0.1:{PROXY_PORT}")),
                env_var("HTTPS_PROXY", &format!("http://127.0.0.1:{PROXY_PORT}")),
            ]),
            resources: Some(ResourceRequirements {
                limits: Some(BTreeMap::from([
                    ("memory".to_string(), Quantity("2Gi".to_string())),
                    ("cpu".to_string(), Quantity("2".to_string())),
                ])),
                ..Default::default()
            }),
            startup_probe: Some(health_probe(AGENT_PORT, 30, 10)),
            readiness_probe: Some(health_probe(AGENT_PORT, 3, 5)),
            liveness_probe: Some(health_probe(AGENT_PORT, 3, 30)),
            ..Default::default()
        };

        let proxy_container = Container {
            name: "proxy".to_string(),
            image: Some(self.proxy_image.clone()),
            ports: Some(vec![ContainerPort { container_port: PROXY_PORT, ..Default::default() }]),
            env: Some(vec![env_var("WCO_PROXY_PORT", &PROXY_PORT.to_string())]),
            ..Default::default()
        };

        Pod {
            metadata: ObjectMeta {
                name: Some(pod_name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([
                    ("app".to_string(), "wco-sandbox".to_string()),
                    ("wco.dev/container-id".to_string(), id.to_string()),
                ])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![agent_container, proxy_container],
                volumes: Some(vec![workspace_volume]),
                restart_policy: Some("Never".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn wait_for_pod_ip(&self, pod_name: &str, timeout: Duration) -> Result<String, BackendError> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if let Ok(pod) = self.pods().get(pod_name).await {
                if let Some(ip) = pod.status.as_ref().and_then(|s| s.pod_ip.as_ref()) {
                    if !ip.is_empty() {
                        return Ok(ip.clone());
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Err(BackendError::StartupFailed(format!("pod {pod_name} did not receive an IP within {timeout:?}")))
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar { name: name.to_string(), value: Some(value.to_string()), ..Default::default() }
}

fn health_probe(port: i32, failure_threshold: i32, period_seconds: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction { path: Some("/health".to_string()), port: IntOrString::Int(port), ..Default::default() }),
        failure_threshold: Some(failure_threshold),
        period_seconds: Some(period_seconds),
        ..Default::default()
    }
}

#[async_trait]
impl super::LifecycleBackend for RemoteBackend {
    async fn create(&self, id: &ContainerId) -> Result<ContainerInfo, BackendError> {
        let pod_name = Self::pod_name(id);
        let spec = self.build_pod(id);
        let pods = self.pods();

        pods.create(&PostParams::default(), &spec)
            .await
            .map_err(|e| BackendError::StartupFailed(format!("pod creation failed: {e}")))?;

        let result: Result<ContainerInfo, BackendError> = async {
            let ip = self.wait_for_pod_ip(&pod_name, Duration::from_secs(60)).await?;
            let endpoint = format!("{ip}:{AGENT_PORT}");
            if !self.wait_for_agent_ready(id, Duration::from_secs(120)).await {
                return Err(BackendError::StartupFailed(format!("sandbox {id} did not become ready")));
            }
            Ok(ContainerInfo { id: id.clone(), endpoint, manager_type: ManagerType::Remote, task_handle: Some(pod_name.clone()) })
        }
        .await;

        if result.is_err() {
            let _ = pods.delete(&pod_name, &DeleteParams::default()).await;
        }
        result
    }

    async fn destroy(&self, id: &ContainerId, _grace: Duration) -> Result<(), BackendError> {
        let pod_name = Self::pod_name(id);
        if let Err(e) = self.pods().delete(&pod_name, &DeleteParams::default()).await {
            tracing::warn!(%id, error = %e, "pod already gone during destroy");
        }
        Ok(())
    }

    async fn is_healthy(&self, id: &ContainerId, check_agent: bool) -> bool {
        let pod_name = Self::pod_name(id);
        let Ok(pod) = self.pods().get(&pod_name).await else { return false };
        let running = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(|p| p == "Running")
            .unwrap_or(false);
        if !running || !check_agent {
            return running;
        }
        let Some(ip) = pod.status.as_ref().and_then(|s| s.pod_ip.as_ref()) else { return false };
        self.sandbox_client.health(&format!("{ip}:{AGENT_PORT}"), &auth_token(id)).await.is_ok()
    }

    async fn exec(&self, id: &ContainerId, cmd: &[String]) -> Result<(i32, String), BackendError> {
        let endpoint = self.endpoint_of(id).await.ok_or_else(|| BackendError::NotFound(id.clone()))?;
        self.sandbox_client
            .exec(&endpoint, &auth_token(id), cmd.to_vec())
            .await
            .map_err(|e| BackendError::ExecFailed(e.to_string()))
    }

    async fn exec_binary(&self, id: &ContainerId, cmd: &[String]) -> Result<(i32, Vec<u8>), BackendError> {
        let endpoint = self.endpoint_of(id).await.ok_or_else(|| BackendError::NotFound(id.clone()))?;
        self.sandbox_client
            .exec_binary(&endpoint, &auth_token(id), cmd.to_vec())
            .await
            .map_err(|e| BackendError::ExecFailed(e.to_string()))
    }

    async fn list_workspace_containers(&self) -> Result<Vec<SandboxListing>, BackendError> {
        let lp = ListParams::default().labels("app=wco-sandbox");
        let pods = self.pods().list(&lp).await.map_err(|e| BackendError::Transport(e.to_string()))?;

        let mut out = Vec::new();
        for pod in pods {
            let Some(name) = pod.metadata.name.as_deref() else { continue };
            let Some(id_str) = name.strip_prefix("wco-") else { continue };
            let id = ContainerId::from(id_str);
            let state = pod.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_else(|| "Unknown".into());
            out.push(SandboxListing { id, state, created_at_ms: 0, conversation_id: None });
        }
        Ok(out)
    }

    async fn wait_for_agent_ready(&self, id: &ContainerId, timeout: Duration) -> bool {
        let Some(endpoint) = self.endpoint_of(id).await else { return false };
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.sandbox_client.health(&endpoint, &auth_token(id)).await.is_ok() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        false
    }

    async fn get_logs(&self, id: &ContainerId, tail: usize) -> Result<String, BackendError> {
        let pod_name = Self::pod_name(id);
        let lp = kube::api::LogParams { container: Some("agent".to_string()), tail_lines: Some(tail as i64), ..Default::default() };
        self.pods().logs(&pod_name, &lp).await.map_err(|e| BackendError::Transport(e.to_string()))
    }
}

impl RemoteBackend {
    async fn endpoint_of(&self, id: &ContainerId) -> Option<String> {
        let pod_name = Self::pod_name(id);
        let pod = self.pods().get(&pod_name).await.ok()?;
        let ip = pod.status?.pod_ip?;
        Some(format!("{ip}:{AGENT_PORT}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_name_is_namespaced() {
        let id: ContainerId = "cnt-abcdefghijklmnopqrs".into();
        assert!(RemoteBackend::pod_name(&id).starts_with("wco-cnt-"));
    }
}
