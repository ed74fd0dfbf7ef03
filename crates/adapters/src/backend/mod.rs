// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The polymorphic lifecycle backend (spec §4.1, §9 "Backend
//! polymorphism"): a capability set `{create, destroy, health, exec,
//! list, logs, wait_ready}` with `Local` and `Remote` variants, selected
//! once at startup from `CONTAINER_BACKEND`.

pub mod local;
pub mod remote;

use async_trait::async_trait;
use thiserror::Error;
use wco_core::{ContainerId, ConversationId, ManagerType};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("container {0} not found")]
    NotFound(ContainerId),
    #[error("startup failed: {0}")]
    StartupFailed(String),
    #[error("exec failed: {0}")]
    ExecFailed(String),
    #[error("backend transport error: {0}")]
    Transport(String),
}

/// What `create()` hands back once the sandbox's `/health` has answered.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub endpoint: String,
    pub manager_type: ManagerType,
    pub task_handle: Option<String>,
}

/// Bearer token both backends derive for talking to their own sandbox
/// over the agent HTTP surface. Shared here so the orchestrator's direct
/// `/execute` dispatch (bypassing the `exec`/`exec_binary` trait methods)
/// can compute the same token without reaching into backend internals.
pub fn auth_token(id: &ContainerId) -> String {
    format!("{id}-token")
}

/// One entry from `list_workspace_containers()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SandboxListing {
    pub id: ContainerId,
    pub state: String,
    pub created_at_ms: u64,
    pub conversation_id: Option<ConversationId>,
}

/// The capability set the orchestrator depends on. It knows nothing
/// about Docker, Kubernetes, or any other backend-specific detail — only
/// this trait.
#[async_trait]
pub trait LifecycleBackend: Send + Sync {
    /// Starts a sandbox; blocks until `/health` returns 200, or fails
    /// with [`BackendError::StartupFailed`] on timeout / early task
    /// termination.
    async fn create(&self, id: &ContainerId) -> Result<ContainerInfo, BackendError>;

    /// Idempotent. Logs a warning (does not error) if `id` is already
    /// gone.
    async fn destroy(&self, id: &ContainerId, grace: std::time::Duration) -> Result<(), BackendError>;

    /// Cheap status check by default; when `check_agent` is set, performs
    /// an HTTP `/health` round-trip against the sandbox.
    async fn is_healthy(&self, id: &ContainerId, check_agent: bool) -> bool;

    async fn exec(&self, id: &ContainerId, cmd: &[String]) -> Result<(i32, String), BackendError>;

    async fn exec_binary(&self, id: &ContainerId, cmd: &[String]) -> Result<(i32, Vec<u8>), BackendError>;

    async fn list_workspace_containers(&self) -> Result<Vec<SandboxListing>, BackendError>;

    /// Polls `/health` at a small interval; returns `false` on early
    /// termination detected via backend status (distinct from a timeout,
    /// which is also `false` but logged differently by the caller).
    async fn wait_for_agent_ready(&self, id: &ContainerId, timeout: std::time::Duration) -> bool;

    async fn get_logs(&self, id: &ContainerId, tail: usize) -> Result<String, BackendError>;
}

/// Which concrete backend a process was started with. One process
/// chooses exactly one variant for its lifetime (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            other => Err(format!("unknown CONTAINER_BACKEND: {other:?} (expected local|remote)")),
        }
    }
}
