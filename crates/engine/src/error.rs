// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal plumbing errors, mapped onto the wire-level
//! [`wco_core::OrchestratorError`] taxonomy at the point an `error`
//! event is emitted (spec §7).

use thiserror::Error;
use wco_core::OrchestratorError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("kv error: {0}")]
    Kv(#[from] wco_adapters::KvError),

    #[error("backend error: {0}")]
    Backend(#[from] wco_adapters::BackendError),

    #[error("storage error: {0}")]
    Storage(#[from] wco_storage::StorageError),

    #[error("workspace sync error: {0}")]
    WorkspaceSync(#[from] wco_adapters::WorkspaceSyncError),

    #[error("credential proxy error: {0}")]
    Proxy(#[from] wco_adapters::ProxyError),

    #[error("sandbox client error: {0}")]
    Sandbox(#[from] wco_adapters::SandboxClientError),
}

impl EngineError {
    /// Project an internal failure onto the taxonomy callers actually
    /// see on the wire. Infrastructure faults surfacing mid-stream (file
    /// sync, title generation) map to the `background_*` variants per
    /// spec §7; everything else is an `execution_error`.
    pub fn as_orchestrator_error(&self) -> OrchestratorError {
        match self {
            EngineError::Orchestrator(e) => e.clone(),
            EngineError::WorkspaceSync(e) => {
                OrchestratorError::BackgroundExecutionError { message: e.to_string() }
            }
            other => OrchestratorError::ExecutionError { message: other.to_string() },
        }
    }
}
