// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sandbox container entity and its lifecycle state machine.

use crate::ids::{ContainerId, ConversationId, SandboxTaskId};
use serde::{Deserialize, Serialize};

/// Which lifecycle backend created and owns a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerType {
    Local,
    Remote,
}

crate::simple_display! {
    ManagerType {
        Local => "local",
        Remote => "remote",
    }
}

/// Lifecycle state of a sandbox container.
///
/// `Warm` containers live in the warm pool, unassigned to any
/// conversation. `Idle`/`Busy` containers are bound to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Creating,
    Warm,
    Idle,
    Busy,
    Draining,
    Dead,
}

crate::simple_display! {
    ContainerState {
        Creating => "creating",
        Warm => "warm",
        Idle => "idle",
        Busy => "busy",
        Draining => "draining",
        Dead => "dead",
    }
}

impl ContainerState {
    /// Whether a container in this state still counts as "alive" for
    /// GC/orphan-reclamation purposes.
    pub fn is_live(self) -> bool {
        !matches!(self, ContainerState::Dead)
    }
}

/// A sandbox container, as tracked by the orchestrator and mirrored into
/// the shared KV (see `wco_wire::kv`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub conversation_id: Option<ConversationId>,
    pub state: ContainerState,
    /// Local transport address (UDS path or `host:port`) or remote
    /// `host:port` inside the task's private network.
    pub endpoint: String,
    pub created_at_ms: u64,
    pub last_used_at_ms: u64,
    pub manager_type: ManagerType,
    /// Remote-scheduler task handle; `None` for the local backend.
    pub task_handle: Option<SandboxTaskId>,
}

impl Container {
    pub fn new_warm(id: ContainerId, endpoint: String, manager_type: ManagerType, now_ms: u64) -> Self {
        Self {
            id,
            conversation_id: None,
            state: ContainerState::Warm,
            endpoint,
            created_at_ms: now_ms,
            last_used_at_ms: now_ms,
            manager_type,
            task_handle: None,
        }
    }

    /// Bind a warm (unassigned) container to a conversation, transitioning
    /// it to `Busy`. Per design decision (a) in DESIGN.md, warm-pool
    /// containers are never repurposed after a conversation completes, so
    /// this transition happens exactly once in a container's lifetime.
    pub fn assign(&mut self, conversation_id: ConversationId, now_ms: u64) {
        self.conversation_id = Some(conversation_id);
        self.state = ContainerState::Busy;
        self.last_used_at_ms = now_ms;
    }

    pub fn mark_idle(&mut self, now_ms: u64) {
        self.state = ContainerState::Idle;
        self.last_used_at_ms = now_ms;
    }

    pub fn mark_busy(&mut self, now_ms: u64) {
        self.state = ContainerState::Busy;
        self.last_used_at_ms = now_ms;
    }

    pub fn mark_draining(&mut self) {
        self.state = ContainerState::Draining;
    }

    pub fn mark_dead(&mut self) {
        self.state = ContainerState::Dead;
    }

    /// Whether this entry has exceeded `ttl_secs` since it was last used.
    pub fn is_expired(&self, now_ms: u64, ttl_secs: u64) -> bool {
        now_ms.saturating_sub(self.last_used_at_ms) >= ttl_secs.saturating_mul(1000)
    }
}

/// An entry in the warm pool: a pre-started, unassigned container waiting
/// to be handed to the next conversation that needs one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmPoolEntry {
    pub container_id: ContainerId,
    pub created_at_ms: u64,
}

impl WarmPoolEntry {
    pub fn new(container_id: ContainerId, now_ms: u64) -> Self {
        Self { container_id, created_at_ms: now_ms }
    }

    pub fn is_expired(&self, now_ms: u64, ttl_secs: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) >= ttl_secs.saturating_mul(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_transitions_warm_to_busy() {
        let mut c = Container::new_warm(ContainerId::new(), "127.0.0.1:9000".into(), ManagerType::Local, 1000);
        assert_eq!(c.state, ContainerState::Warm);
        c.assign(ConversationId::new(), 2000);
        assert_eq!(c.state, ContainerState::Busy);
        assert!(c.conversation_id.is_some());
        assert_eq!(c.last_used_at_ms, 2000);
    }

    #[test]
    fn expiry_is_relative_to_last_used() {
        let mut c = Container::new_warm(ContainerId::new(), "e".into(), ManagerType::Local, 0);
        c.mark_idle(10_000);
        assert!(!c.is_expired(10_000 + 3599_000, 3600));
        assert!(c.is_expired(10_000 + 3601_000, 3600));
    }
}
