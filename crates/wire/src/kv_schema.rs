// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared KV key layout (spec §6). These are the hash shapes stored at
//! each key; key-string construction lives alongside them so every
//! caller builds keys the same way.

use serde::{Deserialize, Serialize};
use wco_core::{ContainerId, ConversationId, ManagerType, SandboxTaskId};

pub const DEFAULT_CONTAINER_TTL_SECS: u64 = 3600;
pub const DEFAULT_WARM_POOL_TTL_SECS: u64 = 1800;
pub const DEFAULT_LOCK_TTL_SECS: u64 = 600;

pub fn container_key(conversation_id: &ConversationId) -> String {
    format!("workspace:container:{conversation_id}")
}

pub fn container_reverse_key(container_id: &ContainerId) -> String {
    format!("workspace:container_reverse:{container_id}")
}

pub fn task_key(container_id: &ContainerId) -> String {
    format!("workspace:task:{container_id}")
}

pub const WARM_POOL_KEY: &str = "workspace:warm_pool";

pub fn warm_pool_info_key(container_id: &ContainerId) -> String {
    format!("workspace:warm_pool_info:{container_id}")
}

pub fn lock_key(conversation_id: &ConversationId) -> String {
    format!("workspace:lock:{conversation_id}")
}

/// Value at `workspace:container:{conversation_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub container_id: ContainerId,
    pub endpoint: String,
    pub created_at_ms: u64,
    pub last_used_at_ms: u64,
    pub state: String,
    pub manager_type: ManagerType,
    pub task_handle: Option<SandboxTaskId>,
}

/// Value at `workspace:warm_pool_info:{container_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmPoolInfo {
    pub container_id: ContainerId,
    pub endpoint: String,
    pub created_at_ms: u64,
    pub manager_type: ManagerType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keys_are_namespaced_under_workspace() {
        let conv = ConversationId::new();
        let container = ContainerId::new();
        assert!(container_key(&conv).starts_with("workspace:container:"));
        assert!(container_reverse_key(&container).starts_with("workspace:container_reverse:"));
        assert!(task_key(&container).starts_with("workspace:task:"));
        assert!(lock_key(&conv).starts_with("workspace:lock:"));
        assert!(warm_pool_info_key(&container).starts_with("workspace:warm_pool_info:"));
    }

    proptest! {
        /// The forward/reverse/task triple written together by
        /// `KvClient::record_container` (spec §6) must stay pairwise
        /// distinct and each must carry the id it was built from, for any
        /// conversation/container id pair, not just the fixed ids above.
        #[test]
        fn container_triple_keys_are_distinct_and_carry_their_id(
            conv_raw in "[a-zA-Z0-9_-]{1,40}",
            container_raw in "[a-zA-Z0-9_-]{1,40}",
        ) {
            let conv = ConversationId::from_string(&conv_raw);
            let container = ContainerId::from_string(&container_raw);

            let forward = container_key(&conv);
            let reverse = container_reverse_key(&container);
            let task = task_key(&container);

            prop_assert_ne!(&forward, &reverse);
            prop_assert_ne!(&forward, &task);
            prop_assert_ne!(&reverse, &task);

            prop_assert!(forward.ends_with(conv_raw.as_str()));
            prop_assert!(reverse.ends_with(container_raw.as_str()));
            prop_assert!(task.ends_with(container_raw.as_str()));
        }
    }
}
