// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed identifiers for orchestration entities.

crate::define_id! {
    /// Opaque sandbox container id, e.g. `cnt-...`.
    pub struct ContainerId("cnt-");
}

crate::define_id! {
    /// Conversation id, owned by the external CRUD layer but referenced
    /// pervasively here for KV keys and lock tokens.
    pub struct ConversationId("cnv-");
}

crate::define_id! {
    /// Tenant id.
    pub struct TenantId("tnt-");
}

crate::define_id! {
    /// Remote-scheduler task handle id (remote backend only).
    pub struct SandboxTaskId("tsk-");
}

crate::define_id! {
    /// Conversation-lock token, proves ownership of the lock held for the
    /// duration of one `Orchestrator::execute` call.
    pub struct LockToken("lok-");
}

crate::define_id! {
    /// Unique id minted once per `execute()` call; the primary key of
    /// `UsageLog` rows, making token accumulation idempotent under replay.
    pub struct ExecutionId("exe-");
}
