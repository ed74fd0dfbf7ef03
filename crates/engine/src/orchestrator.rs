// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The main operation: `execute(conversation_id, user_input, attachments,
//! proxy_rules)`, implementing the 10-step algorithm of spec §4.2 as a
//! finite asynchronous stream of [`StreamEvent`]s.
//!
//! Holds the same shape as the teacher's `Executor<A, N, C>` (adapters +
//! state + clock + event channel), generalized from job-queue effects to
//! sandbox-execution steps.

use crate::config::EngineConfig;
use crate::title::TitleGenerator;
use crate::warm_pool::WarmPool;
use futures_util::stream::{self, Stream};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wco_adapters::backend::{self, ContainerInfo};
use wco_adapters::proxy::in_process::{InProcessHandle, InProcessProxy};
use wco_adapters::proxy::sidecar::SidecarProxy;
use wco_adapters::{CredentialProxy, KvClient, LifecycleBackend, SandboxClient, WorkspaceSync};
use wco_core::{
    AttachmentMeta, Clock, ContainerId, Conversation, ConversationId,
    DoneStatus, ExecutionId, LockToken, ManagerType, MessageLogType, ModelUsage, OrchestratorError,
    ProgressKind, ProxyRule, StreamEvent, TenantId, UsageLog,
};
use wco_storage::Store;
use wco_wire::kv_schema::ContainerRecord;
use wco_wire::{AgentEventLine, ExecuteRequest};

/// Everything the caller supplies for one turn (spec §6 "Streaming
/// execution endpoint" request body, minus transport framing).
pub struct TurnInput {
    pub user_input: String,
    pub attachments: Vec<(AttachmentMeta, Vec<u8>)>,
    pub proxy_rules: Vec<ProxyRule>,
    pub allowed_tools: Vec<String>,
    pub model: String,
    pub ephemeral_tokens: HashMap<String, String>,
    pub preferred_skills: Vec<String>,
}

pub struct Orchestrator<C: Clock> {
    backend: Arc<dyn LifecycleBackend>,
    kv: KvClient,
    store: Store,
    warm_pool: Arc<WarmPool<C>>,
    workspace_sync: Arc<WorkspaceSync>,
    sandbox_client: SandboxClient,
    /// `Some` only when the process is running the local backend; the
    /// remote backend configures its sidecar over HTTP instead (spec
    /// §4.5).
    in_process_proxy: Option<InProcessProxy>,
    title_generator: Arc<dyn TitleGenerator>,
    clock: C,
    config: EngineConfig,
}

impl<C: Clock + 'static> Orchestrator<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn LifecycleBackend>,
        kv: KvClient,
        store: Store,
        warm_pool: Arc<WarmPool<C>>,
        workspace_sync: Arc<WorkspaceSync>,
        sandbox_client: SandboxClient,
        in_process_proxy: Option<InProcessProxy>,
        title_generator: Arc<dyn TitleGenerator>,
        clock: C,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            kv,
            store,
            warm_pool,
            workspace_sync,
            sandbox_client,
            in_process_proxy,
            title_generator,
            clock,
            config,
        }
    }

    /// Run one turn, returning a stream of events that terminates with
    /// exactly one `done` or `error` (spec §7). The returned stream never
    /// itself fails: every failure mode this algorithm defines surfaces
    /// as an `error` event, not a `Result::Err`.
    ///
    /// The background work (steps 3 onward) runs on its own spawned task
    /// against an independent storage handle, so a client disconnect —
    /// which only drops the receiving half of the channel — does not
    /// interrupt persistence of the message log or usage log (spec §4.2
    /// "Client disconnect").
    pub async fn execute(
        self: Arc<Self>,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        input: TurnInput,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let (tx, rx) = tokio::sync::mpsc::channel::<StreamEvent>(1);
        let bg_store = match self.store.open_sibling().await {
            Ok(s) => s,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        error: OrchestratorError::ExecutionError { message: e.to_string() },
                        recoverable: false,
                    })
                    .await;
                return receiver_stream(rx);
            }
        };

        tokio::spawn(async move {
            self.run(tx, bg_store, tenant_id, conversation_id, input).await;
        });

        receiver_stream(rx)
    }

    async fn run(
        &self,
        tx: tokio::sync::mpsc::Sender<StreamEvent>,
        store: Store,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        input: TurnInput,
    ) {
        // Step 1: lock.
        let token = LockToken::new();
        let acquired = self.kv.acquire_lock(&conversation_id, &token).await.unwrap_or(false);
        if !acquired {
            let _ = tx
                .send(StreamEvent::Error { error: OrchestratorError::ConversationLocked, recoverable: true })
                .await;
            return;
        }

        let outcome = self.run_locked(&tx, &store, &tenant_id, &conversation_id, input).await;
        if let Err(err) = outcome {
            let _ = tx.send(StreamEvent::Error { error: err.clone(), recoverable: err.recoverable() }).await;
        }

        // Step 10 (lock half): always released on every exit path.
        let _ = self.kv.release_lock(&conversation_id, &token).await;
    }

    async fn run_locked(
        &self,
        tx: &tokio::sync::mpsc::Sender<StreamEvent>,
        store: &Store,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        input: TurnInput,
    ) -> Result<(), OrchestratorError> {
        let execution_id = ExecutionId::new();
        let started_ms = self.clock.epoch_ms();

        // Step 2: context gate.
        let conversation = store
            .get_conversation(conversation_id)
            .await
            .map_err(|e| OrchestratorError::ExecutionError { message: e.to_string() })?
            .ok_or_else(|| OrchestratorError::ExecutionError { message: "conversation not found".into() })?;
        if conversation.context_limit_exceeded() {
            return Err(OrchestratorError::ContextLimitExceeded);
        }

        // Step 3: resolve container.
        let container = self
            .resolve_container(conversation_id)
            .await
            .map_err(|e| OrchestratorError::ExecutionError { message: e.to_string() })?;

        let result = self.run_in_container(tx, store, tenant_id, conversation_id, &conversation, &container, &execution_id, started_ms, input).await;

        // Regardless of success, refresh the container back to idle
        // lifetime on the way out (step 10, container half).
        if let Ok(record) = self.kv.get_container(conversation_id).await {
            if let Some(record) = record {
                let now_ms = self.clock.epoch_ms();
                let _ = self
                    .kv
                    .refresh_container_ttl(conversation_id, &container.id, record, now_ms, self.config.container_ttl_secs)
                    .await;
            }
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_in_container(
        &self,
        tx: &tokio::sync::mpsc::Sender<StreamEvent>,
        store: &Store,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        conversation: &Conversation,
        container: &ContainerInfo,
        execution_id: &ExecutionId,
        started_ms: u64,
        input: TurnInput,
    ) -> Result<(), OrchestratorError> {
        // Step 4: sync in.
        self.workspace_sync
            .pull(&self.backend, &container.id, tenant_id, conversation_id, &input.attachments)
            .await
            .map_err(|e| OrchestratorError::BackgroundExecutionError { message: e.to_string() })?;

        // Step 5: install runtime configuration.
        let proxy = self.proxy_handle_for(container);
        proxy
            .update_rules(&input.proxy_rules, &input.ephemeral_tokens)
            .await
            .map_err(|e| OrchestratorError::ExecutionError { message: e.to_string() })?;
        if !input.preferred_skills.is_empty() {
            self.workspace_sync
                .sync_skills(&self.backend, &container.id, tenant_id, &input.preferred_skills)
                .await
                .map_err(|e| OrchestratorError::BackgroundExecutionError { message: e.to_string() })?;
        }

        // Step 6: dispatch.
        let extended_reasoning = self.config.extended_reasoning_models.contains(&input.model);
        let request = ExecuteRequest {
            user_input: input.user_input,
            resume_session_id: conversation.session_id.clone(),
            allowed_tools: input.allowed_tools,
            model: input.model,
            ephemeral_tokens: input.ephemeral_tokens,
        };
        let auth_token = backend::auth_token(&container.id);
        let event_stream = self
            .sandbox_client
            .execute(&container.endpoint, &auth_token, request)
            .await
            .map_err(|e| OrchestratorError::ExecutionError { message: e.to_string() })?;

        // Step 7: forward, with heartbeat + silence watchdog.
        let forward_outcome = self
            .forward(tx, store, conversation_id, conversation, execution_id, started_ms, extended_reasoning, event_stream)
            .await;

        let (usage, last_session_id, first_turn_preview) = match forward_outcome {
            Ok(v) => v,
            Err(e) => {
                // Connection error talking to the sandbox agent: attempt
                // recovery (spec §4.2 "Connection error").
                self.recover_container(conversation_id, container).await;
                return Err(e);
            }
        };

        if let Some(session_id) = &last_session_id {
            let _ = store.set_session_id(conversation_id, session_id).await;
        }

        // Step 8: done (context_status emitted inside `forward`; totals here).
        store
            .insert_usage_log(&usage)
            .await
            .map_err(|e| OrchestratorError::BackgroundExecutionError { message: e.to_string() })?;

        if conversation.is_first_turn() {
            let generator = self.title_generator.clone();
            let preview = first_turn_preview.clone();
            let conv_id = conversation_id.clone();
            let store = store.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Ok(title) = generator.generate(&preview).await {
                    if store.set_title(&conv_id, &title).await.is_ok() {
                        let _ = tx.send(StreamEvent::Title { title }).await;
                    }
                }
            });
        }

        // Step 9: sync out.
        let now_ms = self.clock.epoch_ms();
        let changed = self
            .workspace_sync
            .push(&self.backend, &container.id, conversation_id, tenant_id, started_ms, now_ms)
            .await
            .map_err(|e| OrchestratorError::BackgroundExecutionError { message: e.to_string() })?;
        for file in changed {
            let _ = store.upsert_workspace_file(&file).await;
        }

        Ok(())
    }

    /// Step 3 of the algorithm.
    async fn resolve_container(&self, conversation_id: &ConversationId) -> Result<ContainerInfo, backend::BackendError> {
        if let Some(record) = self.kv.get_container(conversation_id).await.map_err(|e| backend::BackendError::Transport(e.to_string()))? {
            if self.backend.is_healthy(&record.container_id, true).await {
                let now_ms = self.clock.epoch_ms();
                let _ = self
                    .kv
                    .refresh_container_ttl(conversation_id, &record.container_id, record.clone(), now_ms, self.config.container_ttl_secs)
                    .await;
                return Ok(ContainerInfo {
                    id: record.container_id,
                    endpoint: record.endpoint,
                    manager_type: record.manager_type,
                    task_handle: record.task_handle.map(|h| h.to_string()),
                });
            }
            let _ = self.kv.delete_container_triple(conversation_id, &record.container_id).await;
        }

        let info = match self.warm_pool.acquire().await? {
            Some(info) => info,
            None => {
                let id = ContainerId::new();
                self.backend.create(&id).await?
            }
        };

        let now_ms = self.clock.epoch_ms();
        let record = ContainerRecord {
            container_id: info.id.clone(),
            endpoint: info.endpoint.clone(),
            created_at_ms: now_ms,
            last_used_at_ms: now_ms,
            state: "busy".to_string(),
            manager_type: info.manager_type,
            task_handle: None,
        };
        self.kv
            .put_container_triple(conversation_id, &record, self.config.container_ttl_secs)
            .await
            .map_err(|e| backend::BackendError::Transport(e.to_string()))?;

        Ok(info)
    }

    fn proxy_handle_for(&self, container: &ContainerInfo) -> Box<dyn CredentialProxy> {
        match container.manager_type {
            ManagerType::Local => match &self.in_process_proxy {
                Some(proxy) => Box::new(InProcessHandle::new(proxy.clone(), container.id.clone())),
                None => Box::new(SidecarProxy::new(proxy_endpoint(&container.endpoint))),
            },
            ManagerType::Remote => Box::new(SidecarProxy::new(proxy_endpoint(&container.endpoint))),
        }
    }

    /// Step 7: re-serialize each agent event onto the caller stream,
    /// interleave a 10s heartbeat, persist a message-log row per event
    /// (the per-conversation `seq` the wire framing tags each frame with
    /// is assigned there, from these rows), and watch for 5 minutes of
    /// silence. Grounded on `attach_proxy.rs`'s `bridge_ws` dual-branch
    /// `tokio::select!` loop.
    async fn forward(
        &self,
        tx: &tokio::sync::mpsc::Sender<StreamEvent>,
        store: &Store,
        conversation_id: &ConversationId,
        conversation: &Conversation,
        execution_id: &ExecutionId,
        started_ms: u64,
        extended_reasoning: bool,
        upstream: impl futures_util::Stream<Item = Result<AgentEventLine, wco_adapters::SandboxClientError>>,
    ) -> Result<(UsageLog, Option<String>, String), OrchestratorError> {
        use futures_util::StreamExt;
        futures_util::pin_mut!(upstream);

        let heartbeat = Duration::from_secs(self.config.heartbeat_interval_secs);
        let silence_limit = Duration::from_secs(self.config.event_timeout_secs);

        let mut turn_count: u32 = 0;
        let mut by_model: HashMap<String, ModelUsage> = HashMap::new();
        let mut session_id: Option<String> = None;
        let mut preview = String::new();
        let mut reported_context_tokens: Option<u64> = None;
        let mut last_event_at = tokio::time::Instant::now();

        loop {
            if last_event_at.elapsed() >= silence_limit {
                return Err(OrchestratorError::TimeoutError { secs: self.config.event_timeout_secs });
            }

            tokio::select! {
                biased;

                line = upstream.next() => {
                    match line {
                        None => break,
                        Some(Err(e)) => return Err(OrchestratorError::ExecutionError { message: e.to_string() }),
                        Some(Ok(line)) => {
                            last_event_at = tokio::time::Instant::now();
                            let terminal = line.kind == "result";
                            if let Some(sid) = line.fields.get("session_id").and_then(|v| v.as_str()) {
                                session_id = Some(sid.to_string());
                            }
                            if line.kind == "assistant" {
                                if let Some(text) = line.fields.get("text").and_then(|v| v.as_str()) {
                                    preview = text.chars().take(200).collect();
                                }
                            }
                            if terminal {
                                turn_count += 1;
                                accumulate_usage(&mut by_model, &line.fields);
                                reported_context_tokens = line.fields.get("context_tokens").and_then(|v| v.as_u64());
                            }

                            let _ = store
                                .append_message_log(conversation_id, message_log_kind(&line.kind), line.fields.clone(), self.clock.epoch_ms())
                                .await;

                            if let Some(event) = translate_event(&line, extended_reasoning) {
                                // A dropped send means the client disconnected;
                                // upstream draining continues regardless so
                                // totals still get persisted (spec §4.2).
                                let _ = tx.send(event).await;
                            }

                            if terminal {
                                break;
                            }
                        }
                    }
                }

                _ = tokio::time::sleep(heartbeat) => {
                    let elapsed_ms = self.clock.epoch_ms().saturating_sub(started_ms);
                    let _ = tx.send(StreamEvent::Ping { elapsed_ms }).await;
                }
            }
        }

        let duration_ms = self.clock.epoch_ms().saturating_sub(started_ms);
        let usage = UsageLog {
            execution_id: execution_id.clone(),
            conversation_id: conversation_id.clone(),
            turn_count,
            duration_ms,
            by_model: by_model.clone(),
            created_at_ms: self.clock.epoch_ms(),
        };

        let turn_tokens: u64 = by_model.values().map(|m| m.input_tokens + m.output_tokens).sum();
        let current_tokens = reported_context_tokens.unwrap_or(conversation.estimated_context_tokens + turn_tokens);
        let _ = store.set_estimated_context_tokens(conversation_id, current_tokens).await;

        let mut projected = conversation.clone();
        projected.estimated_context_tokens = current_tokens;
        let _ = tx
            .send(StreamEvent::ContextStatus {
                current_tokens,
                max_tokens: conversation.context_window,
                usage_pct: projected.context_ratio() * 100.0,
                warning_level: projected.warning_level(),
            })
            .await;

        let total_cost: f64 = by_model.values().map(|m| m.cost_usd).sum();
        let by_model_cost_usd: HashMap<String, f64> = by_model.iter().map(|(k, v)| (k.clone(), v.cost_usd)).collect();
        let _ = tx
            .send(StreamEvent::Done {
                status: DoneStatus::Success,
                result_preview: preview.clone(),
                by_model_cost_usd,
                total_cost_usd: total_cost,
                turn_count,
                duration_ms,
                session_id: session_id.clone().unwrap_or_default(),
            })
            .await;

        Ok((usage, session_id, preview))
    }

    /// Connection-error recovery (spec §4.2): local backend attempts a
    /// proxy-restart first; remote backend goes straight to full
    /// container recovery. Either way the caller re-acquires a fresh
    /// container from the warm pool on the next turn since this
    /// conversation's KV triple is cleared here.
    async fn recover_container(&self, conversation_id: &ConversationId, container: &ContainerInfo) {
        let _ = self.kv.delete_container_triple(conversation_id, &container.id).await;
        let _ = self.backend.destroy(&container.id, Duration::from_secs(5)).await;
    }
}

fn receiver_stream(rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> impl Stream<Item = StreamEvent> + Send + 'static {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) })
}

/// Derive the sidecar's admin endpoint from the agent's own endpoint:
/// same host, fixed proxy port (spec §6 "Credential-injection proxy"; the
/// exact port is the sandbox image contract's, mirrored from
/// `RemoteBackend`'s `PROXY_PORT`).
fn proxy_endpoint(agent_endpoint: &str) -> String {
    match agent_endpoint.rsplit_once(':') {
        Some((host, _port)) => format!("{host}:8089"),
        None => agent_endpoint.to_string(),
    }
}

fn message_log_kind(agent_kind: &str) -> MessageLogType {
    match agent_kind {
        "assistant" => MessageLogType::Assistant,
        "tool_call" => MessageLogType::ToolUse,
        "tool_result" => MessageLogType::ToolResult,
        "system" | "init" => MessageLogType::System,
        "result" => MessageLogType::Result,
        _ => MessageLogType::System,
    }
}

/// Re-serialize one agent-native NDJSON line onto the caller's wire
/// taxonomy (spec §4.2 step 7). Lines with no caller-facing
/// representation (e.g. raw `result`, already captured as `done`) return
/// `None` and are dropped at the boundary.
fn translate_event(line: &AgentEventLine, extended_reasoning: bool) -> Option<StreamEvent> {
    let f = &line.fields;
    let str_field = |name: &str| f.get(name).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    match line.kind.as_str() {
        "init" => Some(StreamEvent::Init {
            session_id: str_field("session_id"),
            tools: f.get("tools").and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect()).unwrap_or_default(),
            model: str_field("model"),
        }),
        "assistant" => Some(StreamEvent::Assistant {
            text: f.get("text").and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect()).unwrap_or_else(|| vec![str_field("text")]),
            parent_agent_id: f.get("parent_agent_id").and_then(|v| v.as_str()).map(String::from),
        }),
        "tool_call" => Some(StreamEvent::ToolCall {
            tool_use_id: str_field("tool_use_id"),
            tool_name: str_field("tool_name"),
            input_preview: str_field("input_preview"),
            summary: str_field("summary"),
            parent_agent_id: f.get("parent_agent_id").and_then(|v| v.as_str()).map(String::from),
        }),
        "tool_result" => Some(StreamEvent::ToolResult {
            tool_use_id: str_field("tool_use_id"),
            status: str_field("status"),
            content_preview: str_field("content_preview"),
            is_error: f.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false),
            parent_agent_id: f.get("parent_agent_id").and_then(|v| v.as_str()).map(String::from),
        }),
        "subagent_start" => Some(StreamEvent::SubagentStart {
            agent_id: str_field("agent_id"),
            agent_type: str_field("agent_type"),
            model: str_field("model"),
        }),
        "subagent_end" => Some(StreamEvent::SubagentEnd {
            agent_id: str_field("agent_id"),
            status: str_field("status"),
            preview: str_field("preview"),
        }),
        "progress" => {
            let kind = match f.get("kind").and_then(|v| v.as_str()) {
                Some("tool") => ProgressKind::Tool,
                Some("thinking") if extended_reasoning => ProgressKind::Thinking,
                Some("thinking") => return None,
                _ => ProgressKind::Generating,
            };
            Some(StreamEvent::Progress {
                kind,
                message: str_field("message"),
                tool_name: f.get("tool_name").and_then(|v| v.as_str()).map(String::from),
                tool_use_id: f.get("tool_use_id").and_then(|v| v.as_str()).map(String::from),
            })
        }
        _ => None,
    }
}

fn accumulate_usage(by_model: &mut HashMap<String, ModelUsage>, fields: &serde_json::Value) {
    let Some(usage) = fields.get("usage").and_then(|v| v.as_object()) else { return };
    for (model, entry) in usage {
        let slot = by_model.entry(model.clone()).or_default();
        slot.input_tokens += entry.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        slot.output_tokens += entry.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        slot.cache_creation_tokens += entry.get("cache_creation_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        slot.cache_read_tokens += entry.get("cache_read_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        slot.cost_usd += entry.get("cost_usd").and_then(|v| v.as_f64()).unwrap_or(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_endpoint_swaps_port_keeping_host() {
        assert_eq!(proxy_endpoint("10.1.2.3:8088"), "10.1.2.3:8089");
        assert_eq!(proxy_endpoint("no-port"), "no-port");
    }

    #[test]
    fn translate_event_drops_unknown_kinds() {
        let line = AgentEventLine { kind: "unknown_internal".to_string(), fields: serde_json::json!({}) };
        assert!(translate_event(&line, true).is_none());
    }

    #[test]
    fn translate_event_maps_assistant_text() {
        let line = AgentEventLine { kind: "assistant".to_string(), fields: serde_json::json!({"text": ["hi"]}) };
        match translate_event(&line, true) {
            Some(StreamEvent::Assistant { text, .. }) => assert_eq!(text, vec!["hi".to_string()]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn translate_event_drops_thinking_progress_when_reasoning_disabled() {
        let line = AgentEventLine {
            kind: "progress".to_string(),
            fields: serde_json::json!({"kind": "thinking", "message": "pondering"}),
        };
        assert!(translate_event(&line, false).is_none());
    }

    #[test]
    fn translate_event_forwards_thinking_progress_when_reasoning_enabled() {
        let line = AgentEventLine {
            kind: "progress".to_string(),
            fields: serde_json::json!({"kind": "thinking", "message": "pondering"}),
        };
        match translate_event(&line, true) {
            Some(StreamEvent::Progress { kind: ProgressKind::Thinking, .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn accumulate_usage_sums_across_calls() {
        let mut by_model = HashMap::new();
        accumulate_usage(&mut by_model, &serde_json::json!({"usage": {"claude": {"input_tokens": 10, "output_tokens": 2}}}));
        accumulate_usage(&mut by_model, &serde_json::json!({"usage": {"claude": {"input_tokens": 5, "output_tokens": 1}}}));
        assert_eq!(by_model["claude"].input_tokens, 15);
        assert_eq!(by_model["claude"].output_tokens, 3);
    }
}
