// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP surface (spec §6): the streaming execution endpoint plus
//! `/healthz` and `/metrics`.

use crate::env;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use wco_adapters::backend::LifecycleBackend;
use wco_adapters::KvClient;
use wco_core::{AttachmentMeta, ContainerId, Conversation, ConversationId, DaemonHealth, OrchestratorError, SystemClock, TenantId};
use wco_engine::{GarbageCollector, Orchestrator, TurnInput, WarmPool};
use wco_storage::Store;
use wco_wire::sse::RETRY_HINT_MS;
use wco_wire::RequestData;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator<SystemClock>>,
    pub store: Store,
    pub backend: Arc<dyn LifecycleBackend>,
    pub warm_pool: Arc<WarmPool<SystemClock>>,
    pub gc: Arc<GarbageCollector<SystemClock>>,
    pub kv: KvClient,
    /// Conversations with a stream currently open, so `/healthz` can
    /// report `active_executions` and the GC loop knows what to sweep.
    pub active_conversations: Arc<Mutex<HashSet<ConversationId>>>,
    pub metrics_handle: PrometheusHandle,
    pub started_at: Instant,
    pub last_error: Arc<Mutex<Option<String>>>,
}

/// Ambient operator tooling, not a spec module (SPEC_FULL.md §1): backs
/// `workspacectl`'s pool/GC/container diagnostics.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tenants/:tenant/conversations/:conversation/stream", post(stream_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/admin/pool", get(admin_pool_status))
        .route("/admin/gc/run", post(admin_gc_run))
        .route("/admin/containers", get(admin_list_containers))
        .route("/admin/containers/:id/destroy", post(admin_destroy_container))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bad_request(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

/// Gate applied to every `/stream` request once the conversation row is
/// loaded: tenant scoping, then the context-window block (spec §4 step
/// 2, "`>= 95%` blocks the turn").
fn authorize_stream(conversation: &Conversation, tenant_id: &TenantId) -> Result<(), (StatusCode, String)> {
    if conversation.tenant_id != *tenant_id {
        return Err((StatusCode::NOT_FOUND, "conversation not found".to_string()));
    }
    if conversation.context_limit_exceeded() {
        return Err((StatusCode::CONFLICT, "conversation has exceeded its context window".to_string()));
    }
    Ok(())
}

/// `POST /api/tenants/{tenant}/conversations/{conv}/stream` (spec §6).
/// Parses the multipart body, runs one turn, and relays the resulting
/// event stream as SSE with a per-connection monotonic `seq` distinct
/// from the message-log row `seq` the orchestrator persists internally.
async fn stream_handler(
    State(state): State<AppState>,
    Path((tenant, conversation)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let tenant_id = TenantId::from_string(&tenant);
    let conversation_id = ConversationId::from_string(&conversation);

    let conversation = state
        .store
        .get_conversation(&conversation_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "conversation not found".to_string()))?;
    authorize_stream(&conversation, &tenant_id)?;

    if state.kv.is_locked(&conversation_id).await.unwrap_or(false) {
        let status = StatusCode::from_u16(OrchestratorError::ConversationLocked.http_status_before_stream())
            .unwrap_or(StatusCode::CONFLICT);
        return Err((status, OrchestratorError::ConversationLocked.to_string()));
    }

    let mut request_data: Option<RequestData> = None;
    let mut file_metadata: Vec<AttachmentMeta> = Vec::new();
    let mut file_bytes: Vec<Vec<u8>> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        match field.name().unwrap_or_default() {
            "request_data" => {
                let text = field.text().await.map_err(bad_request)?;
                request_data = Some(serde_json::from_str(&text).map_err(bad_request)?);
            }
            "file_metadata" => {
                let text = field.text().await.map_err(bad_request)?;
                file_metadata = serde_json::from_str(&text).map_err(bad_request)?;
            }
            "files[]" | "files" => {
                let bytes = field.bytes().await.map_err(bad_request)?;
                file_bytes.push(bytes.to_vec());
            }
            _ => {}
        }
    }

    let request_data = request_data.ok_or_else(|| bad_request("missing request_data field"))?;
    if file_metadata.len() != file_bytes.len() {
        return Err(bad_request("file_metadata does not align 1:1 with files[]"));
    }
    // `executor` is audit metadata about who triggered the turn (spec
    // §6); the orchestrator itself never consults it.
    let _executor = &request_data.executor;

    let attachments: Vec<(AttachmentMeta, Vec<u8>)> = file_metadata.into_iter().zip(file_bytes).collect();

    let input = TurnInput {
        user_input: request_data.user_input,
        attachments,
        // Tenant proxy-rule and model configuration is owned by the
        // out-of-scope CRUD layer (spec §1); this daemon only consumes
        // it, so the external caller would normally attach it to the
        // conversation record. Absent that layer, default to empty/the
        // configured fallback model.
        proxy_rules: Vec::new(),
        allowed_tools: Vec::new(),
        model: env::default_model(),
        ephemeral_tokens: request_data.tokens,
        preferred_skills: request_data.preferred_skills,
    };

    state.active_conversations.lock().insert(conversation_id.clone());

    let events = Arc::clone(&state.orchestrator).execute(tenant_id, conversation_id.clone(), input).await;

    let active = state.active_conversations.clone();
    let conv_for_frames = conversation_id.clone();
    let mut seq: u64 = 0;
    let mut first_frame = true;
    let sse_stream = events.map(move |event| {
        seq += 1;
        let id = format!("{conv_for_frames}:{seq}");
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        if event.is_terminal() {
            active.lock().remove(&conv_for_frames);
        }
        let mut frame = Event::default().id(id).event(event.wire_type()).data(data);
        if first_frame {
            frame = frame.retry(Duration::from_millis(RETRY_HINT_MS));
            first_frame = false;
        }
        Ok::<Event, Infallible>(frame)
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new()).into_response())
}

async fn healthz(State(state): State<AppState>) -> Json<DaemonHealth> {
    let warm_pool_size = state.kv.warm_pool_ids().await.map(|v| v.len()).unwrap_or(0);
    Json(DaemonHealth {
        uptime_secs: state.started_at.elapsed().as_secs(),
        warm_pool_size,
        active_executions: state.active_conversations.lock().len(),
        last_gc_sweep_ms: state.gc.last_sweep_ms(),
        last_error: state.last_error.lock().clone(),
    })
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    metrics::gauge!("wco_active_executions").set(state.active_conversations.lock().len() as f64);
    metrics::gauge!("wco_warm_pool_exhaustion_total").set(state.warm_pool.exhaustion_count() as f64);
    metrics::counter!("wco_gc_destroyed_total").absolute(state.gc.destroyed_count());
    metrics::counter!("wco_gc_orphans_total").absolute(state.gc.orphan_count());
    state.metrics_handle.render()
}

#[derive(serde::Serialize)]
struct PoolStatus {
    min: usize,
    max: usize,
    size: usize,
    exhaustion_count: u64,
}

async fn admin_pool_status(State(state): State<AppState>) -> Result<Json<PoolStatus>, (StatusCode, String)> {
    let size = state.kv.warm_pool_ids().await.map(|v| v.len()).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(PoolStatus {
        min: state.warm_pool.min(),
        max: state.warm_pool.max(),
        size,
        exhaustion_count: state.warm_pool.exhaustion_count(),
    }))
}

#[derive(serde::Serialize)]
struct GcRunResult {
    destroyed_count: u64,
    orphan_count: u64,
}

async fn admin_gc_run(State(state): State<AppState>) -> Json<GcRunResult> {
    state.gc.sweep_once().await;
    Json(GcRunResult { destroyed_count: state.gc.destroyed_count(), orphan_count: state.gc.orphan_count() })
}

async fn admin_list_containers(State(state): State<AppState>) -> Result<Json<Vec<wco_adapters::backend::SandboxListing>>, (StatusCode, String)> {
    let listing = state
        .backend
        .list_workspace_containers()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(listing))
}

async fn admin_destroy_container(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, (StatusCode, String)> {
    let container_id = ContainerId::from_string(id);
    state
        .backend
        .destroy(&container_id, Duration::from_secs(10))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wco_core::ConversationStatus;

    fn conv(tenant_id: TenantId, estimated: u64, window: u64) -> Conversation {
        Conversation {
            id: ConversationId::new(),
            tenant_id,
            session_id: None,
            status: ConversationStatus::Active,
            input_tokens: 0,
            output_tokens: 0,
            estimated_context_tokens: estimated,
            context_window: window,
            title: None,
        }
    }

    #[test]
    fn authorize_stream_rejects_foreign_tenant() {
        let owner = TenantId::new();
        let conversation = conv(owner, 0, 200_000);
        let result = authorize_stream(&conversation, &TenantId::new());
        assert_eq!(result.unwrap_err().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn authorize_stream_blocks_at_context_limit() {
        let tenant_id = TenantId::new();
        let conversation = conv(tenant_id, 190_001, 200_000);
        let result = authorize_stream(&conversation, &tenant_id);
        assert_eq!(result.unwrap_err().0, StatusCode::CONFLICT);
    }

    #[test]
    fn authorize_stream_passes_same_tenant_under_limit() {
        let tenant_id = TenantId::new();
        let conversation = conv(tenant_id, 100, 200_000);
        assert!(authorize_stream(&conversation, &tenant_id).is_ok());
    }

    #[test]
    fn pool_status_serializes_with_expected_fields() {
        let status = PoolStatus { min: 1, max: 5, size: 2, exhaustion_count: 3 };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["min"], 1);
        assert_eq!(json["max"], 5);
        assert_eq!(json["size"], 2);
        assert_eq!(json["exhaustion_count"], 3);
    }
}
