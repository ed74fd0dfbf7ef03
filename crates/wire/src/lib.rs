// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire formats shared between the daemon, the shared KV, and the
//! in-sandbox agent: SSE framing, the sandbox agent HTTP API DTOs, the
//! shared-KV key schema, and the streaming endpoint's request DTOs.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod kv_schema;
pub mod sandbox_api;
pub mod sse;
pub mod stream_request;

pub use kv_schema::{ContainerRecord, WarmPoolInfo};
pub use sandbox_api::{AgentEventLine, ExecBinaryResponse, ExecRequest, ExecResponse, ExecuteRequest, HealthResponse};
pub use sse::{encode_frame, SseEncodeError};
pub use stream_request::{Executor, RequestData, StreamRequest};
