// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the sandbox agent API (spec §6), reachable over
//! either a bind-mounted local transport (local backend) or TCP to the
//! task's private address (remote backend) — both speak the same
//! `/health` / `/execute` / `/exec` / `/exec/binary` surface, so one
//! client serves both backends.
//!
//! The teacher hand-rolls a raw HTTP/1.1 client over `TcpStream`
//! (`docker/http.rs`); this system needs a streamed NDJSON response body
//! and TLS to remote sidecars, so `reqwest` is used instead (see
//! DESIGN.md).

use futures_util::StreamExt;
use std::time::Duration;
use thiserror::Error;
use wco_wire::{AgentEventLine, ExecBinaryResponse, ExecRequest, ExecResponse, ExecuteRequest, HealthResponse};

#[derive(Debug, Error)]
pub enum SandboxClientError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sandbox agent returned status {0}")]
    Status(u16),
    #[error("malformed event line: {0}")]
    MalformedLine(#[source] serde_json::Error),
}

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct SandboxClient {
    http: reqwest::Client,
}

impl Default for SandboxClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::builder().build().unwrap_or_default() }
    }

    fn url(endpoint: &str, path: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            format!("{endpoint}{path}")
        } else {
            format!("http://{endpoint}{path}")
        }
    }

    pub async fn health(&self, endpoint: &str, auth_token: &str) -> Result<HealthResponse, SandboxClientError> {
        let resp = tokio::time::timeout(
            HEALTH_TIMEOUT,
            self.http
                .get(Self::url(endpoint, "/health"))
                .bearer_auth(auth_token)
                .send(),
        )
        .await
        .map_err(|_| SandboxClientError::Timeout(HEALTH_TIMEOUT))??;
        if !resp.status().is_success() {
            return Err(SandboxClientError::Status(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }

    /// Opens `/execute` and returns a stream of NDJSON event lines. Each
    /// item is one agent-produced event; the caller (the streaming
    /// pipeline) re-serializes these into [`wco_core::StreamEvent`]s.
    pub async fn execute(
        &self,
        endpoint: &str,
        auth_token: &str,
        request: ExecuteRequest,
    ) -> Result<impl futures_util::Stream<Item = Result<AgentEventLine, SandboxClientError>>, SandboxClientError> {
        let resp = self
            .http
            .post(Self::url(endpoint, "/execute"))
            .bearer_auth(auth_token)
            .json(&request)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SandboxClientError::Status(resp.status().as_u16()));
        }

        let mut buf = Vec::new();
        let byte_stream = resp.bytes_stream();
        Ok(byte_stream.map(move |chunk| chunk.map_err(SandboxClientError::from)).flat_map(move |chunk| {
            let mut lines = Vec::new();
            match chunk {
                Ok(bytes) => {
                    buf.extend_from_slice(&bytes);
                    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        let line = &line[..line.len() - 1];
                        if line.is_empty() {
                            continue;
                        }
                        lines.push(
                            serde_json::from_slice::<AgentEventLine>(line).map_err(SandboxClientError::MalformedLine),
                        );
                    }
                }
                Err(e) => lines.push(Err(e)),
            }
            futures_util::stream::iter(lines)
        }))
    }

    pub async fn exec(
        &self,
        endpoint: &str,
        auth_token: &str,
        cmd: Vec<String>,
    ) -> Result<(i32, String), SandboxClientError> {
        let resp: ExecResponse = tokio::time::timeout(
            EXEC_TIMEOUT,
            self.http
                .post(Self::url(endpoint, "/exec"))
                .bearer_auth(auth_token)
                .json(&ExecRequest { cmd })
                .send(),
        )
        .await
        .map_err(|_| SandboxClientError::Timeout(EXEC_TIMEOUT))??
        .json()
        .await?;
        Ok((resp.exit_code, resp.output))
    }

    pub async fn exec_binary(
        &self,
        endpoint: &str,
        auth_token: &str,
        cmd: Vec<String>,
    ) -> Result<(i32, Vec<u8>), SandboxClientError> {
        let resp: ExecBinaryResponse = tokio::time::timeout(
            EXEC_TIMEOUT,
            self.http
                .post(Self::url(endpoint, "/exec/binary"))
                .bearer_auth(auth_token)
                .json(&ExecRequest { cmd })
                .send(),
        )
        .await
        .map_err(|_| SandboxClientError::Timeout(EXEC_TIMEOUT))??
        .json()
        .await?;
        Ok((resp.exit_code, resp.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_handles_bare_host_port_and_full_url() {
        assert_eq!(SandboxClient::url("127.0.0.1:9100", "/health"), "http://127.0.0.1:9100/health");
        assert_eq!(SandboxClient::url("https://sandbox.internal", "/health"), "https://sandbox.internal/health");
    }
}
