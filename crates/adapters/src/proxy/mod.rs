// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The credential-injection proxy interface (spec §4.5). One trait, two
//! implementations picked by where the proxy actually runs: colocated
//! in the daemon process for the local backend
//! ([`in_process::InProcessProxy`]), or as a pod sidecar reached over
//! localhost for the remote backend ([`sidecar::SidecarProxy`]).

pub mod in_process;
pub mod sidecar;

use std::collections::HashMap;
use thiserror::Error;
use wco_core::ProxyRule;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy transport error: {0}")]
    Transport(String),
    #[error("proxy rejected update: {0}")]
    RuleRejected(String),
}

/// Administrative control surface for a running proxy instance: push the
/// per-sandbox rule set plus the in-flight execution's ephemeral token
/// map (for `${token}` substitution in header templates), and check
/// liveness. The data-plane itself (accepting and forwarding sandbox
/// HTTP traffic) runs separately from this trait: a listener task the
/// local backend spawns per container for [`in_process::InProcessProxy`],
/// or the pod's sidecar container for [`sidecar::SidecarProxy`]. This
/// trait is only the control channel the orchestrator uses to configure
/// whichever one is running.
#[async_trait::async_trait]
pub trait CredentialProxy: Send + Sync {
    /// Replace the full rule set this sandbox's proxy enforces. Must
    /// only be called while no request is executing in the sandbox
    /// (spec §5 "Shared resources").
    async fn update_rules(&self, rules: &[ProxyRule], tokens: &HashMap<String, String>) -> Result<(), ProxyError>;

    async fn health(&self) -> bool;
}
