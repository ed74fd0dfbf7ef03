// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-system adapters: the polymorphic lifecycle backend (local
//! Docker / remote Kubernetes), the sandbox agent HTTP client, the
//! credential-injection proxy, the shared KV, the object store, and the
//! workspace file synchronizer.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod backend;
pub mod credential;
pub mod kv;
pub mod object_store;
pub mod proxy;
pub mod sandbox_client;
pub mod workspace_sync;

pub use backend::{BackendError, BackendKind, ContainerInfo, LifecycleBackend, SandboxListing};
pub use credential::{resolve as resolve_signing_credential, SigningCredential};
pub use kv::{KvClient, KvError};
pub use object_store::{ObjectEntry, ObjectStoreClient, ObjectStoreError};
pub use proxy::{CredentialProxy, ProxyError};
pub use sandbox_client::{SandboxClient, SandboxClientError};
pub use workspace_sync::{WorkspaceSync, WorkspaceSyncError};
