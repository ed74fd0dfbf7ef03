// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog persistence for conversations, the message log, the usage
//! log, and the workspace-file index. Backed by `rusqlite`, dispatched
//! onto `spawn_blocking` so synchronous disk I/O never shares a task
//! with the streaming bridge (spec §5, §9).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
mod schema;
mod store;

pub use error::StorageError;
pub use store::Store;
