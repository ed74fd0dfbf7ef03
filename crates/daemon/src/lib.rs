// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace Container Orchestration daemon: process wiring, the HTTP
//! surface, and environment-variable configuration. `main.rs` is a thin
//! binary entry point over this crate.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod http;
pub mod startup;

pub use http::AppState;
pub use startup::{BackgroundLoops, StartupError};
