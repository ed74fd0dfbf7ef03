// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution error taxonomy (spec §7).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors signaled via a terminal `error` event, or as an HTTP error
/// before the stream starts.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum OrchestratorError {
    #[error("another execution is already in flight for this conversation")]
    ConversationLocked,

    #[error("conversation has exceeded its context window; it must start anew")]
    ContextLimitExceeded,

    #[error("sandbox agent SDK is not installed in the image")]
    SdkNotInstalled,

    #[error("invalid execution options: {message}")]
    OptionsError { message: String },

    #[error("model validation failed: {message}")]
    ModelValidationError { message: String },

    #[error("agent-surfaced execution failure: {message}")]
    ExecutionError { message: String },

    #[error("no event received from the sandbox agent for {secs}s")]
    TimeoutError { secs: u64 },

    #[error("background file-sync or post-processing failure: {message}")]
    BackgroundExecutionError { message: String },

    #[error("background task failure: {message}")]
    BackgroundTaskError { message: String },
}

impl OrchestratorError {
    /// Whether the client should retry, per the taxonomy table in spec §7.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::ConversationLocked | OrchestratorError::TimeoutError { .. }
        )
    }

    /// The wire-level `error_type` tag, stable across releases.
    pub fn error_type(&self) -> &'static str {
        match self {
            OrchestratorError::ConversationLocked => "conversation_locked",
            OrchestratorError::ContextLimitExceeded => "context_limit_exceeded",
            OrchestratorError::SdkNotInstalled => "sdk_not_installed",
            OrchestratorError::OptionsError { .. } => "options_error",
            OrchestratorError::ModelValidationError { .. } => "model_validation_error",
            OrchestratorError::ExecutionError { .. } => "execution_error",
            OrchestratorError::TimeoutError { .. } => "timeout_error",
            OrchestratorError::BackgroundExecutionError { .. } => "background_execution_error",
            OrchestratorError::BackgroundTaskError { .. } => "background_task_error",
        }
    }

    /// HTTP status to use when this error occurs before the stream has
    /// started (spec §7: "errors before the first event leave the HTTP
    /// status meaningful").
    pub fn http_status_before_stream(&self) -> u16 {
        match self {
            OrchestratorError::ConversationLocked => 409,
            OrchestratorError::ContextLimitExceeded => 409,
            OrchestratorError::SdkNotInstalled
            | OrchestratorError::OptionsError { .. }
            | OrchestratorError::ModelValidationError { .. } => 400,
            OrchestratorError::ExecutionError { .. } => 500,
            OrchestratorError::TimeoutError { .. } => 504,
            OrchestratorError::BackgroundExecutionError { .. }
            | OrchestratorError::BackgroundTaskError { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        locked = { OrchestratorError::ConversationLocked, true },
        context = { OrchestratorError::ContextLimitExceeded, false },
        sdk = { OrchestratorError::SdkNotInstalled, false },
        timeout = { OrchestratorError::TimeoutError { secs: 300 }, true },
        execution = { OrchestratorError::ExecutionError { message: "boom".into() }, false },
    )]
    fn recoverability_matches_taxonomy(err: OrchestratorError, expected: bool) {
        assert_eq!(err.recoverable(), expected);
    }
}
