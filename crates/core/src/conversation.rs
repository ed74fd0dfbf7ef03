// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The conversation entity, owned by the external CRUD layer but read
//! here for context-limit gating and token accumulation.

use crate::ids::{ConversationId, TenantId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Closed,
}

/// A conversation's orchestration-relevant state. `input_tokens` and
/// `output_tokens` are accumulated totals (see the Open Question decision
/// in DESIGN.md on how this stays idempotent under event replay);
/// `estimated_context_tokens` is refreshed after every execution from the
/// agent's own accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub tenant_id: TenantId,
    /// Opaque in-sandbox agent session handle, used to resume multi-turn
    /// context. `None` before the first successful execution.
    pub session_id: Option<String>,
    pub status: ConversationStatus,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_context_tokens: u64,
    /// Context window of the active model, used for the 95% gate.
    pub context_window: u64,
    /// Set once the first execution's title-generation call completes.
    pub title: Option<String>,
}

/// Warning level attached to a `context_status` event, derived from the
/// ratio `estimated_context_tokens / context_window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextWarningLevel {
    Normal,
    Warning,
    Critical,
    Blocked,
}

impl Conversation {
    /// Ratio in `[0, 1+]` of estimated context usage against the window.
    pub fn context_ratio(&self) -> f64 {
        if self.context_window == 0 {
            return 0.0;
        }
        self.estimated_context_tokens as f64 / self.context_window as f64
    }

    /// The context-limit gate from spec step 2: `>= 95%` blocks the turn.
    pub fn context_limit_exceeded(&self) -> bool {
        self.context_ratio() >= 0.95
    }

    pub fn warning_level(&self) -> ContextWarningLevel {
        let ratio = self.context_ratio();
        if ratio >= 0.95 {
            ContextWarningLevel::Blocked
        } else if ratio >= 0.90 {
            ContextWarningLevel::Critical
        } else if ratio >= 0.75 {
            ContextWarningLevel::Warning
        } else {
            ContextWarningLevel::Normal
        }
    }

    pub fn is_first_turn(&self) -> bool {
        self.title.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(estimated: u64, window: u64) -> Conversation {
        Conversation {
            id: ConversationId::new(),
            tenant_id: TenantId::new(),
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
    fn gate_trips_at_95_percent() {
        assert!(!conv(940, 1000).context_limit_exceeded());
        assert!(conv(950, 1000).context_limit_exceeded());
        assert!(conv(980, 1000).context_limit_exceeded());
    }

    #[test]
    fn warning_levels_step_up() {
        assert_eq!(conv(100, 1000).warning_level(), ContextWarningLevel::Normal);
        assert_eq!(conv(800, 1000).warning_level(), ContextWarningLevel::Warning);
        assert_eq!(conv(920, 1000).warning_level(), ContextWarningLevel::Critical);
        assert_eq!(conv(960, 1000).warning_level(), ContextWarningLevel::Blocked);
    }
}
