// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-Sent Events frame encoding for the streaming execution
//! endpoint (spec §6).
//!
//! Frame grammar: `id: {conv}:{seq}\nevent: <type>\ndata: <json>\n\n`.
//! A retry hint is included on the first frame only.

use thiserror::Error;
use wco_core::{ConversationId, StreamEvent};

#[derive(Debug, Error)]
pub enum SseEncodeError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Default client reconnect hint, in milliseconds, sent on the first
/// frame of a stream only.
pub const RETRY_HINT_MS: u64 = 2_000;

/// Encode one [`StreamEvent`] as a single SSE frame.
///
/// `seq` is the per-conversation monotonic sequence number (starts at 1,
/// increments by exactly 1 per frame — spec §8 "Seq monotonicity").
/// `is_first` controls whether the `retry:` line is emitted.
pub fn encode_frame(
    conversation_id: &ConversationId,
    seq: u64,
    event: &StreamEvent,
    is_first: bool,
) -> Result<String, SseEncodeError> {
    let data = serde_json::to_string(event)?;
    let mut frame = String::with_capacity(data.len() + 64);
    if is_first {
        frame.push_str(&format!("retry: {RETRY_HINT_MS}\n"));
    }
    frame.push_str(&format!("id: {conversation_id}:{seq}\n"));
    frame.push_str(&format!("event: {}\n", event.wire_type()));
    frame.push_str(&format!("data: {data}\n\n"));
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_has_expected_shape() {
        let conv = ConversationId::new();
        let event = StreamEvent::Ping { elapsed_ms: 10 };
        let frame = encode_frame(&conv, 3, &event, false).unwrap();
        assert!(frame.starts_with(&format!("id: {conv}:3\n")));
        assert!(frame.contains("event: ping\n"));
        assert!(frame.ends_with("\n\n"));
        assert!(!frame.contains("retry:"));
    }

    #[test]
    fn first_frame_carries_retry_hint() {
        let conv = ConversationId::new();
        let event = StreamEvent::Init { session_id: "s".into(), tools: vec![], model: "m".into() };
        let frame = encode_frame(&conv, 1, &event, true).unwrap();
        assert!(frame.starts_with(&format!("retry: {RETRY_HINT_MS}\n")));
    }

    /// Golden comparison: a fixed conversation id and event, byte-exact
    /// frame. Catches accidental reordering of the `id`/`event`/`data`
    /// lines or a stray change to the JSON field order that a
    /// substring-only assertion would miss.
    #[test]
    fn init_frame_matches_golden_shape() {
        let conv = ConversationId::from_string("conv-goldenfixture000");
        let event = StreamEvent::Init { session_id: "sess-1".into(), tools: vec!["bash".into()], model: "claude-sonnet-4-5".into() };
        let frame = encode_frame(&conv, 1, &event, true).unwrap();
        let expected = format!(
            "retry: {RETRY_HINT_MS}\nid: conv-goldenfixture000:1\nevent: init\ndata: {{\"type\":\"init\",\"session_id\":\"sess-1\",\"tools\":[\"bash\"],\"model\":\"claude-sonnet-4-5\"}}\n\n"
        );
        similar_asserts::assert_eq!(frame, expected);
    }
}
