// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation-title generation (spec §4.2 step 8, §9 "offload rule"):
//! a synchronous LLM call the orchestrator must never run inline, since
//! it would otherwise block the streaming bridge. `run_in_container`
//! already spawns [`TitleGenerator::generate`] onto its own task; this
//! module is only responsible for keeping the call itself off the async
//! runtime's worker threads.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const TITLE_COMMAND_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Error)]
pub enum TitleError {
    #[error("title command timed out after {0:?}")]
    Timeout(Duration),
    #[error("title command failed to spawn: {0}")]
    Spawn(std::io::Error),
    #[error("title command exited with status {0}")]
    NonZeroExit(i32),
    #[error("title command produced no output")]
    Empty,
}

/// A source of one-shot conversation titles. Implementations are free to
/// shell out to a model CLI, call a hosted API, or (in tests) return a
/// canned string — the orchestrator only depends on this trait.
#[async_trait]
pub trait TitleGenerator: Send + Sync + 'static {
    async fn generate(&self, preview: &str) -> Result<String, TitleError>;
}

/// Generates a title by piping the first turn's preview into a
/// configured command on stdin and reading one line back on stdout.
/// Grounded on the teacher's `run_with_timeout` subprocess dispatch
/// (`tokio::process::Command` + `tokio::time::timeout`): the call is a
/// synchronous external process from this crate's point of view, so it
/// is bounded the same way a shell step would be.
pub struct SubprocessTitleGenerator {
    program: String,
    args: Vec<String>,
}

impl SubprocessTitleGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }
}

#[async_trait]
impl TitleGenerator for SubprocessTitleGenerator {
    async fn generate(&self, preview: &str) -> Result<String, TitleError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(TitleError::Spawn)?;
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(preview.as_bytes()).await;
        }

        let output = tokio::time::timeout(TITLE_COMMAND_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| TitleError::Timeout(TITLE_COMMAND_TIMEOUT))?
            .map_err(TitleError::Spawn)?;

        if !output.status.success() {
            tracing::warn!(
                program = %self.program,
                status = output.status.code().unwrap_or(-1),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "title generation command failed"
            );
            return Err(TitleError::NonZeroExit(output.status.code().unwrap_or(-1)));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let title = sanitize(raw.lines().next().unwrap_or(""));
        if title.is_empty() {
            return Err(TitleError::Empty);
        }
        Ok(title)
    }
}

/// Truncates to [`MAX_TITLE_CHARS`] on a char boundary and trims
/// surrounding whitespace/quotes a model tends to wrap a title in.
fn sanitize(s: &str) -> String {
    let trimmed = s.trim().trim_matches('"');
    trimmed.chars().take(MAX_TITLE_CHARS).collect()
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::{TitleError, TitleGenerator};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeTitleGenerator {
        inner: Arc<Mutex<Inner>>,
    }

    #[derive(Default)]
    struct Inner {
        calls: Vec<String>,
        next: Option<Result<String, String>>,
    }

    impl FakeTitleGenerator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_title(&self, title: impl Into<String>) {
            self.inner.lock().next = Some(Ok(title.into()));
        }

        pub fn queue_failure(&self, message: impl Into<String>) {
            self.inner.lock().next = Some(Err(message.into()));
        }

        pub fn calls(&self) -> Vec<String> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl TitleGenerator for FakeTitleGenerator {
        async fn generate(&self, preview: &str) -> Result<String, TitleError> {
            let mut inner = self.inner.lock();
            inner.calls.push(preview.to_string());
            match inner.next.take() {
                Some(Ok(title)) => Ok(title),
                Some(Err(message)) => {
                    tracing::debug!(%message, "fake title generator returning queued failure");
                    Err(TitleError::Empty)
                }
                None => Ok(preview.chars().take(30).collect()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_trims_quotes_and_whitespace() {
        assert_eq!(sanitize("  \"Refactor the parser\"  "), "Refactor the parser");
    }

    #[test]
    fn sanitize_truncates_long_titles() {
        let long = "x".repeat(200);
        assert_eq!(sanitize(&long).len(), MAX_TITLE_CHARS);
    }

    #[tokio::test]
    async fn fake_generator_records_calls_and_returns_queued_title() {
        let fake = fake::FakeTitleGenerator::new();
        fake.queue_title("Debugging the sandbox proxy");
        let title = fake.generate("help me debug this").await.expect("title");
        assert_eq!(title, "Debugging the sandbox proxy");
        assert_eq!(fake.calls(), vec!["help me debug this".to_string()]);
    }
}
