//! Mock UI surfaces for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

use teleclaude_core::{
    ApprovalPrompt, ApprovalPrompter, EditOutcome, MarkupMode, MessageRef, MessageSurface,
    SurfaceError, SurfaceResult,
};

/// One captured call to [`MessageSurface::edit_message`].
#[derive(Debug, Clone)]
pub struct EditRecord {
    /// Target message.
    pub message: MessageRef,
    /// Content as sent.
    pub content: String,
    /// Markup mode as sent.
    pub mode: MarkupMode,
    /// When the call arrived (tokio clock, so paused-time tests can assert
    /// spacing).
    pub at: Instant,
    /// What the mock answered.
    pub outcome: EditOutcome,
}

/// Mock message surface.
///
/// Records every edit. Answers from a queue of scripted outcomes, falling
/// back to [`EditOutcome::Ok`] when the queue is empty. Optionally rejects
/// every HTML edit, as a surface with a strict markup parser would.
#[derive(Debug, Clone, Default)]
pub struct MockSurface {
    /// Captured edits.
    edits: Arc<Mutex<Vec<EditRecord>>>,
    /// Scripted outcomes, consumed front to back.
    outcomes: Arc<Mutex<VecDeque<EditOutcome>>>,
    /// Reject all `MarkupMode::Html` edits with `InvalidMarkup`.
    reject_html: bool,
}

impl MockSurface {
    /// Create a surface that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next edit.
    #[must_use]
    pub fn with_outcome(self, outcome: EditOutcome) -> Self {
        self.queue_outcome(outcome);
        self
    }

    /// Reject every HTML edit as malformed markup.
    #[must_use]
    pub fn rejecting_html(mut self) -> Self {
        self.reject_html = true;
        self
    }

    /// Queue an outcome for a later edit.
    pub fn queue_outcome(&self, outcome: EditOutcome) {
        if let Ok(mut guard) = self.outcomes.lock() {
            guard.push_back(outcome);
        }
    }

    /// All captured edits, oldest first.
    #[must_use]
    pub fn edits(&self) -> Vec<EditRecord> {
        self.edits.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of edit calls so far.
    #[must_use]
    pub fn edit_count(&self) -> usize {
        self.edits.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Content of the most recent edit.
    #[must_use]
    pub fn last_content(&self) -> Option<String> {
        self.edits
            .lock()
            .ok()
            .and_then(|g| g.last().map(|e| e.content.clone()))
    }

    /// Content of the most recent edit that the mock accepted.
    #[must_use]
    pub fn last_accepted(&self) -> Option<EditRecord> {
        self.edits.lock().ok().and_then(|g| {
            g.iter()
                .rev()
                .find(|e| e.outcome.is_success())
                .cloned()
        })
    }

    /// Forget captured edits.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.edits.lock() {
            guard.clear();
        }
    }
}

#[async_trait]
impl MessageSurface for MockSurface {
    async fn edit_message(
        &self,
        message: &MessageRef,
        content: &str,
        mode: MarkupMode,
    ) -> EditOutcome {
        let outcome = if self.reject_html && mode == MarkupMode::Html {
            EditOutcome::InvalidMarkup("can't parse entities".to_string())
        } else {
            self.outcomes
                .lock()
                .ok()
                .and_then(|mut g| g.pop_front())
                .unwrap_or(EditOutcome::Ok)
        };

        if let Ok(mut guard) = self.edits.lock() {
            guard.push(EditRecord {
                message: *message,
                content: content.to_string(),
                mode,
                at: Instant::now(),
                outcome: outcome.clone(),
            });
        }
        outcome
    }
}

/// How a [`MockPrompter`] behaves when asked to show a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptBehavior {
    /// Record the prompt and return `Ok`.
    Show,
    /// Record the prompt and return an error.
    Fail,
    /// Record the prompt and never return.
    Hang,
}

/// Mock approval prompter.
///
/// Every prompt is recorded and also pushed onto a channel so a test can
/// await it with [`MockPrompter::next_prompt`] and then answer through the
/// gate.
#[derive(Debug)]
pub struct MockPrompter {
    behavior: PromptBehavior,
    prompts: Mutex<Vec<ApprovalPrompt>>,
    tx: mpsc::UnboundedSender<ApprovalPrompt>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ApprovalPrompt>>,
}

impl MockPrompter {
    /// A prompter that shows every prompt successfully.
    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(PromptBehavior::Show)
    }

    /// A prompter whose sends always fail.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_behavior(PromptBehavior::Fail)
    }

    /// A prompter whose sends never complete.
    #[must_use]
    pub fn hanging() -> Self {
        Self::with_behavior(PromptBehavior::Hang)
    }

    /// A prompter with explicit behavior.
    #[must_use]
    pub fn with_behavior(behavior: PromptBehavior) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            behavior,
            prompts: Mutex::new(Vec::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Wait for the next prompt that has not been taken yet.
    ///
    /// # Panics
    ///
    /// Panics if the prompter is dropped while waiting, which cannot happen
    /// while `self` is borrowed.
    pub async fn next_prompt(&self) -> ApprovalPrompt {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .expect("prompter holds its own sender")
    }

    /// All prompts shown so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<ApprovalPrompt> {
        self.prompts.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of prompts shown so far.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().map(|g| g.len()).unwrap_or_default()
    }
}

impl Default for MockPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalPrompter for MockPrompter {
    async fn show_approval_prompt(&self, prompt: &ApprovalPrompt) -> SurfaceResult<()> {
        if let Ok(mut guard) = self.prompts.lock() {
            guard.push(prompt.clone());
        }
        let _ = self.tx.send(prompt.clone());

        match self.behavior {
            PromptBehavior::Show => Ok(()),
            PromptBehavior::Fail => Err(SurfaceError::Transport("mock send failed".to_string())),
            PromptBehavior::Hang => std::future::pending::<SurfaceResult<()>>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleclaude_core::ToolInput;

    #[tokio::test]
    async fn surface_records_and_scripts() {
        let surface = MockSurface::new().with_outcome(EditOutcome::Unchanged);
        let msg = MessageRef::new(1, 1);

        assert_eq!(
            surface.edit_message(&msg, "a", MarkupMode::Html).await,
            EditOutcome::Unchanged
        );
        assert_eq!(
            surface.edit_message(&msg, "b", MarkupMode::Plain).await,
            EditOutcome::Ok
        );
        assert_eq!(surface.edit_count(), 2);
        assert_eq!(surface.last_content().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn surface_rejects_html_when_asked() {
        let surface = MockSurface::new().rejecting_html();
        let msg = MessageRef::new(1, 1);
        assert!(matches!(
            surface.edit_message(&msg, "<b>x</b>", MarkupMode::Html).await,
            EditOutcome::InvalidMarkup(_)
        ));
        assert_eq!(
            surface.edit_message(&msg, "x", MarkupMode::Plain).await,
            EditOutcome::Ok
        );
        assert_eq!(surface.last_accepted().unwrap().content, "x");
    }

    #[tokio::test]
    async fn prompter_hands_prompts_to_test() {
        let prompter = MockPrompter::new();
        let prompt = ApprovalPrompt {
            request_id: "abcd1234".into(),
            tool_name: "Bash".into(),
            tool_input: ToolInput::new(),
        };
        prompter.show_approval_prompt(&prompt).await.unwrap();
        assert_eq!(prompter.next_prompt().await, prompt);
        assert_eq!(prompter.prompt_count(), 1);
    }

    #[tokio::test]
    async fn failing_prompter_errors() {
        let prompter = MockPrompter::failing();
        let prompt = ApprovalPrompt {
            request_id: "x".into(),
            tool_name: "Bash".into(),
            tool_input: ToolInput::new(),
        };
        assert!(prompter.show_approval_prompt(&prompt).await.is_err());
    }
}
