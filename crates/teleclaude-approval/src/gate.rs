//! Permission gate: suspends a tool call until a human decides.
//!
//! # Flow
//!
//! 1. Tools on the always-allow list pass immediately, without a prompt.
//! 2. Otherwise a pending entry is registered under a short random id and the
//!    prompt is pushed through the attached [`ApprovalPrompter`].
//! 3. The caller waits on a oneshot channel. The prompt send and the wait
//!    share one deadline, so a hanging surface cannot stall the agent.
//! 4. [`PermissionGate::resolve`] (driven by the UI callback), the timeout,
//!    or [`PermissionGate::cancel_all`] settles the request.
//!
//! The sender half of each channel lives only in the pending table. Whoever
//! removes the entry owns the right to decide, so a callback racing the
//! timeout is settled exactly once.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use teleclaude_core::{ApprovalPrompt, ApprovalPrompter, PermissionAction, ToolInput};
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info, warn};

/// Default time a request waits for a human (5 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Length of a request id.
const REQUEST_ID_LEN: usize = 8;

/// Outcome of an approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run the tool once.
    Allow,
    /// Run the tool; the tool is now always allowed on this gate.
    AllowAlways,
    /// Do not run the tool.
    Deny {
        /// Why, for logs and for the agent.
        reason: String,
    },
}

impl Decision {
    fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    /// Whether the tool may run.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow | Self::AllowAlways)
    }

    /// Denial reason, if denied.
    #[must_use]
    pub fn deny_reason(&self) -> Option<&str> {
        match self {
            Self::Deny { reason } => Some(reason),
            Self::Allow | Self::AllowAlways => None,
        }
    }
}

impl From<PermissionAction> for Decision {
    fn from(action: PermissionAction) -> Self {
        match action {
            PermissionAction::Allow => Self::Allow,
            PermissionAction::AllowAlways => Self::AllowAlways,
            PermissionAction::Deny => Self::deny("denied by user"),
        }
    }
}

/// Snapshot of an unresolved request, for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    /// Request id.
    pub id: String,
    /// Tool awaiting approval.
    pub tool_name: String,
    /// Its parameters.
    pub tool_input: ToolInput,
}

struct PendingEntry {
    tool_name: String,
    tool_input: ToolInput,
    responder: oneshot::Sender<Decision>,
}

/// Per-session approval gate.
///
/// Construct one per chat session and share it behind an [`Arc`]; the UI
/// callback handler and the turn driver both hold a reference.
pub struct PermissionGate {
    /// Unresolved requests by id. Never held across an `.await`.
    pending: Mutex<HashMap<String, PendingEntry>>,
    /// Tool names that skip the prompt. Only grows.
    always_allowed: Mutex<HashSet<String>>,
    /// Where prompts are shown.
    prompter: RwLock<Option<Arc<dyn ApprovalPrompter>>>,
    /// How long a request waits, prompt send included.
    timeout: Duration,
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate")
            .field("pending", &self.pending_count())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PermissionGate {
    /// Create a gate with the default timeout and no prompter attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            always_allowed: Mutex::new(HashSet::new()),
            prompter: RwLock::new(None),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a different timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a prompter at construction.
    #[must_use]
    pub fn with_prompter(self, prompter: Arc<dyn ApprovalPrompter>) -> Self {
        Self {
            prompter: RwLock::new(Some(prompter)),
            ..self
        }
    }

    /// Attach or replace the prompter.
    pub async fn set_prompter(&self, prompter: Arc<dyn ApprovalPrompter>) {
        *self.prompter.write().await = Some(prompter);
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.pending.lock().unwrap_or_else(|e| {
            warn!("PermissionGate pending lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn lock_always(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.always_allowed.lock().unwrap_or_else(|e| {
            warn!("PermissionGate always-allow lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Whether `tool_name` skips the prompt.
    #[must_use]
    pub fn is_always_allowed(&self, tool_name: &str) -> bool {
        self.lock_always().contains(tool_name)
    }

    /// Number of unresolved requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Unresolved requests, in no particular order.
    #[must_use]
    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.lock_pending()
            .iter()
            .map(|(id, entry)| PendingApproval {
                id: id.clone(),
                tool_name: entry.tool_name.clone(),
                tool_input: entry.tool_input.clone(),
            })
            .collect()
    }

    /// Ask a human whether `tool_name` may run with `tool_input`.
    ///
    /// Never fails: every problem (no prompter, prompt failure, timeout,
    /// session teardown) comes back as [`Decision::Deny`].
    pub async fn request_approval(&self, tool_name: &str, tool_input: &ToolInput) -> Decision {
        if self.is_always_allowed(tool_name) {
            debug!(tool = %tool_name, "tool is always allowed, skipping prompt");
            return Decision::Allow;
        }

        let (tx, mut rx) = oneshot::channel();
        let request_id = self.register(tool_name, tool_input, tx);
        info!(request_id = %request_id, tool = %tool_name, "approval requested");

        let prompt = ApprovalPrompt {
            request_id: request_id.clone(),
            tool_name: tool_name.to_string(),
            tool_input: tool_input.clone(),
        };

        let waited =
            tokio::time::timeout(self.timeout, self.prompt_and_wait(&prompt, &mut rx)).await;

        let decision = match waited {
            Ok(decision) => decision,
            Err(_) => {
                warn!(request_id = %request_id, tool = %tool_name, "approval request timed out");
                self.abandon(&request_id, Decision::deny("timed out"), &mut rx)
            },
        };

        info!(
            request_id = %request_id,
            tool = %tool_name,
            allowed = decision.is_allowed(),
            "approval settled"
        );
        decision
    }

    /// Insert a pending entry under a fresh id.
    fn register(
        &self,
        tool_name: &str,
        tool_input: &ToolInput,
        responder: oneshot::Sender<Decision>,
    ) -> String {
        let mut pending = self.lock_pending();
        let id = loop {
            let candidate: String = uuid::Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(REQUEST_ID_LEN)
                .collect();
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        pending.insert(
            id.clone(),
            PendingEntry {
                tool_name: tool_name.to_string(),
                tool_input: tool_input.clone(),
                responder,
            },
        );
        id
    }

    async fn prompt_and_wait(
        &self,
        prompt: &ApprovalPrompt,
        rx: &mut oneshot::Receiver<Decision>,
    ) -> Decision {
        let prompter = self.prompter.read().await.clone();
        let Some(prompter) = prompter else {
            warn!(
                request_id = %prompt.request_id,
                "no approval prompter attached, denying"
            );
            return self.abandon(
                &prompt.request_id,
                Decision::deny("no approval surface available"),
                rx,
            );
        };

        if let Err(e) = prompter.show_approval_prompt(prompt).await {
            warn!(request_id = %prompt.request_id, error = %e, "failed to show approval prompt");
            return self.abandon(
                &prompt.request_id,
                Decision::deny(format!("failed to show prompt: {e}")),
                rx,
            );
        }

        match rx.await {
            Ok(decision) => decision,
            // Senders are only dropped after sending, so this means the gate
            // itself went away.
            Err(_) => Decision::deny("approval request dropped"),
        }
    }

    /// Give up on a request from the waiting side.
    ///
    /// If the entry is still pending we own it and `fallback` is the answer.
    /// If it is gone, a resolver got there first and has already sent its
    /// decision while holding the table lock.
    fn abandon(
        &self,
        request_id: &str,
        fallback: Decision,
        rx: &mut oneshot::Receiver<Decision>,
    ) -> Decision {
        if self.lock_pending().remove(request_id).is_some() {
            return fallback;
        }
        rx.try_recv().unwrap_or(fallback)
    }

    /// Settle a pending request from the UI.
    ///
    /// Returns `(true, confirmation)` naming the tool, or
    /// `(false, "not found or expired")` when the id is unknown, already
    /// settled, or timed out.
    pub fn resolve(&self, request_id: &str, action: PermissionAction) -> (bool, String) {
        let mut pending = self.lock_pending();
        let Some(entry) = pending.remove(request_id) else {
            warn!(request_id = %request_id, "approval not found or expired");
            return (false, "not found or expired".to_string());
        };

        if action == PermissionAction::AllowAlways {
            self.lock_always().insert(entry.tool_name.clone());
            info!(tool = %entry.tool_name, "tool added to always-allow list");
        }

        // Sent under the table lock so a waiter that finds the entry gone
        // can always read the decision.
        if entry.responder.send(Decision::from(action)).is_err() {
            debug!(request_id = %request_id, "approval waiter already gone");
        }
        drop(pending);

        info!(request_id = %request_id, tool = %entry.tool_name, action = %action, "approval resolved");
        let message = match action {
            PermissionAction::Allow => format!("Allowed: {}", entry.tool_name),
            PermissionAction::AllowAlways => format!("Always allowed: {}", entry.tool_name),
            PermissionAction::Deny => format!("Denied: {}", entry.tool_name),
        };
        (true, message)
    }

    /// Deny every pending request with "operation cancelled".
    ///
    /// Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut pending = self.lock_pending();
        let count = pending.len();
        for (id, entry) in pending.drain() {
            debug!(request_id = %id, tool = %entry.tool_name, "cancelling approval");
            let _ = entry
                .responder
                .send(Decision::deny("operation cancelled"));
        }
        drop(pending);

        if count > 0 {
            info!(count, "cancelled pending approvals");
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleclaude_test::MockPrompter;

    fn bash(command: &str) -> ToolInput {
        ToolInput::new().with("command", command)
    }

    fn as_prompter(prompter: &Arc<MockPrompter>) -> Arc<dyn ApprovalPrompter> {
        Arc::clone(prompter) as Arc<dyn ApprovalPrompter>
    }

    fn gate_with(prompter: &Arc<MockPrompter>) -> Arc<PermissionGate> {
        Arc::new(PermissionGate::new().with_prompter(as_prompter(prompter)))
    }

    #[test]
    fn decision_helpers() {
        assert!(Decision::Allow.is_allowed());
        assert!(Decision::AllowAlways.is_allowed());
        let deny = Decision::deny("nope");
        assert!(!deny.is_allowed());
        assert_eq!(deny.deny_reason(), Some("nope"));
        assert_eq!(Decision::Allow.deny_reason(), None);
    }

    #[test]
    fn resolve_unknown_id_fails_without_panicking() {
        let gate = PermissionGate::new();
        let (ok, message) = gate.resolve("unknown-id", PermissionAction::Allow);
        assert!(!ok);
        assert_eq!(message, "not found or expired");
    }

    #[test]
    fn cancel_all_on_empty_gate() {
        assert_eq!(PermissionGate::new().cancel_all(), 0);
    }

    #[tokio::test]
    async fn no_prompter_denies_and_leaves_nothing_pending() {
        let gate = PermissionGate::new();
        let decision = gate.request_approval("Bash", &bash("ls")).await;
        assert_eq!(
            decision.deny_reason(),
            Some("no approval surface available")
        );
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn failing_prompter_denies() {
        let prompter = Arc::new(MockPrompter::failing());
        let gate = gate_with(&prompter);
        let decision = gate.request_approval("Write", &ToolInput::new()).await;
        assert!(!decision.is_allowed());
        assert!(
            decision
                .deny_reason()
                .unwrap()
                .starts_with("failed to show prompt")
        );
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn allow_resolves_waiter() {
        let prompter = Arc::new(MockPrompter::new());
        let gate = gate_with(&prompter);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_approval("Bash", &bash("ls")).await })
        };

        let prompt = prompter.next_prompt().await;
        assert_eq!(prompt.tool_name, "Bash");
        assert_eq!(prompt.request_id.len(), 8);
        assert_eq!(gate.pending_count(), 1);

        let (ok, message) = gate.resolve(&prompt.request_id, PermissionAction::Allow);
        assert!(ok);
        assert_eq!(message, "Allowed: Bash");
        assert_eq!(waiter.await.unwrap(), Decision::Allow);
        assert_eq!(gate.pending_count(), 0);
        assert!(!gate.is_always_allowed("Bash"));
    }

    #[tokio::test]
    async fn deny_resolves_waiter() {
        let prompter = Arc::new(MockPrompter::new());
        let gate = gate_with(&prompter);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_approval("Edit", &ToolInput::new()).await })
        };

        let prompt = prompter.next_prompt().await;
        let (ok, message) = gate.resolve(&prompt.request_id, PermissionAction::Deny);
        assert!(ok);
        assert_eq!(message, "Denied: Edit");
        assert_eq!(
            waiter.await.unwrap().deny_reason(),
            Some("denied by user")
        );
    }

    #[tokio::test]
    async fn second_resolve_reports_not_found() {
        let prompter = Arc::new(MockPrompter::new());
        let gate = gate_with(&prompter);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_approval("Bash", &bash("ls")).await })
        };

        let prompt = prompter.next_prompt().await;
        assert!(gate.resolve(&prompt.request_id, PermissionAction::Deny).0);
        let (ok, message) = gate.resolve(&prompt.request_id, PermissionAction::Allow);
        assert!(!ok);
        assert_eq!(message, "not found or expired");
        assert!(!waiter.await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn concurrent_requests_and_allow_always_bypass() {
        let prompter = Arc::new(MockPrompter::new());
        let gate = gate_with(&prompter);

        let bash_waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_approval("Bash", &bash("make")).await })
        };
        let write_waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.request_approval("Write", &ToolInput::new().with("file_path", "/tmp/x"))
                    .await
            })
        };

        let first = prompter.next_prompt().await;
        let second = prompter.next_prompt().await;
        assert_ne!(first.request_id, second.request_id);
        assert_eq!(gate.pending_count(), 2);

        let (bash_prompt, write_prompt) = if first.tool_name == "Bash" {
            (first, second)
        } else {
            (second, first)
        };

        // Resolve out of order.
        let (ok, message) = gate.resolve(&write_prompt.request_id, PermissionAction::Deny);
        assert!(ok);
        assert_eq!(message, "Denied: Write");
        let (ok, message) = gate.resolve(&bash_prompt.request_id, PermissionAction::AllowAlways);
        assert!(ok);
        assert_eq!(message, "Always allowed: Bash");

        assert!(!write_waiter.await.unwrap().is_allowed());
        assert_eq!(bash_waiter.await.unwrap(), Decision::AllowAlways);
        assert!(gate.is_always_allowed("Bash"));

        // Later Bash calls bypass the prompt entirely.
        let decision = gate.request_approval("Bash", &bash("rm -rf target")).await;
        assert_eq!(decision, Decision::Allow);
        assert_eq!(prompter.prompt_count(), 2);
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_denies_and_expires_request() {
        let prompter = Arc::new(MockPrompter::new());
        let gate = gate_with(&prompter);

        let decision = gate.request_approval("Bash", &bash("ls")).await;
        assert_eq!(decision.deny_reason(), Some("timed out"));
        assert_eq!(gate.pending_count(), 0);

        let prompt = prompter.next_prompt().await;
        let (ok, message) = gate.resolve(&prompt.request_id, PermissionAction::Allow);
        assert!(!ok);
        assert_eq!(message, "not found or expired");
    }

    #[tokio::test(start_paused = true)]
    async fn custom_timeout_is_honoured() {
        let prompter = Arc::new(MockPrompter::new());
        let gate = PermissionGate::new()
            .with_timeout(Duration::from_secs(2))
            .with_prompter(as_prompter(&prompter));

        let start = tokio::time::Instant::now();
        let decision = gate.request_approval("Bash", &bash("ls")).await;
        assert!(!decision.is_allowed());
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_prompter_is_bounded_by_timeout() {
        let prompter = Arc::new(MockPrompter::hanging());
        let gate = gate_with(&prompter);

        let decision = gate.request_approval("Bash", &bash("ls")).await;
        assert_eq!(decision.deny_reason(), Some("timed out"));
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancel_all_denies_everything_pending() {
        let prompter = Arc::new(MockPrompter::new());
        let gate = gate_with(&prompter);

        let waiters: Vec<_> = ["Bash", "Write", "Edit"]
            .into_iter()
            .map(|tool| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.request_approval(tool, &ToolInput::new()).await })
            })
            .collect();

        for _ in 0..3 {
            prompter.next_prompt().await;
        }
        assert_eq!(gate.pending_approvals().len(), 3);

        assert_eq!(gate.cancel_all(), 3);
        assert_eq!(gate.pending_count(), 0);

        for waiter in waiters {
            assert_eq!(
                waiter.await.unwrap().deny_reason(),
                Some("operation cancelled")
            );
        }
    }

    #[tokio::test]
    async fn resolve_racing_abandon_settles_once() {
        let gate = PermissionGate::new();
        let (tx, mut rx) = oneshot::channel();
        let id = gate.register("Bash", &ToolInput::new(), tx);

        // Resolver wins: the waiter must see the resolver's decision.
        assert!(gate.resolve(&id, PermissionAction::Allow).0);
        let decision = gate.abandon(&id, Decision::deny("timed out"), &mut rx);
        assert_eq!(decision, Decision::Allow);

        // Waiter wins: the resolver must see not-found.
        let (tx, mut rx) = oneshot::channel();
        let id = gate.register("Bash", &ToolInput::new(), tx);
        let decision = gate.abandon(&id, Decision::deny("timed out"), &mut rx);
        assert_eq!(decision.deny_reason(), Some("timed out"));
        assert!(!gate.resolve(&id, PermissionAction::Allow).0);
    }
}
