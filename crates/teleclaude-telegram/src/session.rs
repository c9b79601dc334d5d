//! Per-chat state: approval gate, turn lock, the agent session to resume,
//! accumulated cost, and the working directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use teleclaude_approval::PermissionGate;
use teleclaude_core::ApprovalPrompter;
use teloxide::types::ChatId;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

/// State for one chat.
struct ChatSession {
    /// Lives as long as the chat; always-allow answers persist across turns.
    gate: Arc<PermissionGate>,
    /// Interrupt handle of the running turn, if any.
    active_turn: Option<Arc<Notify>>,
    /// Agent-side session id carried between turns.
    agent_session_id: Option<String>,
    /// Cost of all turns since the last reset.
    total_cost_usd: f64,
    /// Set by `/cd`; overrides the configured directory.
    working_dir: Option<PathBuf>,
}

/// Result of trying to start a turn.
#[derive(Debug)]
pub enum TurnStart {
    /// The turn may run.
    Started(TurnHandle),
    /// Another turn is still running in this chat.
    Busy,
}

/// What a freshly started turn needs.
#[derive(Debug, Clone)]
pub struct TurnHandle {
    /// The chat's approval gate.
    pub gate: Arc<PermissionGate>,
    /// Signalled by `/cancel`.
    pub interrupt: Arc<Notify>,
    /// Agent session to resume, if a previous turn left one.
    pub resume: Option<String>,
    /// Directory chosen with `/cd`, if any.
    pub working_dir: Option<PathBuf>,
}

/// Map of `ChatId` to chat state, cheap to clone.
#[derive(Clone)]
pub struct ChatSessions {
    inner: Arc<Mutex<HashMap<ChatId, ChatSession>>>,
    approval_timeout: Duration,
}

impl std::fmt::Debug for ChatSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSessions")
            .field("approval_timeout", &self.approval_timeout)
            .finish_non_exhaustive()
    }
}

impl ChatSessions {
    /// Create an empty map whose gates use `approval_timeout`.
    #[must_use]
    pub fn new(approval_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            approval_timeout,
        }
    }

    fn new_session(&self) -> ChatSession {
        ChatSession {
            gate: Arc::new(PermissionGate::new().with_timeout(self.approval_timeout)),
            active_turn: None,
            agent_session_id: None,
            total_cost_usd: 0.0,
            working_dir: None,
        }
    }

    /// Mark a turn as running, creating the chat's state on first use.
    ///
    /// `prompter` becomes the gate's prompter for the turn.
    pub async fn try_start_turn(
        &self,
        chat_id: ChatId,
        prompter: Arc<dyn ApprovalPrompter>,
    ) -> TurnStart {
        let mut guard = self.inner.lock().await;
        let session = guard.entry(chat_id).or_insert_with(|| self.new_session());

        if session.active_turn.is_some() {
            return TurnStart::Busy;
        }
        session.gate.set_prompter(prompter).await;

        let interrupt = Arc::new(Notify::new());
        session.active_turn = Some(Arc::clone(&interrupt));
        TurnStart::Started(TurnHandle {
            gate: Arc::clone(&session.gate),
            interrupt,
            resume: session.agent_session_id.clone(),
            working_dir: session.working_dir.clone(),
        })
    }

    /// Clear the turn lock, remembering the agent session id if one was
    /// reported and adding the turn's cost.
    pub async fn finish_turn(
        &self,
        chat_id: ChatId,
        agent_session_id: Option<String>,
        cost_usd: Option<f64>,
    ) {
        let mut guard = self.inner.lock().await;
        if let Some(session) = guard.get_mut(&chat_id) {
            session.active_turn = None;
            if agent_session_id.is_some() {
                session.agent_session_id = agent_session_id;
            }
            if let Some(cost) = cost_usd {
                session.total_cost_usd += cost;
            }
        }
    }

    /// Interrupt the running turn: signal it and deny everything pending.
    ///
    /// Returns `false` when nothing was running.
    pub async fn interrupt(&self, chat_id: ChatId) -> bool {
        let guard = self.inner.lock().await;
        let Some(session) = guard.get(&chat_id) else {
            return false;
        };
        let Some(interrupt) = &session.active_turn else {
            return false;
        };

        // notify_one stores a permit, so a turn between awaits still sees it.
        interrupt.notify_one();
        let cancelled = session.gate.cancel_all();
        info!(chat_id = %chat_id, cancelled, "turn interrupted");
        true
    }

    /// Forget the carried agent session id and the accumulated cost.
    /// Returns the old session id.
    pub async fn reset(&self, chat_id: ChatId) -> Option<String> {
        let mut guard = self.inner.lock().await;
        let old = guard.get_mut(&chat_id).and_then(|s| {
            s.total_cost_usd = 0.0;
            s.agent_session_id.take()
        });
        debug!(chat_id = %chat_id, had_session = old.is_some(), "session reset");
        old
    }

    /// Cost of the chat's turns since the last reset.
    pub async fn total_cost(&self, chat_id: ChatId) -> f64 {
        self.inner
            .lock()
            .await
            .get(&chat_id)
            .map_or(0.0, |s| s.total_cost_usd)
    }

    /// The directory chosen with `/cd`, if any.
    pub async fn working_dir(&self, chat_id: ChatId) -> Option<PathBuf> {
        self.inner
            .lock()
            .await
            .get(&chat_id)
            .and_then(|s| s.working_dir.clone())
    }

    /// Run the chat's next turns in `dir`.
    pub async fn set_working_dir(&self, chat_id: ChatId, dir: PathBuf) {
        let mut guard = self.inner.lock().await;
        let session = guard.entry(chat_id).or_insert_with(|| self.new_session());
        info!(chat_id = %chat_id, dir = %dir.display(), "working directory changed");
        session.working_dir = Some(dir);
    }

    /// The chat's gate, if the chat has been seen.
    pub async fn gate(&self, chat_id: ChatId) -> Option<Arc<PermissionGate>> {
        self.inner
            .lock()
            .await
            .get(&chat_id)
            .map(|s| Arc::clone(&s.gate))
    }

    /// Whether a turn is running in the chat.
    pub async fn is_busy(&self, chat_id: ChatId) -> bool {
        self.inner
            .lock()
            .await
            .get(&chat_id)
            .is_some_and(|s| s.active_turn.is_some())
    }

    /// The agent session the next turn would resume.
    pub async fn agent_session_id(&self, chat_id: ChatId) -> Option<String> {
        self.inner
            .lock()
            .await
            .get(&chat_id)
            .and_then(|s| s.agent_session_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleclaude_core::ToolInput;
    use teleclaude_test::MockPrompter;

    fn chat(id: i64) -> ChatId {
        ChatId(id)
    }

    fn prompter() -> Arc<dyn ApprovalPrompter> {
        Arc::new(MockPrompter::new())
    }

    fn sessions() -> ChatSessions {
        ChatSessions::new(Duration::from_secs(60))
    }

    fn started(start: TurnStart) -> TurnHandle {
        match start {
            TurnStart::Started(handle) => handle,
            TurnStart::Busy => panic!("expected the turn to start"),
        }
    }

    #[tokio::test]
    async fn unknown_chat_has_no_state() {
        let map = sessions();
        assert!(map.gate(chat(1)).await.is_none());
        assert!(!map.is_busy(chat(1)).await);
        assert!(map.agent_session_id(chat(1)).await.is_none());
        assert!(!map.interrupt(chat(1)).await);
    }

    #[tokio::test]
    async fn second_turn_is_busy_until_finished() {
        let map = sessions();
        started(map.try_start_turn(chat(1), prompter()).await);
        assert!(map.is_busy(chat(1)).await);
        assert!(matches!(
            map.try_start_turn(chat(1), prompter()).await,
            TurnStart::Busy
        ));

        map.finish_turn(chat(1), None, None).await;
        assert!(!map.is_busy(chat(1)).await);
        started(map.try_start_turn(chat(1), prompter()).await);
    }

    #[tokio::test]
    async fn chats_are_independent() {
        let map = sessions();
        let a = started(map.try_start_turn(chat(1), prompter()).await);
        let b = started(map.try_start_turn(chat(2), prompter()).await);
        assert!(!Arc::ptr_eq(&a.gate, &b.gate));
    }

    #[tokio::test]
    async fn gate_survives_across_turns() {
        let map = sessions();
        let first = started(map.try_start_turn(chat(1), prompter()).await);
        map.finish_turn(chat(1), None, None).await;
        let second = started(map.try_start_turn(chat(1), prompter()).await);
        assert!(Arc::ptr_eq(&first.gate, &second.gate));
        assert_eq!(first.gate.timeout(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn agent_session_is_carried_and_reset() {
        let map = sessions();
        let first = started(map.try_start_turn(chat(1), prompter()).await);
        assert!(first.resume.is_none());
        map.finish_turn(chat(1), Some("sess-1".to_string()), None).await;

        let second = started(map.try_start_turn(chat(1), prompter()).await);
        assert_eq!(second.resume.as_deref(), Some("sess-1"));

        // A turn that reports no id keeps the previous one.
        map.finish_turn(chat(1), None, None).await;
        assert_eq!(map.agent_session_id(chat(1)).await.as_deref(), Some("sess-1"));

        assert_eq!(map.reset(chat(1)).await.as_deref(), Some("sess-1"));
        assert!(map.agent_session_id(chat(1)).await.is_none());
    }

    #[tokio::test]
    async fn interrupt_signals_turn_and_denies_pending() {
        let map = sessions();
        let mock = Arc::new(MockPrompter::new());
        let prompter: Arc<dyn ApprovalPrompter> = mock.clone();
        let handle = started(map.try_start_turn(chat(1), prompter).await);

        let gate = Arc::clone(&handle.gate);
        let waiter = tokio::spawn(async move {
            gate.request_approval("Write", &ToolInput::new().with("file_path", "/tmp/x"))
                .await
        });
        mock.next_prompt().await;

        assert!(map.interrupt(chat(1)).await);
        let decision = waiter.await.unwrap();
        assert_eq!(decision.deny_reason(), Some("operation cancelled"));

        // The permit is stored even though nobody was waiting yet.
        handle.interrupt.notified().await;
    }

    #[tokio::test]
    async fn cost_accumulates_until_reset() {
        let map = sessions();
        assert!(map.total_cost(chat(1)).await.abs() < f64::EPSILON);

        started(map.try_start_turn(chat(1), prompter()).await);
        map.finish_turn(chat(1), Some("s".to_string()), Some(0.25)).await;
        started(map.try_start_turn(chat(1), prompter()).await);
        map.finish_turn(chat(1), None, None).await;
        started(map.try_start_turn(chat(1), prompter()).await);
        map.finish_turn(chat(1), None, Some(0.5)).await;
        assert!((map.total_cost(chat(1)).await - 0.75).abs() < f64::EPSILON);

        map.reset(chat(1)).await;
        assert!(map.total_cost(chat(1)).await.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn working_dir_reaches_the_next_turn() {
        let map = sessions();
        // A chat can pick a directory before its first turn.
        map.set_working_dir(chat(1), PathBuf::from("/srv/project")).await;
        assert_eq!(
            map.working_dir(chat(1)).await,
            Some(PathBuf::from("/srv/project"))
        );

        let handle = started(map.try_start_turn(chat(1), prompter()).await);
        assert_eq!(handle.working_dir, Some(PathBuf::from("/srv/project")));

        // Reset starts a new conversation in the same place.
        map.finish_turn(chat(1), None, None).await;
        map.reset(chat(1)).await;
        assert!(map.working_dir(chat(1)).await.is_some());
        assert!(map.working_dir(chat(2)).await.is_none());
    }

    #[tokio::test]
    async fn interrupt_without_turn_is_false() {
        let map = sessions();
        started(map.try_start_turn(chat(1), prompter()).await);
        map.finish_turn(chat(1), None, None).await;
        assert!(!map.interrupt(chat(1)).await);
    }
}
