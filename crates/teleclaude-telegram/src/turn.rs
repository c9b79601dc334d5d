//! One conversational turn: agent events in, one live message out.

use std::fmt::Write as _;

use teleclaude_approval::{ApprovalRules, PermissionGate};
use teleclaude_core::{AgentEvent, PermissionReply, ToolInput};
use teleclaude_render::IncrementalRenderer;
use teleclaude_render::format::{
    MAX_CODE_LINES, chunk_html, format_code_block, format_tool_call, format_tool_result,
    html_escape, md_to_telegram_html,
};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::agent::EventSource;

/// Shown when a turn produced nothing at all.
const NO_OUTPUT: &str = "<i>(no output)</i>";

/// Why a turn stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnEnd {
    /// The agent's output ended on its own.
    #[default]
    Completed,
    /// `/cancel` was issued.
    Interrupted,
}

/// What a finished turn reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// How the turn ended.
    pub end: TurnEnd,
    /// Agent session to resume next time.
    pub agent_session_id: Option<String>,
    /// Reported cost of the turn.
    pub cost_usd: Option<f64>,
    /// Tools the user refused during the turn.
    pub denied: Vec<String>,
}

/// Everything a turn talks to besides the agent.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    /// The live response message.
    pub renderer: &'a IncrementalRenderer,
    /// The chat's approval gate.
    pub gate: &'a PermissionGate,
    /// Which tool calls go through the gate.
    pub rules: &'a ApprovalRules,
    /// Signalled to interrupt the turn.
    pub interrupt: &'a Notify,
}

/// Drive one turn until the agent finishes or the turn is interrupted.
///
/// The agent asks before every tool it runs; each request is answered
/// through the gate and the agent waits for the answer. The agent is stopped
/// on interruption. The renderer is left unfinished; see [`finish_message`].
pub async fn run_turn<S>(source: &mut S, ctx: TurnContext<'_>) -> TurnOutcome
where
    S: EventSource + ?Sized,
{
    let mut outcome = TurnOutcome::default();

    'turn: loop {
        let batch = tokio::select! {
            biased;
            () = ctx.interrupt.notified() => {
                outcome.end = TurnEnd::Interrupted;
                break 'turn;
            },
            batch = source.next_events() => batch,
        };
        let Some(batch) = batch else {
            break;
        };

        for event in batch {
            match event {
                AgentEvent::Text(text) => {
                    ctx.renderer.append(&render_text(&text)).await;
                },
                AgentEvent::ToolUse { name, input, .. } => {
                    ctx.renderer.append(&format_tool_call(&name, &input)).await;
                },
                AgentEvent::PermissionRequest {
                    request_id,
                    tool_name,
                    input,
                } => {
                    let Some(reply) = decide(ctx, &tool_name, input).await else {
                        outcome.end = TurnEnd::Interrupted;
                        break 'turn;
                    };
                    if !reply.is_allow() {
                        outcome.denied.push(tool_name);
                    }
                    if let Err(e) = source.reply(&request_id, &reply).await {
                        warn!(%request_id, error = %e, "failed to answer permission request");
                    }
                },
                AgentEvent::ToolResult {
                    content, is_error, ..
                } => {
                    ctx.renderer
                        .append(&render_tool_result(&content, is_error))
                        .await;
                },
                AgentEvent::TurnSummary {
                    cost_usd,
                    session_id,
                } => {
                    outcome.cost_usd = cost_usd.or(outcome.cost_usd);
                    if session_id.is_some() {
                        outcome.agent_session_id = session_id;
                    }
                },
            }
        }
    }

    if outcome.end == TurnEnd::Interrupted {
        source.stop().await;
        ctx.renderer.cancel_pending().await;
    }
    info!(
        end = ?outcome.end,
        cost_usd = outcome.cost_usd,
        denied = outcome.denied.len(),
        "turn ended"
    );
    outcome
}

/// Answer the agent's request to run a tool. Tools the rules consider
/// harmless are allowed outright; the rest wait for the gate.
///
/// `None` means the turn was interrupted while waiting.
async fn decide(ctx: TurnContext<'_>, name: &str, input: ToolInput) -> Option<PermissionReply> {
    if !ctx.rules.requires_approval(name, &input) {
        debug!(tool = %name, "tool allowed by rules");
        return Some(PermissionReply::Allow {
            updated_input: input,
        });
    }

    debug!(tool = %name, reason = %ApprovalRules::describe(name, &input), "tool needs approval");
    // Let the user see what led up to the prompt.
    ctx.renderer.flush().await;

    let decision = tokio::select! {
        biased;
        () = ctx.interrupt.notified() => return None,
        decision = ctx.gate.request_approval(name, &input) => decision,
    };

    let Some(reason) = decision.deny_reason() else {
        return Some(PermissionReply::Allow {
            updated_input: input,
        });
    };
    ctx.renderer
        .append(&format!(
            "\n<i>🚫 {} not run: {}</i>\n",
            html_escape(name),
            html_escape(reason)
        ))
        .await;
    Some(PermissionReply::Deny {
        message: reason.to_string(),
    })
}

fn render_text(markdown: &str) -> String {
    let mut html = md_to_telegram_html(markdown);
    html.push('\n');
    html
}

/// Long failing output is shortened around its error lines; everything else
/// is cut by size.
fn render_tool_result(content: &str, is_error: bool) -> String {
    let content = content.trim();
    if is_error && content.lines().count() > MAX_CODE_LINES {
        format!("\n❌ {}\n", format_code_block(content, None))
    } else {
        format_tool_result(content, is_error)
    }
}

/// The message body once the turn is over, with its footer.
#[must_use]
pub fn closing_text(body: &str, outcome: &TurnOutcome) -> String {
    let mut text = body.trim_end().to_string();
    if text.is_empty() {
        text.push_str(NO_OUTPUT);
    }
    if outcome.end == TurnEnd::Interrupted {
        text.push_str("\n\n<i>⏹ Interrupted</i>");
    }
    if let Some(cost) = outcome.cost_usd {
        let _ = write!(text, "\n\n<i>${cost:.4}</i>");
    }
    text
}

/// Final edit of the live message.
///
/// The live message gets the first `max_size` chunk of the closing text.
/// The remaining chunks are returned for the caller to send as new messages.
pub async fn finish_message(
    renderer: &IncrementalRenderer,
    outcome: &TurnOutcome,
    max_size: usize,
) -> Vec<String> {
    let text = closing_text(&renderer.text().await, outcome);
    let mut chunks = chunk_html(&text, max_size).into_iter();
    renderer.finish(chunks.next()).await;
    chunks.collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use teleclaude_core::{MessageSurface, PermissionAction};
    use teleclaude_render::RenderConfig;
    use teleclaude_test::{MockPrompter, MockSurface, test_bash_input, test_message_ref};

    use super::*;
    use crate::error::TelegramResult;

    /// Replays scripted batches, records replies, and records whether it was
    /// stopped.
    struct ScriptedSource {
        batches: VecDeque<Vec<AgentEvent>>,
        replies: Vec<(String, PermissionReply)>,
        stopped: bool,
    }

    impl ScriptedSource {
        fn new(batches: Vec<Vec<AgentEvent>>) -> Self {
            Self {
                batches: batches.into(),
                replies: Vec::new(),
                stopped: false,
            }
        }

        fn allowed(&self) -> Vec<bool> {
            self.replies.iter().map(|(_, r)| r.is_allow()).collect()
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn next_events(&mut self) -> Option<Vec<AgentEvent>> {
            if self.stopped {
                return None;
            }
            self.batches.pop_front()
        }

        async fn reply(&mut self, request_id: &str, reply: &PermissionReply) -> TelegramResult<()> {
            self.replies.push((request_id.to_string(), reply.clone()));
            Ok(())
        }

        async fn stop(&mut self) {
            self.stopped = true;
        }
    }

    struct Harness {
        surface: MockSurface,
        renderer: IncrementalRenderer,
        prompter: Arc<MockPrompter>,
        gate: Arc<PermissionGate>,
        rules: ApprovalRules,
        interrupt: Notify,
    }

    impl Harness {
        fn new() -> Self {
            let surface = MockSurface::new();
            let as_surface: Arc<dyn MessageSurface> = Arc::new(surface.clone());
            let renderer =
                IncrementalRenderer::new(as_surface, test_message_ref(), RenderConfig::default());
            let prompter = Arc::new(MockPrompter::new());
            let gate = Arc::new(PermissionGate::new().with_prompter(prompter.clone()));
            Self {
                surface,
                renderer,
                prompter,
                gate,
                rules: ApprovalRules::new(vec!["Write".to_string()], Vec::new()),
                interrupt: Notify::new(),
            }
        }

        fn ctx(&self) -> TurnContext<'_> {
            TurnContext {
                renderer: &self.renderer,
                gate: &self.gate,
                rules: &self.rules,
                interrupt: &self.interrupt,
            }
        }
    }

    fn tool_use(name: &str, input: ToolInput) -> AgentEvent {
        AgentEvent::ToolUse {
            id: "toolu_1".to_string(),
            name: name.to_string(),
            input,
        }
    }

    /// What the agent sends for one tool: the call, then the request.
    fn asks(request_id: &str, name: &str, input: ToolInput) -> Vec<AgentEvent> {
        vec![
            tool_use(name, input.clone()),
            AgentEvent::PermissionRequest {
                request_id: request_id.to_string(),
                tool_name: name.to_string(),
                input,
            },
        ]
    }

    fn tool_result(content: &str) -> AgentEvent {
        AgentEvent::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: content.to_string(),
            is_error: false,
        }
    }

    #[tokio::test]
    async fn text_and_safe_tools_stream_without_prompts() {
        let h = Harness::new();
        let mut source = ScriptedSource::new(vec![
            vec![AgentEvent::Text("Looking at **files**".to_string())],
            asks("req_1", "Bash", test_bash_input("ls -la")),
            vec![tool_result("a.txt\nb.txt")],
            vec![AgentEvent::TurnSummary {
                cost_usd: Some(0.01),
                session_id: Some("sess-9".to_string()),
            }],
        ]);

        let outcome = run_turn(&mut source, h.ctx()).await;

        assert_eq!(outcome.end, TurnEnd::Completed);
        assert_eq!(outcome.agent_session_id.as_deref(), Some("sess-9"));
        assert_eq!(outcome.cost_usd, Some(0.01));
        assert!(!source.stopped);
        assert_eq!(h.prompter.prompt_count(), 0);
        assert_eq!(source.replies.len(), 1);
        assert_eq!(
            source.replies[0],
            (
                "req_1".to_string(),
                PermissionReply::Allow {
                    updated_input: test_bash_input("ls -la"),
                }
            )
        );

        let text = h.renderer.text().await;
        assert!(text.contains("<b>files</b>"));
        assert!(text.contains("<code>&gt; Bash</code> <code>ls -la</code>"));
        assert!(text.contains("<pre>a.txt\nb.txt</pre>"));
        // First fragment goes out immediately.
        assert!(h.surface.edit_count() >= 1);
    }

    #[tokio::test]
    async fn tool_call_without_request_never_prompts() {
        let h = Harness::new();
        let mut source = ScriptedSource::new(vec![vec![tool_use(
            "Write",
            ToolInput::new().with("file_path", "/tmp/a"),
        )]]);

        let outcome = run_turn(&mut source, h.ctx()).await;

        assert_eq!(outcome.end, TurnEnd::Completed);
        assert_eq!(h.prompter.prompt_count(), 0);
        assert!(source.replies.is_empty());
    }

    #[tokio::test]
    async fn agent_waits_on_the_gate_for_sensitive_tools() {
        let h = Harness::new();
        let mut source = ScriptedSource::new(vec![
            asks("req_1", "Bash", test_bash_input("rm -rf build")),
            vec![tool_result("removed")],
        ]);

        let answer = async {
            let prompt = h.prompter.next_prompt().await;
            assert_eq!(prompt.tool_name, "Bash");
            h.gate.resolve(&prompt.request_id, PermissionAction::Allow)
        };
        let (outcome, (resolved, _)) = tokio::join!(run_turn(&mut source, h.ctx()), answer);

        assert!(resolved);
        assert_eq!(outcome.end, TurnEnd::Completed);
        assert_eq!(source.allowed(), vec![true]);
        assert_eq!(source.replies[0].0, "req_1");
        assert!(h.renderer.text().await.contains("<pre>removed</pre>"));
    }

    #[tokio::test]
    async fn denied_tool_is_refused_and_the_turn_goes_on() {
        let h = Harness::new();
        let mut source = ScriptedSource::new(vec![
            asks("req_1", "Write", ToolInput::new().with("file_path", "/etc/hosts")),
            vec![AgentEvent::Text("I will not write it.".to_string())],
        ]);

        let answer = async {
            let prompt = h.prompter.next_prompt().await;
            h.gate.resolve(&prompt.request_id, PermissionAction::Deny)
        };
        let (outcome, _) = tokio::join!(run_turn(&mut source, h.ctx()), answer);

        assert_eq!(outcome.end, TurnEnd::Completed);
        assert_eq!(outcome.denied, vec!["Write".to_string()]);
        assert!(!source.stopped);
        assert_eq!(
            source.replies,
            vec![(
                "req_1".to_string(),
                PermissionReply::Deny {
                    message: "denied by user".to_string(),
                }
            )]
        );

        let text = h.renderer.text().await;
        assert!(text.contains("Write not run: denied by user"));
        assert!(text.contains("I will not write it."));
    }

    #[tokio::test]
    async fn interrupt_during_approval_stops_without_replying() {
        let h = Harness::new();
        let mut source = ScriptedSource::new(vec![asks(
            "req_1",
            "Write",
            ToolInput::new().with("file_path", "/tmp/out"),
        )]);

        let cancel = async {
            h.prompter.next_prompt().await;
            h.interrupt.notify_one();
            h.gate.cancel_all()
        };
        let (outcome, cancelled) = tokio::join!(run_turn(&mut source, h.ctx()), cancel);

        assert_eq!(cancelled, 1);
        assert_eq!(outcome.end, TurnEnd::Interrupted);
        assert!(source.stopped);
        assert!(source.replies.is_empty());
    }

    #[tokio::test]
    async fn pending_interrupt_stops_before_reading() {
        let h = Harness::new();
        let mut source = ScriptedSource::new(vec![vec![AgentEvent::Text("late".to_string())]]);
        h.interrupt.notify_one();

        let outcome = run_turn(&mut source, h.ctx()).await;

        assert_eq!(outcome.end, TurnEnd::Interrupted);
        assert!(source.stopped);
        assert!(h.renderer.text().await.is_empty());
    }

    #[tokio::test]
    async fn always_allowed_tool_skips_second_prompt() {
        let h = Harness::new();
        let mut source = ScriptedSource::new(vec![
            asks("req_1", "Write", ToolInput::new().with("file_path", "/tmp/a")),
            asks("req_2", "Write", ToolInput::new().with("file_path", "/tmp/b")),
        ]);

        let answer = async {
            let prompt = h.prompter.next_prompt().await;
            h.gate.resolve(&prompt.request_id, PermissionAction::AllowAlways)
        };
        let (outcome, _) = tokio::join!(run_turn(&mut source, h.ctx()), answer);

        assert_eq!(outcome.end, TurnEnd::Completed);
        assert_eq!(h.prompter.prompt_count(), 1);
        assert_eq!(source.allowed(), vec![true, true]);
    }

    #[test]
    fn closing_text_footers() {
        let outcome = TurnOutcome {
            end: TurnEnd::Interrupted,
            cost_usd: Some(0.5),
            ..TurnOutcome::default()
        };
        assert_eq!(
            closing_text("body\n", &outcome),
            "body\n\n<i>⏹ Interrupted</i>\n\n<i>$0.5000</i>"
        );
        assert_eq!(closing_text("", &TurnOutcome::default()), NO_OUTPUT);
    }

    #[tokio::test]
    async fn finish_message_shows_first_chunk_and_returns_rest() {
        let h = Harness::new();
        let line = "x".repeat(99);
        let body: String = (0..30).map(|_| format!("{line}\n")).collect();
        h.renderer.set_text(body).await;

        let rest = finish_message(&h.renderer, &TurnOutcome::default(), 1000).await;

        assert!(!rest.is_empty());
        let shown = h.surface.last_content().unwrap();
        assert!(shown.len() <= 1000);
        assert!(shown.starts_with('x'));
        assert!(rest.iter().all(|chunk| chunk.len() <= 1000));
    }
}
