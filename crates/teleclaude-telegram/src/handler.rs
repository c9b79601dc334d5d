//! Message handler: commands, and prompts that start an agent turn.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use teleclaude_approval::ApprovalRules;
use teleclaude_config::Config;
use teleclaude_core::{ApprovalPrompter, MarkupMode, MessageRef, MessageSurface};
use teleclaude_render::format::html_escape;
use teleclaude_render::{IncrementalRenderer, RenderConfig};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{info, warn};

use crate::agent::AgentProcess;
use crate::session::{ChatSessions, TurnHandle, TurnStart};
use crate::surface::TelegramSurface;
use crate::turn::{TurnContext, finish_message, run_turn};

/// Shared bot state passed to all handlers.
#[derive(Clone, Debug)]
pub struct BotState {
    /// Per-chat sessions.
    pub sessions: ChatSessions,
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Approval policy, shared by all chats.
    pub rules: Arc<ApprovalRules>,
    /// Live-message limits.
    pub render: RenderConfig,
}

const WELCOME: &str = "Send me a message and I'll pass it to the agent. \
                       Sensitive tool calls will ask for your approval first.\n\n\
                       Commands:\n\
                       /help - Show this help\n\
                       /cancel - Stop the current turn\n\
                       /new - Start a new conversation\n\
                       /cd - Change the agent's directory";

const HELP: &str = "<b>Teleclaude</b>\n\n\
                    Send any text message to talk to the agent. Its reply is \
                    streamed into one message that updates as it works.\n\n\
                    The agent waits while a sensitive tool is up for approval. \
                    The prompt has three buttons:\n\
                    <b>Allow</b> runs it once, <b>Always Allow</b> stops asking \
                    for that tool in this chat, <b>Deny</b> skips it and the \
                    agent carries on without it.\n\n\
                    <b>Commands:</b>\n\
                    /start - Welcome message\n\
                    /help - This help text\n\
                    /cancel - Stop the current turn and deny pending requests\n\
                    /new - Forget the conversation and start fresh (also /reset)\n\
                    /cost - Cost of the conversation so far\n\
                    /cd &lt;path&gt; - Run the agent in another directory\n\
                    /pwd - Show the agent's directory";

/// A recognised bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// `/cancel`
    Cancel,
    /// `/reset` or `/new`
    Reset,
    /// `/cost`
    Cost,
    /// `/pwd`
    Pwd,
    /// `/cd <path>`; the path is empty when none was given.
    Cd(String),
    /// Any other `/word`.
    Unknown,
}

impl Command {
    /// Parse a message starting with `/`. Returns `None` for plain text.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        let (word, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let word = word.strip_prefix('/')?;
        // Group chats address commands as `/cmd@botname`.
        let name = word.split('@').next().unwrap_or(word);
        Some(match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "cancel" => Self::Cancel,
            "reset" | "new" => Self::Reset,
            "cost" => Self::Cost,
            "pwd" => Self::Pwd,
            "cd" => Self::Cd(rest.trim().to_string()),
            _ => Self::Unknown,
        })
    }
}

/// Resolve `/cd` input against `base`: relative paths are joined, and the
/// result must be an existing directory.
///
/// # Errors
///
/// Returns a message for the user when the path is empty, missing, or not a
/// directory.
pub async fn resolve_dir(base: &Path, input: &str) -> Result<PathBuf, String> {
    if input.is_empty() {
        return Err("Usage: /cd &lt;path&gt;".to_string());
    }
    let target = base.join(input);
    let resolved = tokio::fs::canonicalize(&target)
        .await
        .map_err(|e| cannot_use(input, &e))?;
    let metadata = tokio::fs::metadata(&resolved)
        .await
        .map_err(|e| cannot_use(input, &e))?;
    if !metadata.is_dir() {
        return Err(format!("Not a directory: {}", html_escape(input)));
    }
    Ok(resolved)
}

fn cannot_use(input: &str, error: &std::io::Error) -> String {
    format!(
        "Cannot use {}: {}",
        html_escape(input),
        html_escape(&error.to_string())
    )
}

/// Where the chat's next turn runs: its `/cd` directory, else the configured
/// one, else the bridge's own.
async fn current_dir(chat_id: ChatId, state: &BotState) -> PathBuf {
    if let Some(dir) = state.sessions.working_dir(chat_id).await {
        return dir;
    }
    if let Some(dir) = &state.config.agent.working_dir {
        return PathBuf::from(dir);
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Handle an incoming message.
pub async fn handle_message(bot: Bot, msg: Message, state: BotState) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    // Without a sender we cannot check the allowlist.
    let user_allowed = match &msg.from {
        Some(user) => state.config.telegram.is_user_allowed(user.id.0),
        None => state.config.telegram.allowed_user_ids.is_empty(),
    };
    if !user_allowed {
        warn!(chat_id = %chat_id, "message from unauthorized user");
        let _ = bot
            .send_message(chat_id, "You are not authorized to use this bot.")
            .await;
        return Ok(());
    }

    if let Some(command) = Command::parse(text) {
        return handle_command(&bot, chat_id, command, &state).await;
    }

    start_turn(bot, chat_id, text, state).await;
    Ok(())
}

async fn handle_command(
    bot: &Bot,
    chat_id: ChatId,
    command: Command,
    state: &BotState,
) -> anyhow::Result<()> {
    match command {
        Command::Start => {
            let _ = bot.send_message(chat_id, WELCOME).await;
        },
        Command::Help => {
            let _ = bot
                .send_message(chat_id, HELP)
                .parse_mode(ParseMode::Html)
                .await;
        },
        Command::Cancel => {
            let reply = if state.sessions.interrupt(chat_id).await {
                "Cancelling the current turn."
            } else {
                "Nothing to cancel."
            };
            let _ = bot.send_message(chat_id, reply).await;
        },
        Command::Reset => {
            let reply = if state.sessions.is_busy(chat_id).await {
                "A turn is running. Use /cancel first."
            } else {
                state.sessions.reset(chat_id).await;
                "Session reset. The next message starts a new conversation."
            };
            let _ = bot.send_message(chat_id, reply).await;
        },
        Command::Cost => {
            let cost = state.sessions.total_cost(chat_id).await;
            let _ = bot
                .send_message(chat_id, format!("💰 Conversation cost: ${cost:.4}"))
                .await;
        },
        Command::Pwd => {
            let dir = current_dir(chat_id, state).await;
            let _ = bot
                .send_message(
                    chat_id,
                    format!("📂 <code>{}</code>", html_escape(&dir.display().to_string())),
                )
                .parse_mode(ParseMode::Html)
                .await;
        },
        Command::Cd(input) => {
            let base = current_dir(chat_id, state).await;
            let reply = match resolve_dir(&base, &input).await {
                Ok(dir) => {
                    let shown = html_escape(&dir.display().to_string());
                    state.sessions.set_working_dir(chat_id, dir).await;
                    format!("📂 Changed to <code>{shown}</code>")
                },
                Err(message) => message,
            };
            let _ = bot
                .send_message(chat_id, reply)
                .parse_mode(ParseMode::Html)
                .await;
        },
        Command::Unknown => {
            let _ = bot
                .send_message(chat_id, "Unknown command. Try /help.")
                .await;
        },
    }
    Ok(())
}

/// Claim the chat, post a placeholder, start the agent, and hand the rest of
/// the turn to a background task.
async fn start_turn(bot: Bot, chat_id: ChatId, prompt: &str, state: BotState) {
    let surface = TelegramSurface::new(bot, chat_id);
    let prompter: Arc<dyn ApprovalPrompter> = Arc::new(surface.clone());

    let handle = match state.sessions.try_start_turn(chat_id, prompter).await {
        TurnStart::Started(handle) => handle,
        TurnStart::Busy => {
            let _ = surface
                .send_html("A turn is already in progress. Use /cancel to stop it.")
                .await;
            return;
        },
    };

    let placeholder = match surface.send_html("<i>Thinking...</i>").await {
        Ok(message) => message,
        Err(e) => {
            warn!(chat_id = %chat_id, error = %e, "failed to send placeholder");
            state.sessions.finish_turn(chat_id, None, None).await;
            return;
        },
    };

    let agent = match AgentProcess::spawn(
        &state.config.agent,
        prompt,
        handle.resume.as_deref(),
        handle.working_dir.as_deref(),
    )
    .await
    {
        Ok(agent) => agent,
        Err(e) => {
            warn!(chat_id = %chat_id, error = %e, "failed to start agent");
            let _ = surface
                .edit_message(
                    &placeholder,
                    &format!("Failed to start agent: {}", html_escape(&e.to_string())),
                    MarkupMode::Html,
                )
                .await;
            state.sessions.finish_turn(chat_id, None, None).await;
            return;
        },
    };

    info!(chat_id = %chat_id, "turn started");
    // The dispatcher serialises updates per chat; the turn must not block
    // the callbacks and /cancel that arrive while it runs.
    tokio::spawn(drive_turn(surface, placeholder, agent, handle, state));
}

async fn drive_turn(
    surface: TelegramSurface,
    placeholder: MessageRef,
    mut agent: AgentProcess,
    handle: TurnHandle,
    state: BotState,
) {
    let chat_id = surface.chat_id();
    let renderer = IncrementalRenderer::new(Arc::new(surface.clone()), placeholder, state.render);

    let ctx = TurnContext {
        renderer: &renderer,
        gate: &handle.gate,
        rules: &state.rules,
        interrupt: &handle.interrupt,
    };
    let outcome = run_turn(&mut agent, ctx).await;

    for chunk in finish_message(&renderer, &outcome, state.render.max_size).await {
        if let Err(e) = surface.send_html(chunk).await {
            warn!(chat_id = %chat_id, error = %e, "failed to send continuation message");
        }
    }

    state
        .sessions
        .finish_turn(chat_id, outcome.agent_session_id, outcome.cost_usd)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(Command::parse("hello /help"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn known_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("/cancel now"), Some(Command::Cancel));
        assert_eq!(Command::parse("/RESET"), Some(Command::Reset));
    }

    #[test]
    fn addressed_commands() {
        assert_eq!(
            Command::parse("/cancel@teleclaude_bot"),
            Some(Command::Cancel)
        );
    }

    #[test]
    fn new_is_reset() {
        assert_eq!(Command::parse("/new"), Some(Command::Reset));
        assert_eq!(Command::parse("/new@teleclaude_bot"), Some(Command::Reset));
    }

    #[test]
    fn navigation_and_cost_commands() {
        assert_eq!(Command::parse("/cost"), Some(Command::Cost));
        assert_eq!(Command::parse("/pwd"), Some(Command::Pwd));
        assert_eq!(
            Command::parse("/cd  src/my dir "),
            Some(Command::Cd("src/my dir".to_string()))
        );
        assert_eq!(Command::parse("/cd"), Some(Command::Cd(String::new())));
    }

    #[tokio::test]
    async fn cd_resolves_relative_directories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("sub")).unwrap();

        let dir = resolve_dir(root.path(), "sub").await.unwrap();
        assert_eq!(dir, root.path().join("sub").canonicalize().unwrap());

        let back = resolve_dir(&dir, "..").await.unwrap();
        assert_eq!(back, root.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn cd_accepts_absolute_paths() {
        let root = tempfile::tempdir().unwrap();
        let absolute = root.path().to_str().unwrap();
        let dir = resolve_dir(Path::new("/nonexistent"), absolute).await.unwrap();
        assert_eq!(dir, root.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn cd_rejects_missing_paths_and_files() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("file.txt"), "x").unwrap();

        assert!(resolve_dir(root.path(), "").await.unwrap_err().contains("Usage"));
        assert!(resolve_dir(root.path(), "missing").await.is_err());
        assert!(
            resolve_dir(root.path(), "file.txt")
                .await
                .unwrap_err()
                .starts_with("Not a directory")
        );
    }

    #[test]
    fn unknown_commands() {
        assert_eq!(Command::parse("/status"), Some(Command::Unknown));
        assert_eq!(Command::parse("/etc/hosts"), Some(Command::Unknown));
    }

    #[test]
    fn help_is_balanced_html() {
        assert!(teleclaude_render::find_open_tags(HELP).is_empty());
    }
}
