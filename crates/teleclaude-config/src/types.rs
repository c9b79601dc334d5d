use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram bot settings.
    pub telegram: TelegramSection,
    /// The agent process the bridge drives.
    pub agent: AgentSection,
    /// Tool approval policy.
    pub approval: ApprovalSection,
    /// Incremental message rendering.
    pub streaming: StreamingSection,
    /// Logging and tracing.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// TelegramSection
// ---------------------------------------------------------------------------

/// Telegram bot configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    /// Telegram Bot API token (from `@BotFather`).
    /// Prefer the `TELEGRAM_BOT_TOKEN` environment variable over a file.
    pub bot_token: Option<String>,
    /// Telegram user IDs allowed to interact with the bot.
    /// Empty means allow all users.
    pub allowed_user_ids: Vec<u64>,
}

impl TelegramSection {
    /// Whether `user_id` may talk to the bot.
    #[must_use]
    pub fn is_user_allowed(&self, user_id: u64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }
}

impl std::fmt::Debug for TelegramSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSection")
            .field("has_bot_token", &self.bot_token.is_some())
            .field("allowed_user_ids", &self.allowed_user_ids)
            .finish()
    }
}

impl Serialize for TelegramSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TelegramSection", 1)?;
        // bot_token is omitted (secret).
        state.serialize_field("allowed_user_ids", &self.allowed_user_ids)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// AgentSection
// ---------------------------------------------------------------------------

/// How to launch the agent for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Executable name or path.
    pub command: String,
    /// Extra arguments, e.g. `["--model", "opus"]`. The stream-json
    /// protocol flags are always added by the bridge.
    pub args: Vec<String>,
    /// Working directory for the agent. Defaults to the bridge's own.
    /// A chat's `/cd` overrides it.
    pub working_dir: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            command: "claude".to_owned(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalSection
// ---------------------------------------------------------------------------

/// Which tool calls need a human, and how long to wait for one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSection {
    /// Seconds to wait for an answer before denying.
    pub timeout_secs: u64,
    /// Tools that always need approval (case-insensitive).
    pub require_approval_for: Vec<String>,
    /// Extra shell command substrings that need approval.
    pub dangerous_commands: Vec<String>,
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            require_approval_for: vec!["Write".to_owned(), "Edit".to_owned()],
            dangerous_commands: vec!["rm -rf".to_owned(), "sudo".to_owned()],
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingSection
// ---------------------------------------------------------------------------

/// Limits for the live, edited response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSection {
    /// Minimum milliseconds between edits of one message.
    pub edit_throttle_ms: u64,
    /// Maximum bytes shown in one message.
    pub chunk_size: usize,
    /// Bytes reserved for truncation markup when the text is cut.
    pub overhead_budget: usize,
}

impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            edit_throttle_ms: 1000,
            chunk_size: 3800,
            overhead_budget: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"` or `"json"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["teloxide=warn"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}
