//! Agent stream items.
//!
//! The agent writes one JSON object per line (`--output-format stream-json`).
//! [`parse_line`] turns a line into zero or more [`AgentEvent`]s. Message
//! kinds and content blocks the bridge does not care about are accepted and
//! dropped.
//!
//! Besides conversation output, the agent sends `control_request` lines when
//! it needs an answer before continuing. The only one the bridge handles is
//! `can_use_tool`; the agent blocks on it until [`crate::control`] writes the
//! reply to its stdin.

use serde::Deserialize;
use serde_json::Value;

use crate::error::EventParseError;
use crate::tool::ToolInput;

/// One item of agent output the bridge reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A fragment of assistant text (markdown).
    Text(String),
    /// The agent wants to run a tool.
    ToolUse {
        /// Tool-use id, echoed back by the matching result.
        id: String,
        /// Tool name, e.g. `Bash`.
        name: String,
        /// Parameters.
        input: ToolInput,
    },
    /// Output of a tool the agent ran.
    ToolResult {
        /// Id of the [`AgentEvent::ToolUse`] this answers.
        tool_use_id: String,
        /// Flattened textual content.
        content: String,
        /// Whether the tool reported failure.
        is_error: bool,
    },
    /// The agent is waiting to hear whether it may run a tool.
    PermissionRequest {
        /// Control request id; the reply must echo it.
        request_id: String,
        /// Tool name.
        tool_name: String,
        /// Parameters the tool would run with.
        input: ToolInput,
    },
    /// End-of-turn summary.
    TurnSummary {
        /// Total cost of the turn, if reported.
        cost_usd: Option<f64>,
        /// Agent-side session id, used to resume the conversation.
        session_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamLine {
    Assistant {
        message: MessageBody,
    },
    User {
        message: MessageBody,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default, alias = "id")]
        tool_use_id: String,
        #[serde(default)]
        content: ResultContent,
        #[serde(default)]
        is_error: bool,
    },
    Result {
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        cost_usd: Option<f64>,
        #[serde(default)]
        session_id: Option<String>,
    },
    ControlRequest {
        request_id: String,
        request: ControlBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
enum ControlBody {
    CanUseTool {
        tool_name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: ResultContent,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ResultContent {
    #[default]
    Empty,
    Text(String),
    Blocks(Vec<ResultBlock>),
}

#[derive(Debug, Deserialize)]
struct ResultBlock {
    #[serde(default)]
    text: Option<String>,
}

impl ResultContent {
    fn into_text(self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s,
            Self::Blocks(blocks) => blocks
                .into_iter()
                .filter_map(|b| b.text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl ContentBlock {
    fn into_event(self) -> Option<AgentEvent> {
        match self {
            Self::Text { text } if !text.is_empty() => Some(AgentEvent::Text(text)),
            Self::Text { .. } | Self::Other => None,
            Self::ToolUse { id, name, input } => Some(AgentEvent::ToolUse {
                id,
                name,
                input: ToolInput::from_value(input),
            }),
            Self::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some(AgentEvent::ToolResult {
                tool_use_id,
                content: content.into_text(),
                is_error,
            }),
        }
    }
}

/// Parse one line of agent output.
///
/// Blank lines yield no events.
///
/// # Errors
///
/// Returns [`EventParseError`] if the line is not a JSON object of a known
/// shape. Unknown `type` values are not errors.
pub fn parse_line(line: &str) -> Result<Vec<AgentEvent>, EventParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let parsed: StreamLine = serde_json::from_str(line)?;
    let events = match parsed {
        StreamLine::Assistant { message } | StreamLine::User { message } => message
            .content
            .into_iter()
            .filter_map(ContentBlock::into_event)
            .collect(),
        StreamLine::ToolUse { id, name, input } => vec![AgentEvent::ToolUse {
            id,
            name,
            input: ToolInput::from_value(input),
        }],
        StreamLine::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => vec![AgentEvent::ToolResult {
            tool_use_id,
            content: content.into_text(),
            is_error,
        }],
        StreamLine::Result {
            total_cost_usd,
            cost_usd,
            session_id,
        } => vec![AgentEvent::TurnSummary {
            cost_usd: total_cost_usd.or(cost_usd),
            session_id: session_id.filter(|s| !s.is_empty()),
        }],
        StreamLine::ControlRequest {
            request_id,
            request: ControlBody::CanUseTool { tool_name, input },
        } => vec![AgentEvent::PermissionRequest {
            request_id,
            tool_name,
            input: ToolInput::from_value(input),
        }],
        StreamLine::ControlRequest {
            request_id,
            request: ControlBody::Other,
        } => {
            tracing::debug!(%request_id, "ignoring unsupported control request");
            Vec::new()
        },
        StreamLine::Other => {
            tracing::trace!("ignoring agent line of unhandled type");
            Vec::new()
        },
    };
    Ok(events)
}
