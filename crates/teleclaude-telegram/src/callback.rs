//! Inline-button presses.

use teleclaude_approval::PermissionGate;
use teleclaude_core::{CallbackAction, PermissionAction, parse_callback_data};
use teleclaude_render::format::html_escape;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{debug, warn};

use crate::handler::BotState;

/// How to answer a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackReply {
    /// Toast shown to the presser.
    pub answer: String,
    /// Replacement HTML for the prompt message. Editing also drops the
    /// buttons.
    pub prompt_edit: Option<String>,
}

const UNKNOWN_ACTION: &str = "Unknown action";

/// Decode `data` and settle the approval it refers to.
///
/// `gate` is the gate of the chat the button lives in, if that chat has
/// one.
#[must_use]
pub fn resolve_callback(gate: Option<&PermissionGate>, data: &str) -> CallbackReply {
    match parse_callback_data(data) {
        CallbackAction::Permission { action, request_id } => {
            let (resolved, message) = match gate {
                Some(gate) => gate.resolve(&request_id, action),
                None => (false, "not found or expired".to_string()),
            };
            let prompt_edit = if resolved {
                format!("{} {}", icon(action), html_escape(&message))
            } else {
                "<i>⌛ This request has expired.</i>".to_string()
            };
            CallbackReply {
                answer: message,
                prompt_edit: Some(prompt_edit),
            }
        },
        CallbackAction::Unknown { action, .. } => {
            debug!(action = %action, "unknown callback action");
            CallbackReply {
                answer: UNKNOWN_ACTION.to_string(),
                prompt_edit: None,
            }
        },
    }
}

fn icon(action: PermissionAction) -> &'static str {
    match action {
        PermissionAction::Allow | PermissionAction::AllowAlways => "✅",
        PermissionAction::Deny => "❌",
    }
}

/// Dispatcher endpoint for callback queries.
pub async fn handle_callback(bot: Bot, query: CallbackQuery, state: BotState) -> anyhow::Result<()> {
    if !state.config.telegram.is_user_allowed(query.from.id.0) {
        let _ = bot
            .answer_callback_query(&query.id)
            .text("Not authorized")
            .await;
        return Ok(());
    }

    let data = query.data.as_deref().unwrap_or_default();
    let chat_id = query.message.as_ref().map(|m| m.chat().id);
    let gate = match chat_id {
        Some(chat_id) => state.sessions.gate(chat_id).await,
        None => None,
    };

    let reply = resolve_callback(gate.as_deref(), data);
    if let Err(e) = bot
        .answer_callback_query(&query.id)
        .text(reply.answer)
        .await
    {
        warn!(error = %e, "failed to answer callback query");
    }

    if let (Some(edit), Some(msg)) = (reply.prompt_edit, &query.message)
        && let Err(e) = bot
            .edit_message_text(msg.chat().id, msg.id(), edit)
            .parse_mode(ParseMode::Html)
            .await
    {
        warn!(error = %e, "failed to update approval prompt");
    }

    Ok(())
}
