//! Telegram implementation of the bridge's UI surface traits.

use async_trait::async_trait;
use teleclaude_core::{
    ApprovalPrompt, ApprovalPrompter, EditOutcome, MarkupMode, MessageRef, MessageSurface,
    PermissionAction, SurfaceError, SurfaceResult,
};
use teleclaude_render::format::format_permission_prompt;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::debug;

/// One chat, seen as a place to edit messages and show approval prompts.
#[derive(Clone, Debug)]
pub struct TelegramSurface {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramSurface {
    /// Create a surface for `chat_id`.
    #[must_use]
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }

    /// The chat this surface talks to.
    #[must_use]
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Send a new HTML message and return a reference to it.
    pub async fn send_html(&self, text: impl Into<String>) -> Result<MessageRef, RequestError> {
        let msg = self
            .bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(MessageRef::new(msg.chat.id.0, msg.id.0))
    }
}

#[async_trait]
impl MessageSurface for TelegramSurface {
    async fn edit_message(
        &self,
        message: &MessageRef,
        content: &str,
        mode: MarkupMode,
    ) -> EditOutcome {
        let mut request = self.bot.edit_message_text(
            ChatId(message.chat_id),
            MessageId(message.message_id),
            content,
        );
        if mode == MarkupMode::Html {
            request = request.parse_mode(ParseMode::Html);
        }

        match request.await {
            Ok(_) => EditOutcome::Ok,
            Err(e) => {
                let outcome = classify_edit_error(&e);
                debug!(message_id = message.message_id, ?outcome, "edit not applied");
                outcome
            },
        }
    }
}

#[async_trait]
impl ApprovalPrompter for TelegramSurface {
    async fn show_approval_prompt(&self, prompt: &ApprovalPrompt) -> SurfaceResult<()> {
        let text = format_permission_prompt(&prompt.tool_name, &prompt.tool_input);
        self.bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(approval_keyboard(&prompt.request_id))
            .await
            .map(|_| ())
            .map_err(|e| surface_error(&e))
    }
}

/// Map a failed edit onto what the renderer should do next.
#[must_use]
pub fn classify_edit_error(err: &RequestError) -> EditOutcome {
    match err {
        RequestError::Api(ApiError::MessageNotModified) => EditOutcome::Unchanged,
        RequestError::Api(ApiError::CantParseEntities(detail)) => {
            EditOutcome::InvalidMarkup(detail.clone())
        },
        RequestError::Api(api) => {
            let detail = api.to_string();
            let lower = detail.to_lowercase();
            if lower.contains("message is not modified") {
                EditOutcome::Unchanged
            } else if lower.contains("can't parse entities") {
                EditOutcome::InvalidMarkup(detail)
            } else {
                EditOutcome::TransientFailure(detail)
            }
        },
        other => EditOutcome::TransientFailure(other.to_string()),
    }
}

fn surface_error(err: &RequestError) -> SurfaceError {
    match err {
        RequestError::Api(api) => SurfaceError::Rejected(api.to_string()),
        other => SurfaceError::Transport(other.to_string()),
    }
}

/// Allow once / allow always / deny, in one row.
#[must_use]
pub fn approval_keyboard(request_id: &str) -> InlineKeyboardMarkup {
    let row: Vec<InlineKeyboardButton> = PermissionAction::ALL
        .iter()
        .map(|action| InlineKeyboardButton::callback(action.label(), action.encode(request_id)))
        .collect();
    InlineKeyboardMarkup::new(vec![row])
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleclaude_core::{CallbackAction, parse_callback_data};
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn not_modified_is_unchanged() {
        let err = RequestError::Api(ApiError::MessageNotModified);
        assert_eq!(classify_edit_error(&err), EditOutcome::Unchanged);
    }

    #[test]
    fn parse_entities_is_invalid_markup() {
        let err = RequestError::Api(ApiError::CantParseEntities(
            "Bad Request: can't parse entities: unclosed tag".to_string(),
        ));
        assert!(matches!(
            classify_edit_error(&err),
            EditOutcome::InvalidMarkup(_)
        ));
    }

    #[test]
    fn unknown_api_errors_are_matched_by_text() {
        let err = RequestError::Api(ApiError::Unknown(
            "Bad Request: can't parse entities: Unsupported start tag \"span\"".to_string(),
        ));
        assert!(matches!(
            classify_edit_error(&err),
            EditOutcome::InvalidMarkup(_)
        ));

        let err = RequestError::Api(ApiError::Unknown("Too Many Requests".to_string()));
        assert!(matches!(
            classify_edit_error(&err),
            EditOutcome::TransientFailure(_)
        ));
    }

    #[test]
    fn keyboard_buttons_decode_to_their_actions() {
        let keyboard = approval_keyboard("ab12cd34");
        assert_eq!(keyboard.inline_keyboard.len(), 1);

        let decoded: Vec<CallbackAction> = keyboard.inline_keyboard[0]
            .iter()
            .map(|button| match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) => parse_callback_data(data),
                other => panic!("unexpected button kind: {other:?}"),
            })
            .collect();

        let expected: Vec<CallbackAction> = PermissionAction::ALL
            .iter()
            .map(|&action| CallbackAction::Permission {
                action,
                request_id: "ab12cd34".to_string(),
            })
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn keyboard_labels() {
        let keyboard = approval_keyboard("x");
        let labels: Vec<&str> = keyboard.inline_keyboard[0]
            .iter()
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(labels, vec!["✅ Allow", "✅ Always Allow", "❌ Deny"]);
    }
}
