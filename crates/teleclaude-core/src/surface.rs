//! The narrow interface between the bridge and a chat surface.
//!
//! The approval gate only ever asks a surface to *show* a prompt; the answer
//! comes back later through a callback. The renderer only ever *edits* one
//! message. Both are expressed as traits so the core never depends on a
//! transport.

use async_trait::async_trait;

use crate::error::SurfaceResult;
use crate::tool::ToolInput;

/// Identifies one outward-facing message on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Chat the message lives in.
    pub chat_id: i64,
    /// Message id within that chat.
    pub message_id: i32,
}

impl MessageRef {
    /// Create a message reference.
    #[must_use]
    pub fn new(chat_id: i64, message_id: i32) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// How the surface should interpret edited content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupMode {
    /// Telegram-style HTML subset.
    Html,
    /// No markup; content is shown verbatim.
    Plain,
}

/// Result of pushing an edit to the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edit was applied.
    Ok,
    /// The surface already shows exactly this content.
    Unchanged,
    /// The surface rejected the markup as malformed.
    InvalidMarkup(String),
    /// Network error, rate limit, or timeout. Try again later.
    TransientFailure(String),
}

impl EditOutcome {
    /// `Ok` and `Unchanged` both mean the surface shows what we sent.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Unchanged)
    }
}

/// A surface that holds a single repeatedly-edited message.
#[async_trait]
pub trait MessageSurface: Send + Sync {
    /// Replace the content of `message`.
    ///
    /// Must be idempotent: sending the same content twice is harmless.
    async fn edit_message(
        &self,
        message: &MessageRef,
        content: &str,
        mode: MarkupMode,
    ) -> EditOutcome;
}

/// What the user is being asked to approve.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalPrompt {
    /// Opaque id routed back through the callback data.
    pub request_id: String,
    /// Tool the agent wants to run.
    pub tool_name: String,
    /// Parameters, for display only.
    pub tool_input: ToolInput,
}

/// A surface able to show a three-way approval prompt
/// (allow once / allow always / deny).
///
/// The user's choice is delivered out of band: the surface encodes
/// [`crate::CallbackAction::Permission`] into each button and the callback
/// handler resolves the gate.
#[async_trait]
pub trait ApprovalPrompter: Send + Sync {
    /// Present the prompt. Returns once the prompt is shown, not once it is
    /// answered.
    async fn show_approval_prompt(&self, prompt: &ApprovalPrompt) -> SurfaceResult<()>;
}
