//! Teleclaude Core - shared types and traits for the chat bridge.
//!
//! This crate provides:
//! - The UI surface traits ([`MessageSurface`], [`ApprovalPrompter`]) that the
//!   approval gate and the incremental renderer talk through
//! - Agent stream items ([`AgentEvent`]) and the line parser for the agent's
//!   `stream-json` output
//! - The replies written back to the agent ([`PermissionReply`])
//! - The callback-data encoding used by inline buttons ([`CallbackAction`])
//! - Ordered tool parameters ([`ToolInput`])
//!
//! Nothing in here knows about a particular chat transport.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod callback;
pub mod control;
pub mod error;
pub mod event;
pub mod surface;
pub mod tool;
pub mod utils;

pub use callback::{CallbackAction, PermissionAction, parse_callback_data};
pub use control::{PermissionReply, user_message};
pub use error::{EventParseError, SurfaceError, SurfaceResult};
pub use event::{AgentEvent, parse_line};
pub use surface::{
    ApprovalPrompt, ApprovalPrompter, EditOutcome, MarkupMode, MessageRef, MessageSurface,
};
pub use tool::ToolInput;
pub use utils::truncate_to_boundary;
