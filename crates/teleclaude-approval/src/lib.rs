//! Teleclaude Approval - human-in-the-loop gating of sensitive tool calls.
//!
//! - [`PermissionGate`] suspends a tool invocation until a human answers the
//!   prompt shown through an [`ApprovalPrompter`](teleclaude_core::ApprovalPrompter),
//!   the request times out, or the session is torn down.
//! - [`ApprovalRules`] decides which invocations need the gate at all.
//!
//! # Example
//!
//! ```
//! use teleclaude_approval::{Decision, PermissionGate};
//! use teleclaude_core::{PermissionAction, ToolInput};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gate = PermissionGate::new();
//! // Nothing to prompt through: the gate denies instead of hanging.
//! let decision = gate
//!     .request_approval("Bash", &ToolInput::new().with("command", "rm -rf build"))
//!     .await;
//! assert!(!decision.is_allowed());
//!
//! let (ok, message) = gate.resolve("unknown-id", PermissionAction::Allow);
//! assert!(!ok);
//! assert_eq!(message, "not found or expired");
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod gate;
pub mod rules;

pub use gate::{Decision, DEFAULT_TIMEOUT, PendingApproval, PermissionGate};
pub use rules::ApprovalRules;
