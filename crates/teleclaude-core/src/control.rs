//! Lines written to the agent's stdin (`--input-format stream-json`).

use serde_json::json;

use crate::tool::ToolInput;

/// The prompt that opens a turn.
#[must_use]
pub fn user_message(prompt: &str) -> String {
    json!({
        "type": "user",
        "message": { "role": "user", "content": prompt },
        "parent_tool_use_id": null,
        "session_id": "default",
    })
    .to_string()
}

/// Answer to an [`AgentEvent::PermissionRequest`](crate::AgentEvent::PermissionRequest).
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionReply {
    /// Run the tool with these parameters.
    Allow {
        /// Usually the input the agent asked with.
        updated_input: ToolInput,
    },
    /// Do not run the tool. The agent sees `message` as the tool's result.
    Deny {
        /// Why.
        message: String,
    },
}

impl PermissionReply {
    /// Whether the tool may run.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// The `control_response` line for control request `request_id`.
    #[must_use]
    pub fn to_line(&self, request_id: &str) -> String {
        let decision = match self {
            Self::Allow { updated_input } => json!({
                "behavior": "allow",
                "updatedInput": updated_input,
            }),
            Self::Deny { message } => json!({
                "behavior": "deny",
                "message": message,
            }),
        };
        json!({
            "type": "control_response",
            "response": {
                "subtype": "success",
                "request_id": request_id,
                "response": decision,
            },
        })
        .to_string()
    }
}
