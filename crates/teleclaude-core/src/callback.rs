//! Inline-button callback data.
//!
//! Buttons carry `action:value` strings. The split happens on the first colon
//! only, so values may themselves contain colons. Decoding yields a closed
//! enum that the dispatcher matches exhaustively.

use std::fmt;

/// Prefix for "allow once".
const PERM_ALLOW: &str = "perm_allow";
/// Prefix for "allow always".
const PERM_ALWAYS: &str = "perm_always";
/// Prefix for "deny".
const PERM_DENY: &str = "perm_deny";

/// The user's answer to an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionAction {
    /// Allow this one invocation.
    Allow,
    /// Allow this tool for the rest of the session.
    AllowAlways,
    /// Refuse the invocation.
    Deny,
}

impl PermissionAction {
    /// All actions, in the order the prompt shows them.
    pub const ALL: [Self; 3] = [Self::Allow, Self::AllowAlways, Self::Deny];

    /// The callback action string for this answer.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => PERM_ALLOW,
            Self::AllowAlways => PERM_ALWAYS,
            Self::Deny => PERM_DENY,
        }
    }

    /// Button label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Allow => "✅ Allow",
            Self::AllowAlways => "✅ Always Allow",
            Self::Deny => "❌ Deny",
        }
    }

    /// Encode as callback data for the given request.
    #[must_use]
    pub fn encode(self, request_id: &str) -> String {
        format!("{}:{request_id}", self.as_str())
    }
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Answer to an approval prompt.
    Permission {
        /// Which button was pressed.
        action: PermissionAction,
        /// The pending request it refers to.
        request_id: String,
    },
    /// Anything we do not recognise. Kept so the caller can answer the
    /// callback instead of leaving the client spinning.
    Unknown {
        /// Action part (before the first colon).
        action: String,
        /// Value part (after the first colon, may be empty).
        value: String,
    },
}

/// Split `data` on the first colon into `(action, value)`.
///
/// Data without a colon is all action and an empty value.
#[must_use]
pub fn split_callback_data(data: &str) -> (&str, &str) {
    data.split_once(':').unwrap_or((data, ""))
}

/// Decode raw callback data.
#[must_use]
pub fn parse_callback_data(data: &str) -> CallbackAction {
    let (action, value) = split_callback_data(data);

    let permission = match action {
        PERM_ALLOW => Some(PermissionAction::Allow),
        PERM_ALWAYS => Some(PermissionAction::AllowAlways),
        PERM_DENY => Some(PermissionAction::Deny),
        _ => None,
    };

    match permission {
        Some(action) if !value.is_empty() => CallbackAction::Permission {
            action,
            request_id: value.to_string(),
        },
        _ => CallbackAction::Unknown {
            action: action.to_string(),
            value: value.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_on_first_colon_only() {
        assert_eq!(split_callback_data("a:b:c"), ("a", "b:c"));
        assert_eq!(split_callback_data("plain"), ("plain", ""));
        assert_eq!(split_callback_data("x:"), ("x", ""));
    }

    #[test]
    fn parse_permission_actions() {
        assert_eq!(
            parse_callback_data("perm_allow:abcd1234"),
            CallbackAction::Permission {
                action: PermissionAction::Allow,
                request_id: "abcd1234".into(),
            }
        );
        assert_eq!(
            parse_callback_data("perm_always:abcd1234"),
            CallbackAction::Permission {
                action: PermissionAction::AllowAlways,
                request_id: "abcd1234".into(),
            }
        );
        assert_eq!(
            parse_callback_data("perm_deny:abcd1234"),
            CallbackAction::Permission {
                action: PermissionAction::Deny,
                request_id: "abcd1234".into(),
            }
        );
    }

    #[test]
    fn request_id_may_contain_colons() {
        assert_eq!(
            parse_callback_data("perm_deny:a:b"),
            CallbackAction::Permission {
                action: PermissionAction::Deny,
                request_id: "a:b".into(),
            }
        );
    }

    #[test]
    fn missing_request_id_is_unknown() {
        assert!(matches!(
            parse_callback_data("perm_allow"),
            CallbackAction::Unknown { .. }
        ));
        assert!(matches!(
            parse_callback_data("perm_allow:"),
            CallbackAction::Unknown { .. }
        ));
    }

    #[test]
    fn unrecognised_action_is_unknown() {
        assert_eq!(
            parse_callback_data("resume:42"),
            CallbackAction::Unknown {
                action: "resume".into(),
                value: "42".into(),
            }
        );
    }

    #[test]
    fn encode_matches_parse() {
        for action in PermissionAction::ALL {
            let data = action.encode("deadbeef");
            assert_eq!(
                parse_callback_data(&data),
                CallbackAction::Permission {
                    action,
                    request_id: "deadbeef".into(),
                }
            );
        }
    }

    #[test]
    fn encoded_data_fits_telegram_limit() {
        // Telegram caps callback_data at 64 bytes.
        assert!(PermissionAction::AllowAlways.encode("12345678").len() <= 64);
    }
}
