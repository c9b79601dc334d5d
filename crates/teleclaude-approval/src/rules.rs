//! Which tool invocations need a human.
//!
//! A tool is sensitive when its name is on the configured list, or when it is
//! `Bash` and the command matches a dangerous pattern. Everything else runs
//! without a prompt.

use std::sync::LazyLock;

use regex::Regex;
use teleclaude_core::ToolInput;
use teleclaude_core::utils::truncate_to_boundary;

/// Shell commands that are sensitive regardless of config. Matched
/// case-insensitively against whole words.
static BUILTIN_DANGEROUS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\brm\s",
        r"\brmdir\b",
        r"\bgit\s+push\b",
        r"(^|\s)--force\b",
        r"\bsudo\b",
        r"\bchmod\s",
        r"\bchown\s",
        r"\bdd\s",
        r"\bmkfs\b",
        r"\bfdisk\b",
        r">\s*/",
        r"\b(curl|wget)\b[^|]*\|\s*(ba|z)?sh\b",
        r":\(\)\s*\{",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("invalid regex"))
    .collect()
});

/// Tool name whose `command` parameter is inspected.
const SHELL_TOOL: &str = "Bash";

/// Width of the command excerpt in generic descriptions.
const DESCRIBE_MAX: usize = 30;

/// Approval policy for tool invocations.
#[derive(Debug, Clone, Default)]
pub struct ApprovalRules {
    /// Tool names (case-insensitive) that always need approval.
    require_approval_for: Vec<String>,
    /// Configured command phrases, compiled to whole-word matchers.
    dangerous_commands: Vec<Regex>,
}

/// Match `phrase` literally, case-insensitively, and not as part of a longer
/// word.
fn phrase_matcher(phrase: &str) -> Option<Regex> {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return None;
    }
    let word_edge = |c: Option<char>| {
        if c.is_some_and(|c| c.is_alphanumeric() || c == '_') {
            r"\b"
        } else {
            ""
        }
    };
    let pattern = format!(
        "(?i){}{}{}",
        word_edge(phrase.chars().next()),
        regex::escape(phrase),
        word_edge(phrase.chars().last()),
    );
    Regex::new(&pattern).ok()
}

impl ApprovalRules {
    /// Build rules from configured lists.
    #[must_use]
    pub fn new(require_approval_for: Vec<String>, dangerous_commands: Vec<String>) -> Self {
        Self {
            require_approval_for,
            dangerous_commands: dangerous_commands
                .iter()
                .filter_map(|p| phrase_matcher(p))
                .collect(),
        }
    }

    /// Whether this invocation must go through the gate.
    #[must_use]
    pub fn requires_approval(&self, tool_name: &str, input: &ToolInput) -> bool {
        if self
            .require_approval_for
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tool_name))
        {
            return true;
        }

        tool_name == SHELL_TOOL
            && input
                .get_str("command")
                .is_some_and(|cmd| self.is_dangerous_command(cmd))
    }

    /// Whether a shell command matches a dangerous pattern.
    #[must_use]
    pub fn is_dangerous_command(&self, command: &str) -> bool {
        BUILTIN_DANGEROUS
            .iter()
            .chain(&self.dangerous_commands)
            .any(|re| re.is_match(command))
    }

    /// A short human-readable reason for the request.
    #[must_use]
    pub fn describe(tool_name: &str, input: &ToolInput) -> String {
        if tool_name == SHELL_TOOL {
            if let Some(description) = input.get_str("description")
                && !description.trim().is_empty()
            {
                return description.trim().to_string();
            }
            if let Some(command) = input.get_str("command") {
                return describe_command(command);
            }
        }
        format!("Execute {tool_name} operation")
    }
}

fn describe_command(command: &str) -> String {
    let command = command.trim();
    let mut words = command.split_whitespace();
    let Some(first) = words.next() else {
        return "Run shell command".to_string();
    };
    let second = words.next();

    match (first, second) {
        ("rm" | "rmdir", _) => "Delete files/directories".to_string(),
        ("git", Some(sub)) => format!("Git {sub} operation"),
        ("git", None) => "Git operation".to_string(),
        ("cargo", Some(sub)) => format!("Cargo {sub}"),
        ("npm" | "yarn" | "pnpm", Some(sub)) => format!("{first} {sub}"),
        ("npm" | "yarn" | "pnpm", None) => format!("{first} command"),
        _ if command.len() > DESCRIBE_MAX => format!(
            "Run: {}...",
            truncate_to_boundary(command, DESCRIBE_MAX.saturating_sub(3))
        ),
        _ => format!("Run: {command}"),
    }
}
