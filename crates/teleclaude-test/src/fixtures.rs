//! Test fixtures for common types.

use tracing_subscriber::EnvFilter;

use teleclaude_core::{MessageRef, ToolInput};

/// A message reference for tests.
#[must_use]
pub fn test_message_ref() -> MessageRef {
    MessageRef::new(4242, 7)
}

/// `Bash` parameters with the given command.
#[must_use]
pub fn test_bash_input(command: &str) -> ToolInput {
    ToolInput::new()
        .with("command", command)
        .with("description", "Run a test command")
}

/// `Write` parameters for a small file.
#[must_use]
pub fn test_write_input(path: &str) -> ToolInput {
    ToolInput::new()
        .with("file_path", path)
        .with("content", "fn main() {}\n")
}

/// `count` lines reading `line 0`, `line 1`, ...
#[must_use]
pub fn numbered_lines(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("line {i}")).collect()
}

/// Initialise a tracing subscriber for tests.
///
/// Safe to call from every test; only the first call installs.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}
