//! Teloxide bot setup, dispatcher, and handler registration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use teleclaude_approval::ApprovalRules;
use teleclaude_config::{ApprovalSection, Config, LoggingSection, StreamingSection};
use teleclaude_render::RenderConfig;
use teleclaude_telemetry::{LogConfig, LogFormat, TelemetryResult};
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::callback::handle_callback;
use crate::error::TelegramBotError;
use crate::handler::{self, BotState};
use crate::session::ChatSessions;

/// Renderer limits from the `[streaming]` section.
#[must_use]
pub fn render_config(streaming: &StreamingSection) -> RenderConfig {
    RenderConfig {
        edit_throttle: Duration::from_millis(streaming.edit_throttle_ms),
        max_size: streaming.chunk_size,
        overhead_budget: streaming.overhead_budget,
    }
}

/// Approval policy from the `[approval]` section.
#[must_use]
pub fn approval_rules(approval: &ApprovalSection) -> ApprovalRules {
    ApprovalRules::new(
        approval.require_approval_for.clone(),
        approval.dangerous_commands.clone(),
    )
}

/// Logging setup from the `[logging]` section.
///
/// # Errors
///
/// Returns an error if the format is unknown.
pub fn log_config(logging: &LoggingSection) -> TelemetryResult<LogConfig> {
    let mut config = LogConfig::new(&logging.level).with_format(LogFormat::from_str(&logging.format)?);
    for directive in &logging.directives {
        config = config.with_directive(directive);
    }
    Ok(config)
}

/// Build the shared state and the teloxide handler tree.
fn build_state_and_handler(
    config: Config,
) -> (BotState, teloxide::dispatching::UpdateHandler<anyhow::Error>) {
    if config.telegram.allowed_user_ids.is_empty() {
        warn!(
            "Telegram bot starting with NO user restrictions. \
             Any Telegram user can drive the agent. \
             Set [telegram] allowed_user_ids or TELEGRAM_ALLOWED_USERS to restrict access."
        );
    }

    let state = BotState {
        sessions: ChatSessions::new(Duration::from_secs(config.approval.timeout_secs)),
        rules: Arc::new(approval_rules(&config.approval)),
        render: render_config(&config.streaming),
        config: Arc::new(config),
    };

    let message_handler = Update::filter_message().endpoint({
        let state = state.clone();
        move |bot: Bot, msg: Message| {
            let state = state.clone();
            async move { Box::pin(handler::handle_message(bot, msg, state)).await }
        }
    });

    let callback_handler = Update::filter_callback_query().endpoint({
        let state = state.clone();
        move |bot: Bot, query: CallbackQuery| {
            let state = state.clone();
            async move { handle_callback(bot, query, state).await }
        }
    });

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    (state, handler)
}

/// Run the Telegram bot until Ctrl+C.
///
/// # Errors
///
/// Returns an error if no bot token is configured.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let token = config
        .telegram
        .bot_token
        .clone()
        .ok_or(TelegramBotError::MissingToken)?;
    let bot = Bot::new(token);

    info!(
        agent = %config.agent.command,
        approval_timeout_secs = config.approval.timeout_secs,
        "starting Telegram bot"
    );
    let (_state, handler) = build_state_and_handler(config);

    Box::pin(
        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch(),
    )
    .await;

    info!("Bot stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleclaude_test::test_bash_input;

    #[test]
    fn render_config_from_defaults() {
        let render = render_config(&StreamingSection::default());
        assert_eq!(render, RenderConfig::default());
    }

    #[test]
    fn approval_rules_from_defaults() {
        let rules = approval_rules(&ApprovalSection::default());
        assert!(rules.requires_approval("write", &teleclaude_core::ToolInput::new()));
        assert!(rules.requires_approval("Bash", &test_bash_input("sudo ls")));
        assert!(!rules.requires_approval("Bash", &test_bash_input("ls")));
        assert!(!rules.requires_approval("Read", &teleclaude_core::ToolInput::new()));
    }

    #[test]
    fn log_config_from_section() {
        let section = LoggingSection {
            level: "debug".to_string(),
            format: "json".to_string(),
            directives: vec!["teloxide=warn".to_string()],
        };
        let config = log_config(&section).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.directives, vec!["teloxide=warn"]);
    }

    #[test]
    fn log_config_rejects_unknown_format() {
        let section = LoggingSection {
            format: "xml".to_string(),
            ..LoggingSection::default()
        };
        assert!(log_config(&section).is_err());
    }

    #[test]
    fn missing_token_is_reported() {
        let err = TelegramBotError::MissingToken;
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }
}
