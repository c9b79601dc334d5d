//! Error types for the Telegram bot.

use thiserror::Error;

/// Errors produced by the Telegram bot.
#[derive(Debug, Error)]
pub enum TelegramBotError {
    /// The agent process could not be started or read.
    #[error("agent process error: {0}")]
    Agent(#[from] std::io::Error),

    /// Telegram API error.
    #[error("telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] teleclaude_config::ConfigError),

    /// The bot cannot start without a token.
    #[error("no bot token configured (set TELEGRAM_BOT_TOKEN or [telegram] bot_token)")]
    MissingToken,
}

/// Convenience alias.
pub type TelegramResult<T> = Result<T, TelegramBotError>;
