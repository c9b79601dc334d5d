//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Smallest usable message size; smaller leaves no room for text after the
/// truncation markup.
const MIN_CHUNK_SIZE: usize = 100;

/// Telegram's hard message limit.
const MAX_CHUNK_SIZE: usize = 4096;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_agent(config)?;
    validate_approval(config)?;
    validate_streaming(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_agent(config: &Config) -> ConfigResult<()> {
    if config.agent.command.trim().is_empty() {
        return Err(invalid("agent.command", "agent command must not be empty"));
    }
    Ok(())
}

fn validate_approval(config: &Config) -> ConfigResult<()> {
    if config.approval.timeout_secs == 0 {
        return Err(invalid(
            "approval.timeout_secs",
            "approval timeout must be at least one second",
        ));
    }
    Ok(())
}

fn validate_streaming(config: &Config) -> ConfigResult<()> {
    let s = &config.streaming;

    if s.edit_throttle_ms == 0 {
        return Err(invalid(
            "streaming.edit_throttle_ms",
            "edit throttle must be greater than zero",
        ));
    }

    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&s.chunk_size) {
        return Err(invalid(
            "streaming.chunk_size",
            format!("chunk_size must be between {MIN_CHUNK_SIZE} and {MAX_CHUNK_SIZE}"),
        ));
    }

    if s.overhead_budget >= s.chunk_size {
        return Err(invalid(
            "streaming.overhead_budget",
            format!(
                "overhead_budget ({}) must be smaller than chunk_size ({})",
                s.overhead_budget, s.chunk_size
            ),
        ));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unknown level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }

    if !matches!(l.format.as_str(), "pretty" | "compact" | "json") {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: pretty, compact, json",
                l.format
            ),
        ));
    }

    Ok(())
}
