//! Teleclaude Telegram bot.
//!
//! Usage: `teleclaude-telegram [CONFIG_PATH]`. Without a path the config is
//! read from `~/.teleclaude/config.toml`, if present.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use teleclaude_config::Config;
use teleclaude_telegram::bot;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let loaded = Config::load(explicit.as_deref())?;

    teleclaude_telemetry::setup_logging(&bot::log_config(&loaded.config.logging)?)?;
    for file in &loaded.loaded_files {
        info!(path = %file, "loaded config file");
    }

    Box::pin(bot::run(loaded.config)).await
}
