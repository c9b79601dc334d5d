//! Layered configuration for the teleclaude bridge.
//!
//! # Usage
//!
//! ```rust,no_run
//! use teleclaude_config::Config;
//!
//! let loaded = Config::load(None).unwrap();
//! println!("Agent command: {}", loaded.config.agent.command);
//! ```
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **User file** (`~/.teleclaude/config.toml`, or a path given on the
//!    command line)
//! 2. **Environment variables** (`TELEGRAM_BOT_TOKEN`,
//!    `TELEGRAM_ALLOWED_USERS`, `TELECLAUDE_AGENT_COMMAND`,
//!    `TELECLAUDE_LOG_LEVEL`), fallback only
//! 3. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependencies on other teleclaude crates. Conversion to
//! runtime types happens in the binary.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered configuration merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::LoadedConfig;
pub use merge::ConfigLayer;
pub use types::*;

impl Config {
    /// Load the configuration, optionally from an explicit file.
    ///
    /// See [`loader::load`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a config file is malformed or the final
    /// configuration fails validation.
    pub fn load(explicit_path: Option<&std::path::Path>) -> ConfigResult<LoadedConfig> {
        loader::load(explicit_path, None)
    }
}
