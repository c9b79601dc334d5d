//! Config file discovery and layered loading.
//!
//! 1. Parse `defaults.toml` → base
//! 2. Merge the user file: an explicit path, or `~/.teleclaude/config.toml`
//! 3. Apply env var fallbacks for fields the file did not set
//! 4. Deserialize the merged tree → `Config`
//! 5. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Directory under the home directory holding the user config.
const CONFIG_DIR: &str = ".teleclaude";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration plus where its values came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The validated configuration.
    pub config: Config,
    /// Which layer set each field.
    pub field_sources: FieldSources,
    /// Files that contributed, in load order.
    pub loaded_files: Vec<String>,
}

/// Load configuration with the process environment.
///
/// With `explicit_path`, that file must exist. Otherwise the user file is
/// looked up under `home_override` (or the real home directory) and skipped
/// when absent.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a config file is unreadable or malformed, or
/// if the merged configuration fails validation.
pub fn load(explicit_path: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<LoadedConfig> {
    load_with_env(explicit_path, home_override, &collect_env_vars())
}

/// [`load`] with an explicit environment.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<S: ::std::hash::BuildHasher>(
    explicit_path: Option<&Path>,
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<LoadedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    let user_file = match explicit_path {
        Some(path) => {
            let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
                path: path.display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;
            Some((overlay, path.to_path_buf()))
        },
        None => {
            let path = user_config_path(home_override)?;
            try_load_file(&path)?.map(|overlay| (overlay, path))
        },
    };

    if let Some((overlay, path)) = user_file {
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::User,
            &mut field_sources,
        );
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded user config");
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(LoadedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// `~/.teleclaude/config.toml`, or the same under `home_override`.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDir`] if no home directory can be found.
pub fn user_config_path(home_override: Option<&Path>) -> ConfigResult<PathBuf> {
    let home = match home_override {
        Some(h) => h.to_path_buf(),
        None => directories::BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .ok_or(ConfigError::NoHomeDir)?,
    };
    Ok(home.join(CONFIG_DIR).join("config.toml"))
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}
