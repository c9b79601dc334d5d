//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only fill fields that no
//! config file set.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "TELEGRAM_BOT_TOKEN",
        field_path: "telegram.bot_token",
    },
    EnvMapping {
        var_name: "TELEGRAM_ALLOWED_USERS",
        field_path: "telegram.allowed_user_ids",
    },
    EnvMapping {
        var_name: "TELECLAUDE_AGENT_COMMAND",
        field_path: "agent.command",
    },
    EnvMapping {
        var_name: "TELECLAUDE_LOG_LEVEL",
        field_path: "logging.level",
    },
];

/// Apply environment variable fallbacks to fields that were **not** set by
/// the config file.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }

        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let Some(value) = coerce(mapping.field_path, raw) else {
            warn!(var = mapping.var_name, "ignoring malformed environment variable");
            continue;
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        set_field(merged, mapping.field_path, value);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    count
}

/// Convert a raw env value into the TOML type of its field.
fn coerce(path: &str, raw: &str) -> Option<toml::Value> {
    match path {
        "telegram.allowed_user_ids" => parse_user_ids(raw).map(|ids| {
            toml::Value::Array(
                ids.into_iter()
                    .filter_map(|id| i64::try_from(id).ok())
                    .map(toml::Value::Integer)
                    .collect(),
            )
        }),
        _ => {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| toml::Value::String(trimmed.to_owned()))
        },
    }
}

/// Parse a comma-separated list of user IDs. Blank entries are skipped; any
/// other malformed entry rejects the whole list.
#[must_use]
pub fn parse_user_ids(raw: &str) -> Option<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().ok())
        .collect()
}

/// Set a dotted `path` in the tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let (parents, leaf) = path.rsplit_once('.').unwrap_or(("", path));

    let mut current = root;
    for segment in parents.split('.').filter(|s| !s.is_empty()) {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
