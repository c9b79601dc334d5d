//! Tool invocation parameters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered mapping of parameter name to value for one tool invocation.
///
/// Order is the order the agent emitted the parameters in. Only used for
/// display and for the approval rules; the bridge never executes tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolInput(Map<String, Value>);

impl ToolInput {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from an arbitrary JSON value.
    ///
    /// Objects keep their keys; anything else is stored under `"input"` so
    /// it is still visible in the approval prompt.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::new(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                Self(map)
            },
        }
    }

    /// Add a parameter, keeping insertion order.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw value of a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of a parameter, if present and a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Iterate parameters in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render a value the way a human expects to read it: strings without
    /// quotes, everything else as compact JSON.
    #[must_use]
    pub fn display_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<Map<String, Value>> for ToolInput {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
