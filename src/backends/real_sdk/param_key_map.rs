//! Symbolic parameter key → SDK node name mapping.
//!
//! The mapping is data-driven JSON so labs can retarget generic scenario
//! keys at different vendor node graphs without a rebuild. Keys and values
//! must be non-empty; a duplicate key is a parse error, not a silent
//! overwrite.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::core::errors::{LabOpsError, Result};

/// Environment variable overriding the default map location.
pub const PARAM_KEY_MAP_ENV: &str = "LABOPS_PARAM_KEY_MAP";

/// Default map location, resolved by walking up from the working directory.
pub const PARAM_KEY_MAP_RELATIVE_PATH: &str = "src/backends/real_sdk/maps/param_key_map.json";

const WALK_UP_LIMIT: usize = 12;

/// Loaded symbolic-key → node-name mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamKeyMap {
    generic_to_node: BTreeMap<String, String>,
}

struct KeyMapVisitor;

impl<'de> Visitor<'de> for KeyMapVisitor {
    type Value = BTreeMap<String, String>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a JSON object of non-empty string keys to non-empty string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            if key.is_empty() {
                return Err(serde::de::Error::custom("mapping key must not be empty"));
            }
            if value.is_empty() {
                return Err(serde::de::Error::custom(format!(
                    "mapping value for key '{key}' must not be empty"
                )));
            }
            if entries.insert(key.clone(), value).is_some() {
                return Err(serde::de::Error::custom(format!(
                    "duplicate mapping key: {key}"
                )));
            }
        }
        Ok(entries)
    }
}

impl<'de> Deserialize<'de> for ParamKeyMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self {
            generic_to_node: deserializer.deserialize_map(KeyMapVisitor)?,
        })
    }
}

impl ParamKeyMap {
    /// Parses a key map from JSON text. An empty mapping is rejected.
    pub fn from_text(json_text: &str) -> Result<Self> {
        let map: Self = serde_json::from_str(json_text).map_err(|e| LabOpsError::Parse {
            context: "param key map",
            details: e.to_string(),
        })?;
        if map.generic_to_node.is_empty() {
            return Err(LabOpsError::Parse {
                context: "param key map",
                details: "param key map must include at least one key mapping".into(),
            });
        }
        Ok(map)
    }

    /// Loads and parses a key map file.
    pub fn from_file(path: &Path) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(LabOpsError::Parse {
                context: "param key map",
                details: "param key map path cannot be empty".into(),
            });
        }
        let text = fs::read_to_string(path).map_err(|e| LabOpsError::io(path, e))?;
        if text.trim().is_empty() {
            return Err(LabOpsError::Parse {
                context: "param key map",
                details: format!("param key map file is empty: {}", path.display()),
            });
        }
        Self::from_text(&text).map_err(|e| LabOpsError::Parse {
            context: "param key map",
            details: format!("failed to parse param key map '{}': {e}", path.display()),
        })
    }

    #[must_use]
    pub fn has(&self, generic_key: &str) -> bool {
        self.generic_to_node.contains_key(generic_key)
    }

    /// Resolves a symbolic key to its node name.
    #[must_use]
    pub fn resolve(&self, generic_key: &str) -> Option<&str> {
        self.generic_to_node.get(generic_key).map(String::as_str)
    }

    /// All symbolic keys in lexicographic order.
    #[must_use]
    pub fn list_generic_keys(&self) -> Vec<String> {
        self.generic_to_node.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.generic_to_node.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generic_to_node.is_empty()
    }
}

/// Resolves the default key-map path: env override first, then a bounded
/// walk up from the working directory, then the bare relative path.
#[must_use]
pub fn resolve_default_param_key_map_path() -> PathBuf {
    if let Some(override_path) = env::var_os(PARAM_KEY_MAP_ENV) {
        if !override_path.is_empty() {
            return PathBuf::from(override_path);
        }
    }

    let relative = Path::new(PARAM_KEY_MAP_RELATIVE_PATH);
    let Ok(mut cursor) = env::current_dir() else {
        return relative.to_path_buf();
    };

    for _ in 0..WALK_UP_LIMIT {
        let candidate = cursor.join(relative);
        if candidate.is_file() {
            return candidate;
        }
        if !cursor.pop() {
            break;
        }
    }

    relative.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_mapping() {
        let map = ParamKeyMap::from_text(
            r#"{"exposure_us": "ExposureTime", "gain_db": "Gain"}"#,
        )
        .unwrap();
        assert_eq!(map.resolve("exposure_us"), Some("ExposureTime"));
        assert_eq!(map.resolve("missing"), None);
        assert_eq!(map.list_generic_keys(), vec!["exposure_us", "gain_db"]);
    }

    #[test]
    fn duplicate_key_is_a_parse_error() {
        let err =
            ParamKeyMap::from_text(r#"{"exposure_us": "A", "exposure_us": "B"}"#).unwrap_err();
        assert!(err.to_string().contains("duplicate mapping key"));
    }

    #[test]
    fn empty_values_are_rejected() {
        assert!(ParamKeyMap::from_text(r#"{"": "Node"}"#).is_err());
        assert!(ParamKeyMap::from_text(r#"{"key": ""}"#).is_err());
        assert!(ParamKeyMap::from_text("{}").is_err());
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert!(ParamKeyMap::from_text("[1, 2]").is_err());
    }

    #[test]
    fn shipped_default_map_parses() {
        let map = ParamKeyMap::from_text(include_str!("maps/param_key_map.json")).unwrap();
        assert!(map.has("exposure_us"));
        assert!(map.has("trigger_mode"));
    }
}
