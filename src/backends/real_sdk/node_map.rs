//! Typed node-map adapter standing in for a vendor SDK node graph.
//!
//! Nodes carry one typed current value plus optional enum/range metadata.
//! Writes are type-checked and range-checked here; clamping is deliberately
//! NOT this layer's job (the apply engine clamps and records the
//! adjustment, the node map only accepts or rejects).

#![allow(missing_docs)]

use std::collections::BTreeMap;

use crate::core::errors::{LabOpsError, Result};

/// Generic value shape for parameter nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeValueType {
    #[default]
    Unknown,
    Bool,
    Int64,
    Float64,
    String,
    Enumeration,
}

/// Best-effort range metadata for numeric nodes. Some SDK nodes expose both
/// bounds, some one side, some neither.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeNumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One node definition: type, current value, and constraints.
#[derive(Debug, Clone, Default)]
pub struct NodeDefinition {
    pub value_type: NodeValueType,
    pub bool_value: Option<bool>,
    pub int64_value: Option<i64>,
    pub float64_value: Option<f64>,
    pub string_value: Option<String>,
    pub enum_values: Vec<String>,
    pub numeric_range: NodeNumericRange,
}

fn validate_numeric_range(key: &str, range: NodeNumericRange, value: f64) -> Result<()> {
    if let Some(min) = range.min {
        if value < min {
            return Err(LabOpsError::Runtime {
                details: format!("value for key '{key}' is below minimum {min}"),
            });
        }
    }
    if let Some(max) = range.max {
        if value > max {
            return Err(LabOpsError::Runtime {
                details: format!("value for key '{key}' is above maximum {max}"),
            });
        }
    }
    Ok(())
}

/// In-memory node map used for deterministic tests and real-backend
/// bring-up before proprietary SDK node calls are linked.
#[derive(Debug, Default, Clone)]
pub struct NodeMap {
    nodes: BTreeMap<String, NodeDefinition>,
}

impl NodeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces one node definition.
    pub fn upsert_node(&mut self, key: impl Into<String>, definition: NodeDefinition) {
        self.nodes.insert(key.into(), definition);
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    #[must_use]
    pub fn node_type(&self, key: &str) -> NodeValueType {
        self.nodes.get(key).map_or(NodeValueType::Unknown, |n| n.value_type)
    }

    #[must_use]
    pub fn try_get_bool(&self, key: &str) -> Option<bool> {
        let node = self.nodes.get(key)?;
        if node.value_type != NodeValueType::Bool {
            return None;
        }
        node.bool_value
    }

    #[must_use]
    pub fn try_get_int64(&self, key: &str) -> Option<i64> {
        let node = self.nodes.get(key)?;
        if node.value_type != NodeValueType::Int64 {
            return None;
        }
        node.int64_value
    }

    #[must_use]
    pub fn try_get_float64(&self, key: &str) -> Option<f64> {
        let node = self.nodes.get(key)?;
        if node.value_type != NodeValueType::Float64 {
            return None;
        }
        node.float64_value
    }

    #[must_use]
    pub fn try_get_string(&self, key: &str) -> Option<String> {
        let node = self.nodes.get(key)?;
        if !matches!(
            node.value_type,
            NodeValueType::String | NodeValueType::Enumeration
        ) {
            return None;
        }
        node.string_value.clone()
    }

    pub fn try_set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        let node = self.node_for_write(key)?;
        if node.value_type != NodeValueType::Bool {
            return Err(type_mismatch(key, "bool"));
        }
        node.bool_value = Some(value);
        Ok(())
    }

    pub fn try_set_int64(&mut self, key: &str, value: i64) -> Result<()> {
        let range = self.range_of(key);
        let node = self.node_for_write(key)?;
        if node.value_type != NodeValueType::Int64 {
            return Err(type_mismatch(key, "int64"));
        }
        #[allow(clippy::cast_precision_loss)]
        validate_numeric_range(key, range, value as f64)?;
        node.int64_value = Some(value);
        Ok(())
    }

    pub fn try_set_float64(&mut self, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(LabOpsError::Runtime {
                details: format!("value for key '{key}' must be finite"),
            });
        }
        let range = self.range_of(key);
        let node = self.node_for_write(key)?;
        if node.value_type != NodeValueType::Float64 {
            return Err(type_mismatch(key, "float64"));
        }
        validate_numeric_range(key, range, value)?;
        node.float64_value = Some(value);
        Ok(())
    }

    /// String writes: free-form for string nodes, case-sensitive allowed-set
    /// membership for enumeration nodes.
    pub fn try_set_string(&mut self, key: &str, value: &str) -> Result<()> {
        let node = self.node_for_write(key)?;
        match node.value_type {
            NodeValueType::String => {
                node.string_value = Some(value.to_string());
                Ok(())
            }
            NodeValueType::Enumeration => {
                if !node.enum_values.iter().any(|allowed| allowed == value) {
                    return Err(LabOpsError::Runtime {
                        details: format!("value '{value}' is not supported for key '{key}'"),
                    });
                }
                node.string_value = Some(value.to_string());
                Ok(())
            }
            _ => Err(type_mismatch(key, "string/enum")),
        }
    }

    /// All node names in lexicographic order.
    #[must_use]
    pub fn list_keys(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Allowed values for an enumeration node (empty otherwise).
    #[must_use]
    pub fn list_enum_values(&self, key: &str) -> Vec<String> {
        match self.nodes.get(key) {
            Some(node) if node.value_type == NodeValueType::Enumeration => {
                node.enum_values.clone()
            }
            _ => Vec::new(),
        }
    }

    /// Numeric range metadata for int64/float64 nodes.
    #[must_use]
    pub fn try_get_numeric_range(&self, key: &str) -> Option<NodeNumericRange> {
        let node = self.nodes.get(key)?;
        if !matches!(
            node.value_type,
            NodeValueType::Int64 | NodeValueType::Float64
        ) {
            return None;
        }
        Some(node.numeric_range)
    }

    fn node_for_write(&mut self, key: &str) -> Result<&mut NodeDefinition> {
        self.nodes.get_mut(key).ok_or_else(|| LabOpsError::Runtime {
            details: format!("unknown node key: {key}"),
        })
    }

    fn range_of(&self, key: &str) -> NodeNumericRange {
        self.nodes
            .get(key)
            .map_or(NodeNumericRange::default(), |n| n.numeric_range)
    }
}

fn type_mismatch(key: &str, expected: &str) -> LabOpsError {
    LabOpsError::Runtime {
        details: format!("type mismatch for key '{key}': expected {expected}"),
    }
}

/// Builds the deterministic default node map used by the open real-backend
/// path. Values mirror a typical industrial camera node graph.
#[must_use]
pub fn default_node_map() -> NodeMap {
    let mut map = NodeMap::new();
    map.upsert_node(
        "ExposureTime",
        NodeDefinition {
            value_type: NodeValueType::Float64,
            float64_value: Some(1200.0),
            numeric_range: NodeNumericRange {
                min: Some(5.0),
                max: Some(10_000_000.0),
            },
            ..NodeDefinition::default()
        },
    );
    map.upsert_node(
        "Gain",
        NodeDefinition {
            value_type: NodeValueType::Float64,
            float64_value: Some(0.0),
            numeric_range: NodeNumericRange {
                min: Some(0.0),
                max: Some(48.0),
            },
            ..NodeDefinition::default()
        },
    );
    map.upsert_node(
        "PixelFormat",
        NodeDefinition {
            value_type: NodeValueType::Enumeration,
            string_value: Some("mono8".into()),
            enum_values: vec!["mono8".into(), "mono12".into(), "rgb8".into()],
            ..NodeDefinition::default()
        },
    );
    map.upsert_node(
        "RegionOfInterest",
        NodeDefinition {
            value_type: NodeValueType::String,
            string_value: Some(String::new()),
            ..NodeDefinition::default()
        },
    );
    map.upsert_node(
        "TriggerMode",
        NodeDefinition {
            value_type: NodeValueType::Enumeration,
            string_value: Some("free_run".into()),
            enum_values: vec!["free_run".into(), "software".into(), "hardware".into()],
            ..NodeDefinition::default()
        },
    );
    map.upsert_node(
        "TriggerSource",
        NodeDefinition {
            value_type: NodeValueType::Enumeration,
            string_value: Some("line0".into()),
            enum_values: vec!["line0".into(), "line1".into(), "software".into()],
            ..NodeDefinition::default()
        },
    );
    map.upsert_node(
        "AcquisitionFrameRate",
        NodeDefinition {
            value_type: NodeValueType::Float64,
            float64_value: Some(30.0),
            numeric_range: NodeNumericRange {
                min: Some(1.0),
                max: Some(240.0),
            },
            ..NodeDefinition::default()
        },
    );
    map
}
