//! Typed configuration tree

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Mapping type used throughout the tree; insertion order is preserved
pub type Mapping = IndexMap<String, ConfigNode>;

/// A value in the configuration tree
///
/// Deserializes directly from YAML or JSON documents. Mappings keep their
/// key order so that emitted sequences (environment variables, ports) come
/// out in the order they were written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigNode {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<ConfigNode>),
    Mapping(Mapping),
}

impl ConfigNode {
    /// An empty mapping node
    pub fn mapping() -> Self {
        ConfigNode::Mapping(Mapping::new())
    }

    /// Human-readable name of the node's kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigNode::Null => "null",
            ConfigNode::Bool(_) => "boolean",
            ConfigNode::Integer(_) => "integer",
            ConfigNode::Float(_) => "number",
            ConfigNode::String(_) => "string",
            ConfigNode::Sequence(_) => "sequence",
            ConfigNode::Mapping(_) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigNode::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigNode::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigNode::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigNode::Integer(i) => Some(*i as f64),
            ConfigNode::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigNode::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigNode]> {
        match self {
            ConfigNode::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            ConfigNode::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            ConfigNode::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// True for null, empty mappings and empty sequences
    pub fn is_empty(&self) -> bool {
        match self {
            ConfigNode::Null => true,
            ConfigNode::Sequence(items) => items.is_empty(),
            ConfigNode::Mapping(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Render a scalar as the string Kubernetes expects (env values, labels)
    pub fn scalar_to_string(&self) -> Option<String> {
        match self {
            ConfigNode::Bool(b) => Some(b.to_string()),
            ConfigNode::Integer(i) => Some(i.to_string()),
            ConfigNode::Float(f) => Some(f.to_string()),
            ConfigNode::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Get a nested value by dotted path (e.g. "image.tag")
    pub fn get(&self, path: &str) -> Option<&ConfigNode> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.')
            .try_fold(self, |node, key| node.as_mapping().and_then(|m| m.get(key)))
    }

    /// Set a nested value by dotted path, creating intermediate mappings
    pub fn set(&mut self, path: &str, value: ConfigNode) {
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(self, &parts, value);
    }

    /// Remove null entries from mappings, recursively
    ///
    /// Nulls inside sequences are kept; they are values, not unset markers.
    pub fn prune_nulls(self) -> ConfigNode {
        match self {
            ConfigNode::Mapping(map) => ConfigNode::Mapping(
                map.into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k, v.prune_nulls()))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Convert to a JSON value (used for typed projections)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConfigNode::Null => serde_json::Value::Null,
            ConfigNode::Bool(b) => serde_json::Value::Bool(*b),
            ConfigNode::Integer(i) => serde_json::Value::from(*i),
            ConfigNode::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ConfigNode::String(s) => serde_json::Value::String(s.clone()),
            ConfigNode::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(ConfigNode::to_json).collect())
            }
            ConfigNode::Mapping(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

fn set_nested(node: &mut ConfigNode, path: &[&str], value: ConfigNode) {
    let Some((key, rest)) = path.split_first() else {
        *node = value;
        return;
    };

    if !matches!(node, ConfigNode::Mapping(_)) {
        *node = ConfigNode::mapping();
    }

    if let ConfigNode::Mapping(map) = node {
        if rest.is_empty() {
            map.insert((*key).to_string(), value);
        } else {
            let entry = map
                .entry((*key).to_string())
                .or_insert_with(ConfigNode::mapping);
            set_nested(entry, rest, value);
        }
    }
}

/// Set a nested value by dotted path inside a mapping
pub fn set_path(map: &mut Mapping, path: &str, value: ConfigNode) {
    match path.split_once('.') {
        Some((key, rest)) => map
            .entry(key.to_string())
            .or_insert_with(ConfigNode::mapping)
            .set(rest, value),
        None => {
            map.insert(path.to_string(), value);
        }
    }
}

/// Join a parent path and a child key
pub fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

impl From<bool> for ConfigNode {
    fn from(b: bool) -> Self {
        ConfigNode::Bool(b)
    }
}

impl From<i64> for ConfigNode {
    fn from(i: i64) -> Self {
        ConfigNode::Integer(i)
    }
}

impl From<&str> for ConfigNode {
    fn from(s: &str) -> Self {
        ConfigNode::String(s.to_string())
    }
}

impl From<String> for ConfigNode {
    fn from(s: String) -> Self {
        ConfigNode::String(s)
    }
}

impl From<Vec<ConfigNode>> for ConfigNode {
    fn from(items: Vec<ConfigNode>) -> Self {
        ConfigNode::Sequence(items)
    }
}

impl From<Mapping> for ConfigNode {
    fn from(map: Mapping) -> Self {
        ConfigNode::Mapping(map)
    }
}
