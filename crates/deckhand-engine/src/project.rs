//! Projection of configuration sub-trees into Kubernetes API types

use deckhand_core::{ConfigNode, ResolvedConfig};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};

/// Deserialize a sub-tree into a typed API structure
pub(crate) fn project<T: DeserializeOwned>(node: &ConfigNode, path: &str) -> Result<T> {
    serde_json::from_value(node.to_json())
        .map_err(|e| EngineError::render(path, format!("malformed value: {}", e)))
}

/// Like [`project`], but missing and empty values are `None`
pub(crate) fn project_opt<T: DeserializeOwned>(
    config: &ResolvedConfig,
    path: &str,
) -> Result<Option<T>> {
    match config.get(path) {
        Some(node) if !node.is_empty() => project(node, path).map(Some),
        _ => Ok(None),
    }
}

/// A mapping of scalars as a string map (labels, annotations, node selectors)
pub(crate) fn string_map(config: &ResolvedConfig, path: &str) -> Result<BTreeMap<String, String>> {
    let Some(map) = config.get(path).and_then(ConfigNode::as_mapping) else {
        return Ok(BTreeMap::new());
    };

    map.iter()
        .map(|(key, value)| {
            value
                .scalar_to_string()
                .map(|v| (key.clone(), v))
                .ok_or_else(|| {
                    EngineError::render(
                        format!("{}.{}", path, key),
                        format!("expected a scalar, found {}", value.kind_name()),
                    )
                })
        })
        .collect()
}

pub(crate) fn non_empty<K, V>(map: BTreeMap<K, V>) -> Option<BTreeMap<K, V>> {
    Some(map).filter(|m| !m.is_empty())
}

pub(crate) fn to_i32(value: i64, path: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| EngineError::render(path, format!("{} is out of range", value)))
}

/// Resource quantities are strings in the API; `cpu: 1` is accepted and
/// written as `"1"`
pub(crate) fn quantities_as_strings(node: &ConfigNode) -> ConfigNode {
    match node {
        ConfigNode::Mapping(map) => ConfigNode::Mapping(
            map.iter()
                .map(|(k, v)| (k.clone(), quantities_as_strings(v)))
                .collect(),
        ),
        ConfigNode::Integer(_) | ConfigNode::Float(_) => {
            node.scalar_to_string().map(ConfigNode::String).unwrap_or_default()
        }
        other => other.clone(),
    }
}
