//! Value layers: one named source of overrides

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::node::{set_path, ConfigNode, Mapping};

/// Where a layer came from
///
/// Informational only: priority is the layer's position in the sequence
/// handed to the merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerOrigin {
    /// Built-in schema defaults or the chart's values.yaml
    Defaults,
    /// A named environment profile
    Profile,
    /// Release-specific values file
    Release,
    /// `--set` arguments
    CommandLine,
    /// Constructed in code (tests, re-merged resolved configs)
    Inline,
}

impl fmt::Display for LayerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Defaults => "defaults",
            Self::Profile => "profile",
            Self::Release => "release",
            Self::CommandLine => "command-line",
            Self::Inline => "inline",
        };
        write!(f, "{}", s)
    }
}

/// An immutable, named partial configuration tree
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    name: String,
    origin: LayerOrigin,
    root: ConfigNode,
}

impl Layer {
    /// Create a layer from a parsed tree
    ///
    /// The root must be a mapping; an empty document (null) is accepted as
    /// an empty layer.
    pub fn new(name: impl Into<String>, origin: LayerOrigin, root: ConfigNode) -> Result<Self> {
        let name = name.into();
        let root = match root {
            ConfigNode::Null => ConfigNode::mapping(),
            ConfigNode::Mapping(map) => ConfigNode::Mapping(map),
            other => {
                return Err(CoreError::TypeMismatch {
                    path: format!("<{}>", name),
                    expected: "mapping".to_string(),
                    actual: other.kind_name().to_string(),
                });
            }
        };
        Ok(Self { name, origin, root })
    }

    /// A layer over a mapping built in code
    pub fn from_mapping(name: impl Into<String>, origin: LayerOrigin, root: Mapping) -> Self {
        Self {
            name: name.into(),
            origin,
            root: ConfigNode::Mapping(root),
        }
    }

    /// An empty layer
    pub fn empty(name: impl Into<String>, origin: LayerOrigin) -> Self {
        Self::from_mapping(name, origin, Mapping::new())
    }

    /// Parse a layer from a YAML document
    pub fn from_yaml(name: impl Into<String>, origin: LayerOrigin, yaml: &str) -> Result<Self> {
        let root: ConfigNode = serde_yaml::from_str(yaml)?;
        Self::new(name, origin, root)
    }

    /// Parse a layer from a JSON document
    pub fn from_json(name: impl Into<String>, origin: LayerOrigin, json: &str) -> Result<Self> {
        let root: ConfigNode = serde_json::from_str(json)?;
        Self::new(name, origin, root)
    }

    /// Load a layer from a YAML file; the layer is named after the path
    pub fn from_file<P: AsRef<Path>>(path: P, origin: LayerOrigin) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(path.display().to_string(), origin, &content)
    }

    /// Build a command-line layer from `key=value` arguments
    pub fn from_set_values(set_args: &[String]) -> Result<Self> {
        build_set_layer("--set", set_args, parse_set_scalar)
    }

    /// Like [`Layer::from_set_values`], but every value stays a string
    pub fn from_set_string_values(set_args: &[String]) -> Result<Self> {
        build_set_layer("--set-string", set_args, |val| ConfigNode::String(val.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> LayerOrigin {
        self.origin
    }

    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&ConfigNode> {
        self.root.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Consume the layer, yielding its tree
    pub fn into_root(self) -> ConfigNode {
        self.root
    }
}

fn build_set_layer(
    name: &str,
    set_args: &[String],
    parse: impl Fn(&str) -> ConfigNode,
) -> Result<Layer> {
    let mut root = Mapping::new();

    for arg in set_args {
        let (key, val) = arg
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| CoreError::InvalidSet { arg: arg.clone() })?;
        set_path(&mut root, key, parse(val));
    }

    Ok(Layer::from_mapping(name, LayerOrigin::CommandLine, root))
}

/// Type a `--set` value: booleans, null, integers, floats, inline JSON,
/// falling back to a string
fn parse_set_scalar(val: &str) -> ConfigNode {
    match val {
        "true" => ConfigNode::Bool(true),
        "false" => ConfigNode::Bool(false),
        "null" => ConfigNode::Null,
        _ => {
            if let Ok(num) = val.parse::<i64>() {
                ConfigNode::Integer(num)
            } else if let Ok(num) = val.parse::<f64>() {
                ConfigNode::Float(num)
            } else if val.starts_with('[') || val.starts_with('{') {
                serde_json::from_str(val).unwrap_or_else(|_| ConfigNode::String(val.to_string()))
            } else {
                ConfigNode::String(val.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml() {
        let layer = Layer::from_yaml(
            "values.yaml",
            LayerOrigin::Defaults,
            r#"
image:
  repository: nginx
replicaCount: 2
"#,
        )
        .unwrap();

        assert_eq!(layer.name(), "values.yaml");
        assert_eq!(layer.origin(), LayerOrigin::Defaults);
        assert_eq!(layer.get("image.repository").and_then(ConfigNode::as_str), Some("nginx"));
        assert_eq!(layer.get("replicaCount").and_then(ConfigNode::as_i64), Some(2));
    }

    #[test]
    fn test_empty_document_is_empty_layer() {
        let layer = Layer::from_yaml("empty.yaml", LayerOrigin::Release, "").unwrap();
        assert!(layer.is_empty());
    }

    #[test]
    fn test_from_mapping_keeps_tree() {
        let mut root = Mapping::new();
        set_path(&mut root, "image.repository", ConfigNode::String("nginx".into()));
        set_path(&mut root, "replicaCount", ConfigNode::Integer(2));

        let layer = Layer::from_mapping("built", LayerOrigin::Inline, root);
        assert_eq!(layer.name(), "built");
        assert_eq!(layer.get("image.repository").and_then(ConfigNode::as_str), Some("nginx"));
        assert_eq!(layer.get("replicaCount").and_then(ConfigNode::as_i64), Some(2));
    }

    #[test]
    fn test_non_mapping_root_rejected() {
        let err = Layer::from_yaml("list.yaml", LayerOrigin::Release, "- a\n- b\n").unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn test_set_values() {
        let args = vec![
            "image.tag=v2".to_string(),
            "replicaCount=5".to_string(),
            "autoscaling.enabled=true".to_string(),
            "env.LOG_LEVEL=debug".to_string(),
            "startupProbe=null".to_string(),
        ];

        let layer = Layer::from_set_values(&args).unwrap();

        assert_eq!(layer.origin(), LayerOrigin::CommandLine);
        assert_eq!(layer.get("image.tag").and_then(ConfigNode::as_str), Some("v2"));
        assert_eq!(layer.get("replicaCount").and_then(ConfigNode::as_i64), Some(5));
        assert_eq!(layer.get("autoscaling.enabled").and_then(ConfigNode::as_bool), Some(true));
        assert_eq!(layer.get("env.LOG_LEVEL").and_then(ConfigNode::as_str), Some("debug"));
        assert!(layer.get("startupProbe").unwrap().is_null());
    }

    #[test]
    fn test_set_values_inline_json() {
        let args = vec![r#"imagePullSecrets=[{"name":"regcred"}]"#.to_string()];
        let layer = Layer::from_set_values(&args).unwrap();

        let secrets = layer.get("imagePullSecrets").unwrap().as_sequence().unwrap();
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].get("name").and_then(ConfigNode::as_str), Some("regcred"));
    }

    #[test]
    fn test_set_string_values_keep_strings() {
        let args = vec!["image.tag=1.25".to_string(), "podLabels.tier=3".to_string()];
        let layer = Layer::from_set_string_values(&args).unwrap();

        assert_eq!(layer.name(), "--set-string");
        assert_eq!(layer.get("image.tag").and_then(ConfigNode::as_str), Some("1.25"));
        assert_eq!(layer.get("podLabels.tier").and_then(ConfigNode::as_str), Some("3"));
    }

    #[test]
    fn test_set_values_invalid() {
        let err = Layer::from_set_values(&["novalue".to_string()]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSet { .. }));

        let err = Layer::from_set_values(&["=x".to_string()]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSet { .. }));
    }
}
