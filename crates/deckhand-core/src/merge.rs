//! Layer merging
//!
//! Layers are folded over the schema defaults in ascending priority order:
//! scalars are replaced, mappings are deep-merged, sequences are replaced
//! wholesale and a `null` removes the key. Named lists (`env`) additionally
//! accept a `{NAME: value}` mapping that upserts entries by name.

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::layer::{Layer, LayerOrigin};
use crate::node::{join_path, ConfigNode, Mapping};
use crate::schema::{parse_duration, FieldType, SchemaStore};

/// Merges ordered layers into a validated [`ResolvedConfig`]
pub struct OverlayMerger<'a> {
    schema: &'a SchemaStore,
}

impl<'a> OverlayMerger<'a> {
    pub fn new(schema: &'a SchemaStore) -> Self {
        Self { schema }
    }

    /// Merge layers, lowest priority first
    ///
    /// The schema defaults are applied beneath the first layer. The result is
    /// validated as a whole; on the first failure nothing is returned.
    pub fn merge<I>(&self, layers: I) -> Result<ResolvedConfig>
    where
        I: IntoIterator<Item = Layer>,
    {
        let defaults = self.schema.defaults_layer().into_root();
        let mut root = defaults.clone();
        let mut provenance = IndexMap::new();
        record_provenance(&mut provenance, &defaults, "", "defaults");

        for layer in layers {
            tracing::debug!(
                layer = layer.name(),
                origin = %layer.origin(),
                "merging layer"
            );
            self.schema.check_keys(&layer)?;
            self.merge_node(&mut root, layer.root(), "")?;
            record_provenance(&mut provenance, layer.root(), "", layer.name());
        }

        let root = root.prune_nulls();
        self.schema.validate_resolved(&root)?;
        let root = match root {
            ConfigNode::Mapping(map) => map,
            other => {
                return Err(CoreError::TypeMismatch {
                    path: "<resolved>".to_string(),
                    expected: "mapping".to_string(),
                    actual: other.kind_name().to_string(),
                });
            }
        };

        Ok(ResolvedConfig {
            root,
            defaults,
            provenance,
        })
    }

    fn merge_node(&self, base: &mut ConfigNode, overlay: &ConfigNode, path: &str) -> Result<()> {
        if let (Some(FieldType::NamedList { key }), ConfigNode::Mapping(entries)) =
            (self.schema.describe(path).map(|spec| &spec.ty), overlay)
        {
            return upsert_named(base, entries, key, path);
        }

        if let (ConfigNode::Mapping(base_map), ConfigNode::Mapping(overlay_map)) =
            (&mut *base, overlay)
        {
            for (key, value) in overlay_map {
                if value.is_null() {
                    base_map.shift_remove(key);
                    continue;
                }
                let slot = base_map.entry(key.clone()).or_insert(ConfigNode::Null);
                self.merge_node(slot, value, &join_path(path, key))?;
            }
            return Ok(());
        }

        match overlay {
            // Merge into a fresh mapping so nested nulls and named lists
            // are handled the same way as for existing keys
            ConfigNode::Mapping(_) => {
                *base = ConfigNode::mapping();
                self.merge_node(base, overlay, path)
            }
            other => {
                *base = other.clone();
                Ok(())
            }
        }
    }
}

/// Apply a `{name: entry}` override to a named list
fn upsert_named(base: &mut ConfigNode, entries: &Mapping, key: &str, path: &str) -> Result<()> {
    let mut items = match std::mem::take(base) {
        ConfigNode::Sequence(items) => items,
        ConfigNode::Null => Vec::new(),
        other => {
            return Err(CoreError::TypeMismatch {
                path: path.to_string(),
                expected: "sequence".to_string(),
                actual: other.kind_name().to_string(),
            });
        }
    };

    for (i, item) in items.iter().enumerate() {
        if item.get(key).and_then(ConfigNode::as_str).is_none() {
            return Err(CoreError::validation(
                format!("{}[{}].{}", path, i, key),
                "entry has no name; cannot merge by name",
            ));
        }
    }

    for (name, value) in entries {
        let position = items
            .iter()
            .position(|item| item.get(key).and_then(ConfigNode::as_str) == Some(name.as_str()));

        if value.is_null() {
            if let Some(pos) = position {
                items.remove(pos);
            }
            continue;
        }

        let entry = named_entry(key, name, value);
        match position {
            Some(pos) => items[pos] = entry,
            None => items.push(entry),
        }
    }

    *base = ConfigNode::Sequence(items);
    Ok(())
}

/// `NAME: value` becomes `{name: NAME, value: value}`; `NAME: {valueFrom: ..}`
/// becomes `{name: NAME, valueFrom: ..}`
fn named_entry(key: &str, name: &str, value: &ConfigNode) -> ConfigNode {
    let mut entry = Mapping::new();
    entry.insert(key.to_string(), ConfigNode::String(name.to_string()));

    match value {
        ConfigNode::Mapping(fields) => {
            for (field, v) in fields {
                if field != key && !v.is_null() {
                    entry.insert(field.clone(), v.clone());
                }
            }
        }
        scalar => {
            entry.insert("value".to_string(), scalar.clone());
        }
    }

    ConfigNode::Mapping(entry)
}

fn record_provenance(
    provenance: &mut IndexMap<String, String>,
    node: &ConfigNode,
    path: &str,
    layer: &str,
) {
    match node {
        ConfigNode::Mapping(map) if !map.is_empty() => {
            for (key, child) in map {
                record_provenance(provenance, child, &join_path(path, key), layer);
            }
        }
        ConfigNode::Null => {
            let nested = format!("{}.", path);
            provenance.retain(|p, _| p != path && !p.starts_with(&nested));
        }
        _ => {
            provenance.insert(path.to_string(), layer.to_string());
        }
    }
}

/// Emit an explicit `null` for every default that the resolved tree dropped,
/// so that re-merging over the defaults reproduces the tree
fn mark_removed(defaults: &ConfigNode, resolved: &mut Mapping) {
    let Some(default_map) = defaults.as_mapping() else {
        return;
    };
    for (key, default) in default_map {
        match resolved.get_mut(key) {
            None => {
                resolved.insert(key.clone(), ConfigNode::Null);
            }
            Some(ConfigNode::Mapping(child)) => mark_removed(default, child),
            Some(_) => {}
        }
    }
}

/// A merged and validated configuration tree
///
/// Equality compares the trees only, not where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    root: Mapping,
    defaults: ConfigNode,
    provenance: IndexMap<String, String>,
}

impl PartialEq for ResolvedConfig {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl ResolvedConfig {
    pub fn root(&self) -> &Mapping {
        &self.root
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&ConfigNode> {
        let (key, rest) = path.split_once('.').unwrap_or((path, ""));
        self.root.get(key).and_then(|node| node.get(rest))
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(ConfigNode::as_str)
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(ConfigNode::as_i64)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(ConfigNode::as_bool)
    }

    pub fn get_duration(&self, path: &str) -> Option<Duration> {
        self.get(path).and_then(parse_duration)
    }

    /// Name of the layer that last set `path`, or one of its ancestors
    pub fn origin_of(&self, path: &str) -> Option<&str> {
        let mut current = path;
        loop {
            if let Some(layer) = self.provenance.get(current) {
                return Some(layer);
            }
            match current.rsplit_once('.') {
                Some((parent, _)) => current = parent,
                None => return None,
            }
        }
    }

    /// Every leaf path with the layer that set it, in first-set order
    pub fn provenance(&self) -> impl Iterator<Item = (&str, &str)> {
        self.provenance.iter().map(|(p, l)| (p.as_str(), l.as_str()))
    }

    /// Turn the resolved tree back into a layer, for re-merging
    ///
    /// Defaults absent from the tree are emitted as `null` so that they stay
    /// removed when the layer is merged over the defaults again.
    pub fn into_layer(self, name: impl Into<String>) -> Layer {
        let mut root = self.root;
        mark_removed(&self.defaults, &mut root);
        Layer::from_mapping(name, LayerOrigin::Inline, root)
    }

    /// The resolved values as a YAML document
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// SHA-256 of the YAML rendering, hex-encoded
    pub fn checksum(&self) -> Result<String> {
        let digest = Sha256::digest(self.to_yaml()?.as_bytes());
        Ok(hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaMode;

    fn layer(name: &str, yaml: &str) -> Layer {
        Layer::from_yaml(name, LayerOrigin::Release, yaml).unwrap()
    }

    fn chart_values() -> Layer {
        Layer::from_yaml(
            "values.yaml",
            LayerOrigin::Defaults,
            r#"
replicaCount: 1
image:
  repository: nginx
service:
  port: 80
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_profile_and_release_override_defaults() {
        let schema = SchemaStore::builtin();
        let merger = OverlayMerger::new(&schema);

        let resolved = merger
            .merge(vec![
                chart_values(),
                layer("production", "replicaCount: 3\n"),
                layer("release", "image:\n  tag: v2\n"),
            ])
            .unwrap();

        assert_eq!(resolved.get_i64("replicaCount"), Some(3));
        assert_eq!(resolved.get_i64("service.port"), Some(80));
        assert_eq!(resolved.get_str("image.tag"), Some("v2"));
        assert_eq!(resolved.get_str("image.repository"), Some("nginx"));
        assert_eq!(resolved.get_str("image.pullPolicy"), Some("IfNotPresent"));
        assert_eq!(resolved.get_bool("autoscaling.enabled"), Some(false));
    }

    #[test]
    fn test_sequences_replaced_wholesale() {
        let schema = SchemaStore::builtin();
        let resolved = OverlayMerger::new(&schema)
            .merge(vec![
                chart_values(),
                layer("base", "service:\n  ports:\n    - {name: http, port: 8080}\n"),
                layer("override", "service:\n  ports:\n    - {name: grpc, port: 9090}\n"),
            ])
            .unwrap();

        let ports = resolved.get("service.ports").unwrap().as_sequence().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].get("name").and_then(ConfigNode::as_str), Some("grpc"));
        assert_eq!(ports[0].get("port").and_then(ConfigNode::as_i64), Some(9090));
    }

    #[test]
    fn test_env_mapping_override_upserts_by_name() {
        let schema = SchemaStore::builtin();
        let resolved = OverlayMerger::new(&schema)
            .merge(vec![
                chart_values(),
                layer(
                    "base",
                    r#"
env:
  - name: A
    value: "1"
  - name: C
    value: "3"
"#,
                ),
                layer(
                    "override",
                    r#"
env:
  B: "2"
  A: overridden
  C: null
  SECRET:
    valueFrom:
      secretKeyRef: {name: app, key: token}
"#,
                ),
            ])
            .unwrap();

        let env = resolved.get("env").unwrap().as_sequence().unwrap();
        let names: Vec<&str> = env
            .iter()
            .filter_map(|e| e.get("name").and_then(ConfigNode::as_str))
            .collect();
        assert_eq!(names, vec!["A", "B", "SECRET"]);
        assert_eq!(env[0].get("value").and_then(ConfigNode::as_str), Some("overridden"));
        assert_eq!(env[1].get("value").and_then(ConfigNode::as_str), Some("2"));
        assert_eq!(
            env[2].get("valueFrom.secretKeyRef.key").and_then(ConfigNode::as_str),
            Some("token")
        );
    }

    #[test]
    fn test_env_sequence_override_replaces() {
        let schema = SchemaStore::builtin();
        let resolved = OverlayMerger::new(&schema)
            .merge(vec![
                chart_values(),
                layer("base", "env:\n  - {name: A, value: '1'}\n"),
                layer("override", "env:\n  - {name: B, value: '2'}\n"),
            ])
            .unwrap();

        let env = resolved.get("env").unwrap().as_sequence().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].get("name").and_then(ConfigNode::as_str), Some("B"));
    }

    #[test]
    fn test_env_upsert_rejects_unnamed_entries() {
        let schema = SchemaStore::builtin();
        let err = OverlayMerger::new(&schema)
            .merge(vec![
                chart_values(),
                layer("base", "env:\n  - {value: '1'}\n"),
                layer("override", "env:\n  B: '2'\n"),
            ])
            .unwrap_err();

        assert_eq!(err.path(), Some("env[0].name"));
    }

    #[test]
    fn test_null_removes_mapping_key() {
        let schema = SchemaStore::builtin();
        let resolved = OverlayMerger::new(&schema)
            .merge(vec![
                chart_values(),
                layer("base", "podAnnotations:\n  a: '1'\n  b: '2'\n"),
                layer("override", "podAnnotations:\n  a: null\nlivenessProbe: null\n"),
            ])
            .unwrap();

        let annotations = resolved.get("podAnnotations").unwrap().as_mapping().unwrap();
        assert!(!annotations.contains_key("a"));
        assert!(annotations.contains_key("b"));
        assert!(resolved.get("livenessProbe").is_none());
        assert!(resolved.get("readinessProbe").is_some());
    }

    #[test]
    fn test_unknown_key_strict_vs_permissive() {
        let extra = || layer("release", "featureFlags:\n  beta: true\n");

        let strict = SchemaStore::builtin();
        let err = OverlayMerger::new(&strict)
            .merge(vec![chart_values(), extra()])
            .unwrap_err();
        match err {
            CoreError::UnknownKey { path, layer, .. } => {
                assert_eq!(path, "featureFlags");
                assert_eq!(layer.as_deref(), Some("release"));
            }
            other => panic!("expected UnknownKey, got {other:?}"),
        }

        let permissive = SchemaStore::builtin().with_mode(SchemaMode::Permissive);
        let resolved = OverlayMerger::new(&permissive)
            .merge(vec![chart_values(), extra()])
            .unwrap();
        assert_eq!(resolved.get_bool("featureFlags.beta"), Some(true));
    }

    #[test]
    fn test_type_mismatch_aborts_merge() {
        let schema = SchemaStore::builtin();
        let err = OverlayMerger::new(&schema)
            .merge(vec![chart_values(), layer("release", "replicaCount: three\n")])
            .unwrap_err();

        assert!(matches!(err, CoreError::TypeMismatch { ref path, .. } if path == "replicaCount"));
    }

    #[test]
    fn test_missing_required_field() {
        let schema = SchemaStore::builtin();
        let err = OverlayMerger::new(&schema)
            .merge(vec![layer("release", "replicaCount: 2\n")])
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(err.path(), Some("image.repository"));
    }

    #[test]
    fn test_nulled_parent_still_requires_children() {
        let schema = SchemaStore::builtin();
        let merger = OverlayMerger::new(&schema);

        let err = merger
            .merge(vec![chart_values(), layer("release", "image: null\n")])
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(err.path(), Some("image.repository"));

        let set = Layer::from_set_values(&["image=null".to_string()]).unwrap();
        let err = merger.merge(vec![chart_values(), set]).unwrap_err();
        assert_eq!(err.path(), Some("image.repository"));
    }

    #[test]
    fn test_enum_value_outside_allowed_set() {
        let schema = SchemaStore::builtin();
        let err = OverlayMerger::new(&schema)
            .merge(vec![chart_values(), layer("release", "service:\n  type: ExternalName\n")])
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(err.path(), Some("service.type"));
    }

    #[test]
    fn test_autoscaling_bounds_checked_only_when_enabled() {
        let schema = SchemaStore::builtin();
        let merger = OverlayMerger::new(&schema);
        let bounds = "autoscaling:\n  minReplicas: 10\n  maxReplicas: 2\n";

        merger
            .merge(vec![chart_values(), layer("release", bounds)])
            .unwrap();

        let err = merger
            .merge(vec![
                chart_values(),
                layer("release", bounds),
                layer("enable", "autoscaling:\n  enabled: true\n"),
            ])
            .unwrap_err();
        assert_eq!(err.path(), Some("autoscaling.minReplicas"));
    }

    #[test]
    fn test_merge_is_associative() {
        let schema = SchemaStore::builtin();
        let merger = OverlayMerger::new(&schema);

        let a = chart_values();
        let b = layer(
            "profile",
            r#"
replicaCount: 3
livenessProbe: null
env:
  - {name: A, value: "1"}
podAnnotations:
  team: web
"#,
        );
        let c = layer(
            "release",
            r#"
image:
  tag: v2
env:
  B: "2"
podAnnotations:
  team: null
"#,
        );

        let all = merger.merge(vec![a.clone(), b.clone(), c.clone()]).unwrap();
        let partial = merger.merge(vec![a, b]).unwrap().into_layer("partial");
        let stepwise = merger.merge(vec![partial, c]).unwrap();

        assert_eq!(all, stepwise);
        assert!(stepwise.get("livenessProbe").is_none());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let schema = SchemaStore::builtin();
        let merger = OverlayMerger::new(&schema);
        let layers = vec![
            chart_values(),
            layer("profile", "readinessProbe: null\nenv:\n  A: '1'\n"),
        ];

        let resolved = merger.merge(layers).unwrap();
        let again = merger
            .merge(vec![
                resolved.clone().into_layer("first"),
                resolved.clone().into_layer("second"),
            ])
            .unwrap();

        assert_eq!(again, resolved);
    }

    #[test]
    fn test_provenance_tracks_last_writer() {
        let schema = SchemaStore::builtin();
        let resolved = OverlayMerger::new(&schema)
            .merge(vec![
                chart_values(),
                layer("production", "replicaCount: 3\n"),
                layer("release", "image:\n  tag: v2\n"),
            ])
            .unwrap();

        assert_eq!(resolved.origin_of("replicaCount"), Some("production"));
        assert_eq!(resolved.origin_of("image.tag"), Some("release"));
        assert_eq!(resolved.origin_of("image.repository"), Some("values.yaml"));
        assert_eq!(resolved.origin_of("service.type"), Some("defaults"));
        assert_eq!(resolved.origin_of("livenessProbe.httpGet.path"), Some("defaults"));
    }

    #[test]
    fn test_duration_accessor_and_checksum() {
        let schema = SchemaStore::builtin();
        let merger = OverlayMerger::new(&schema);
        let resolved = merger
            .merge(vec![chart_values(), layer("release", "terminationGracePeriod: 45s\n")])
            .unwrap();

        assert_eq!(
            resolved.get_duration("terminationGracePeriod"),
            Some(Duration::from_secs(45))
        );

        let same = merger
            .merge(vec![chart_values(), layer("release", "terminationGracePeriod: 45s\n")])
            .unwrap();
        assert_eq!(resolved.checksum().unwrap(), same.checksum().unwrap());
        assert_eq!(resolved.checksum().unwrap().len(), 64);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let schema = SchemaStore::builtin();
        let err = OverlayMerger::new(&schema)
            .merge(vec![chart_values(), layer("release", "terminationGracePeriod: soon\n")])
            .unwrap_err();
        assert_eq!(err.path(), Some("terminationGracePeriod"));
    }
}
