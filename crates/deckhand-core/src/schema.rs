//! Schema store: recognized keys, their types and defaults
//!
//! Keys are addressed by dotted paths (`service.port`). Items of a sequence
//! are described under the sequence path suffixed with `[]`, so
//! `service.ports[].name` is the `name` of every element of `service.ports`.
//!
//! Extension schemas use a nested YAML format:
//!
//! ```yaml
//! schemaVersion: deckhand/v1
//! properties:
//!   metrics:
//!     type: object
//!     properties:
//!       enabled:
//!         type: boolean
//!         default: false
//! ```

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::layer::{Layer, LayerOrigin};
use crate::node::{join_path, set_path, ConfigNode, Mapping};

/// Suffix marking the item schema of a sequence
pub const ITEMS: &str = "[]";

/// Maximum edit distance for "did you mean" suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Declared type of a configuration field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Humantime string ("30s", "2m") or whole seconds
    Duration,
    /// String restricted to a fixed set
    Enum(Vec<String>),
    /// Integer or string (Kubernetes IntOrString)
    IntOrString,
    /// Any scalar: string, number or boolean
    Scalar,
    /// Ordered sequence, replaced wholesale on merge
    Sequence,
    /// Open mapping: described children are validated, others pass through
    Mapping,
    /// Closed mapping: every child must be described
    Object,
    /// Sequence of entries identified by `key`; layers may override it
    /// with a `{key: entry}` mapping that upserts entries
    NamedList { key: String },
    /// Anything, not inspected
    Any,
}

impl FieldType {
    /// Whether undescribed children are accepted under this type
    fn is_open(&self) -> bool {
        matches!(
            self,
            FieldType::Mapping | FieldType::Any | FieldType::NamedList { .. }
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Duration => write!(f, "duration"),
            Self::Enum(values) => write!(f, "one of [{}]", values.join(", ")),
            Self::IntOrString => write!(f, "integer or string"),
            Self::Scalar => write!(f, "scalar"),
            Self::Sequence => write!(f, "sequence"),
            Self::Mapping | Self::Object => write!(f, "mapping"),
            Self::NamedList { key } => write!(f, "sequence of entries keyed by '{}'", key),
            Self::Any => write!(f, "any"),
        }
    }
}

/// Description of a single configuration key
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub ty: FieldType,
    pub default: Option<ConfigNode>,
    pub required: bool,
    pub description: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FieldSpec {
    pub fn new(ty: FieldType) -> Self {
        Self {
            ty,
            default: None,
            required: false,
            description: None,
            min: None,
            max: None,
        }
    }

    pub fn default_value(mut self, value: impl Into<ConfigNode>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Allowed values, for enumerated fields
    pub fn allowed_values(&self) -> Option<&[String]> {
        match &self.ty {
            FieldType::Enum(values) => Some(values),
            _ => None,
        }
    }
}

/// Policy for keys that the store does not describe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaMode {
    /// Unknown keys fail with `UnknownKey`
    #[default]
    Strict,
    /// Unknown keys pass through untouched
    Permissive,
}

/// Cross-field constraint checked on the resolved tree
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// `lower <= upper`, optionally only when the boolean at `when` is true
    Ordered {
        lower: String,
        upper: String,
        when: Option<String>,
    },
}

impl Rule {
    fn check(&self, root: &ConfigNode) -> Result<()> {
        match self {
            Rule::Ordered { lower, upper, when } => {
                if let Some(flag) = when {
                    if root.get(flag).and_then(ConfigNode::as_bool) != Some(true) {
                        return Ok(());
                    }
                }
                let lo = root.get(lower).and_then(ConfigNode::as_f64);
                let hi = root.get(upper).and_then(ConfigNode::as_f64);
                match (lo, hi) {
                    (Some(lo), Some(hi)) if lo > hi => Err(CoreError::validation(
                        lower.clone(),
                        format!("must be less than or equal to {} ({} > {})", upper, lo, hi),
                    )),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// What a tree walk checks
#[derive(Clone, Copy)]
struct WalkPolicy<'a> {
    unknown: bool,
    types: bool,
    required: bool,
    layer: Option<&'a str>,
}

/// Registry of recognized configuration keys
#[derive(Debug, Clone, Default)]
pub struct SchemaStore {
    fields: IndexMap<String, FieldSpec>,
    rules: Vec<Rule>,
    mode: SchemaMode,
}

impl SchemaStore {
    /// An empty store
    pub fn new(mode: SchemaMode) -> Self {
        Self {
            fields: IndexMap::new(),
            rules: Vec::new(),
            mode,
        }
    }

    /// Switch the unknown-key policy
    pub fn with_mode(mut self, mode: SchemaMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> SchemaMode {
        self.mode
    }

    /// Describe a key; later definitions of the same path replace earlier ones
    pub fn define(&mut self, path: impl Into<String>, spec: FieldSpec) -> &mut Self {
        self.fields.insert(path.into(), spec);
        self
    }

    pub fn add_rule(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Look up a key by dotted path
    pub fn describe(&self, path: &str) -> Option<&FieldSpec> {
        self.fields.get(path)
    }

    /// All described paths, in definition order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Check one value against the key it would be stored under
    ///
    /// Checks the key is known (strict mode) and that the value and all of
    /// its described descendants have the declared types. Required fields
    /// are not checked; that only makes sense on a resolved tree.
    pub fn validate(&self, path: &str, value: &ConfigNode) -> Result<()> {
        let policy = WalkPolicy {
            unknown: self.mode == SchemaMode::Strict,
            types: true,
            required: false,
            layer: None,
        };

        if self.describe(path).is_none() {
            if self.parent_is_open(path) || !policy.unknown {
                return Ok(());
            }
            return Err(self.unknown_key(path, path, None));
        }

        self.walk(value, path, path, policy)
    }

    /// Reject keys the store does not describe (strict mode only)
    pub fn check_keys(&self, layer: &Layer) -> Result<()> {
        if self.mode == SchemaMode::Permissive {
            return Ok(());
        }
        let policy = WalkPolicy {
            unknown: true,
            types: false,
            required: false,
            layer: Some(layer.name()),
        };
        self.walk(layer.root(), "", "", policy)
    }

    /// Full validation of a merged tree: types, enums, ranges, required
    /// fields, unknown keys (strict mode) and cross-field rules
    pub fn validate_resolved(&self, root: &ConfigNode) -> Result<()> {
        let policy = WalkPolicy {
            unknown: self.mode == SchemaMode::Strict,
            types: true,
            required: true,
            layer: None,
        };
        self.walk(root, "", "", policy)?;

        for rule in &self.rules {
            rule.check(root)?;
        }
        Ok(())
    }

    /// The defaults of every described key, as the lowest-priority layer
    pub fn defaults_layer(&self) -> Layer {
        let mut root = Mapping::new();
        for (path, spec) in &self.fields {
            if path.contains(ITEMS) {
                continue;
            }
            if let Some(default) = &spec.default {
                set_path(&mut root, path, default.clone());
            }
        }
        Layer::from_mapping("defaults", LayerOrigin::Defaults, root)
    }

    /// Add or override keys from an extension schema document
    pub fn extend_from_yaml(&mut self, yaml: &str) -> Result<()> {
        let doc: SchemaDocument = serde_yaml::from_str(yaml)?;
        if !doc.schema_version.starts_with("deckhand/") {
            return Err(CoreError::InvalidSchema {
                message: format!(
                    "Unsupported schemaVersion '{}'. Expected: deckhand/v1",
                    doc.schema_version
                ),
            });
        }

        let mut flat = Vec::new();
        flatten_properties("", &doc.properties, &mut flat)?;
        for (path, spec) in flat {
            self.define(path, spec);
        }
        Ok(())
    }

    /// Load an extension schema file
    pub fn extend_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let content = std::fs::read_to_string(path.as_ref())?;
        self.extend_from_yaml(&content)
    }

    /// Export as a draft-07 JSON Schema
    pub fn to_json_schema(&self) -> JsonValue {
        let mut schema = self.object_schema("", &FieldType::Object);
        if let JsonValue::Object(obj) = &mut schema {
            obj.insert(
                "$schema".into(),
                JsonValue::String("http://json-schema.org/draft-07/schema#".into()),
            );
        }
        schema
    }

    // =========================================================================
    // Tree walking
    // =========================================================================

    fn walk(
        &self,
        node: &ConfigNode,
        schema_path: &str,
        display_path: &str,
        policy: WalkPolicy<'_>,
    ) -> Result<()> {
        let ty = match self.describe(schema_path) {
            Some(spec) => {
                if policy.types && !node.is_null() {
                    check_type(spec, node, display_path)?;
                }
                &spec.ty
            }
            None => &FieldType::Object,
        };

        match (node, ty) {
            (ConfigNode::Mapping(map), FieldType::Object | FieldType::Mapping) => {
                for (key, child) in map {
                    let child_schema = join_path(schema_path, key);
                    let child_display = join_path(display_path, key);

                    if self.describe(&child_schema).is_some() {
                        self.walk(child, &child_schema, &child_display, policy)?;
                    } else if !ty.is_open() && policy.unknown {
                        return Err(self.unknown_key(&child_schema, &child_display, policy.layer));
                    }
                }

                if policy.required {
                    self.check_required(map, schema_path, display_path)?;
                }
            }
            (ConfigNode::Sequence(items), _) => {
                let item_schema = format!("{}{}", schema_path, ITEMS);
                if self.describe(&item_schema).is_some() {
                    for (i, item) in items.iter().enumerate() {
                        let item_display = format!("{}[{}]", display_path, i);
                        self.walk(item, &item_schema, &item_display, policy)?;
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Required children of `schema_path` must be set. An absent object
    /// child is checked as an empty mapping, so a parent removed by `null`
    /// still reports its required descendants.
    fn check_required(&self, map: &Mapping, schema_path: &str, display_path: &str) -> Result<()> {
        for (name, spec) in self.children_of(schema_path) {
            if map.get(name).is_some_and(|child| !child.is_null()) {
                continue;
            }
            let child_display = join_path(display_path, name);
            if spec.required {
                return Err(CoreError::validation(child_display, "required field is missing"));
            }
            if matches!(spec.ty, FieldType::Object | FieldType::Mapping) {
                let child_schema = join_path(schema_path, name);
                self.check_required(&Mapping::new(), &child_schema, &child_display)?;
            }
        }
        Ok(())
    }

    /// Direct children of a described path (the root is `""`)
    fn children_of<'a>(
        &'a self,
        parent: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a FieldSpec)> + 'a {
        self.fields.iter().filter_map(move |(path, spec)| {
            let rest = if parent.is_empty() {
                Some(path.as_str())
            } else {
                path.strip_prefix(parent).and_then(|r| r.strip_prefix('.'))
            };
            rest.filter(|r| !r.contains('.') && !r.ends_with(ITEMS))
                .map(|r| (r, spec))
        })
    }

    fn parent_is_open(&self, path: &str) -> bool {
        let parent = match path.rsplit_once('.') {
            Some((parent, _)) => parent,
            None => return false,
        };
        match self.describe(parent) {
            Some(spec) => spec.ty.is_open(),
            None => self.parent_is_open(parent),
        }
    }

    fn unknown_key(&self, schema_path: &str, display_path: &str, layer: Option<&str>) -> CoreError {
        let (parent, key) = match schema_path.rsplit_once('.') {
            Some((parent, key)) => (parent, key),
            None => ("", schema_path),
        };

        let suggestion = self
            .children_of(parent)
            .map(|(name, _)| (name, strsim::levenshtein(key, name)))
            .filter(|(_, distance)| *distance > 0 && *distance <= MAX_SUGGESTION_DISTANCE)
            .min_by_key(|(_, distance)| *distance)
            .map(|(name, _)| match display_path.rsplit_once('.') {
                Some((display_parent, _)) => join_path(display_parent, name),
                None => name.to_string(),
            });

        CoreError::UnknownKey {
            path: display_path.to_string(),
            layer: layer.map(str::to_string),
            suggestion,
        }
    }

    // =========================================================================
    // JSON Schema export
    // =========================================================================

    fn field_schema(&self, path: &str, spec: &FieldSpec) -> JsonValue {
        let mut json = match &spec.ty {
            FieldType::Object | FieldType::Mapping => self.object_schema(path, &spec.ty),
            FieldType::Sequence | FieldType::NamedList { .. } => {
                let mut arr = serde_json::Map::new();
                let type_value = if matches!(spec.ty, FieldType::NamedList { .. }) {
                    serde_json::json!(["array", "object"])
                } else {
                    JsonValue::String("array".into())
                };
                arr.insert("type".into(), type_value);
                let item_path = format!("{}{}", path, ITEMS);
                if let Some(item) = self.describe(&item_path) {
                    arr.insert("items".into(), self.field_schema(&item_path, item));
                }
                JsonValue::Object(arr)
            }
            other => scalar_schema(other),
        };

        if let JsonValue::Object(obj) = &mut json {
            if let Some(desc) = &spec.description {
                obj.insert("description".into(), JsonValue::String(desc.clone()));
            }
            if let Some(default) = &spec.default {
                obj.insert("default".into(), default.to_json());
            }
            if let Some(min) = spec.min {
                obj.insert("minimum".into(), JsonValue::from(min));
            }
            if let Some(max) = spec.max {
                obj.insert("maximum".into(), JsonValue::from(max));
            }
        }
        json
    }

    fn object_schema(&self, path: &str, ty: &FieldType) -> JsonValue {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for (name, spec) in self.children_of(path) {
            properties.insert(name.to_string(), self.field_schema(&join_path(path, name), spec));
            if spec.required {
                required.push(JsonValue::String(name.to_string()));
            }
        }

        let additional = ty.is_open() || self.mode == SchemaMode::Permissive;

        let mut obj = serde_json::Map::new();
        obj.insert("type".into(), JsonValue::String("object".into()));
        obj.insert("properties".into(), JsonValue::Object(properties));
        if !required.is_empty() {
            obj.insert("required".into(), JsonValue::Array(required));
        }
        obj.insert("additionalProperties".into(), JsonValue::Bool(additional));
        JsonValue::Object(obj)
    }
}

fn scalar_schema(ty: &FieldType) -> JsonValue {
    match ty {
        FieldType::String => serde_json::json!({ "type": "string" }),
        FieldType::Integer => serde_json::json!({ "type": "integer" }),
        FieldType::Number => serde_json::json!({ "type": "number" }),
        FieldType::Boolean => serde_json::json!({ "type": "boolean" }),
        FieldType::Duration => serde_json::json!({ "type": ["string", "integer"] }),
        FieldType::Enum(values) => serde_json::json!({ "type": "string", "enum": values }),
        FieldType::IntOrString => serde_json::json!({ "type": ["integer", "string"] }),
        FieldType::Scalar => {
            serde_json::json!({ "type": ["string", "integer", "number", "boolean"] })
        }
        _ => serde_json::json!({}),
    }
}

/// Parse a duration value: humantime string or whole seconds
pub fn parse_duration(node: &ConfigNode) -> Option<Duration> {
    match node {
        ConfigNode::Integer(secs) if *secs >= 0 => Some(Duration::from_secs(*secs as u64)),
        ConfigNode::String(s) => humantime_serde::re::humantime::parse_duration(s).ok(),
        _ => None,
    }
}

fn check_type(spec: &FieldSpec, node: &ConfigNode, path: &str) -> Result<()> {
    let matches = match (&spec.ty, node) {
        (FieldType::String, ConfigNode::String(_)) => true,
        (FieldType::Integer, ConfigNode::Integer(_)) => true,
        (FieldType::Number, ConfigNode::Integer(_) | ConfigNode::Float(_)) => true,
        (FieldType::Boolean, ConfigNode::Bool(_)) => true,
        (FieldType::Duration, ConfigNode::Integer(_) | ConfigNode::String(_)) => {
            if parse_duration(node).is_none() {
                return Err(CoreError::validation(
                    path,
                    format!("invalid duration {:?}", node.to_json()),
                ));
            }
            true
        }
        (FieldType::Enum(allowed), ConfigNode::String(value)) => {
            if !allowed.contains(value) {
                return Err(CoreError::validation(
                    path,
                    format!("'{}' is not one of [{}]", value, allowed.join(", ")),
                ));
            }
            true
        }
        (FieldType::IntOrString, ConfigNode::Integer(_) | ConfigNode::String(_)) => true,
        (
            FieldType::Scalar,
            ConfigNode::String(_) | ConfigNode::Integer(_) | ConfigNode::Float(_) | ConfigNode::Bool(_),
        ) => true,
        (FieldType::Sequence, ConfigNode::Sequence(_)) => true,
        (FieldType::Mapping | FieldType::Object, ConfigNode::Mapping(_)) => true,
        (FieldType::NamedList { .. }, ConfigNode::Sequence(_) | ConfigNode::Mapping(_)) => true,
        (FieldType::Any, _) => true,
        _ => false,
    };

    if !matches {
        return Err(CoreError::TypeMismatch {
            path: path.to_string(),
            expected: spec.ty.to_string(),
            actual: node.kind_name().to_string(),
        });
    }

    if let Some(value) = node.as_f64() {
        if let Some(min) = spec.min.filter(|min| value < *min) {
            return Err(CoreError::validation(
                path,
                format!("{} is less than the minimum of {}", value, min),
            ));
        }
        if let Some(max) = spec.max.filter(|max| value > *max) {
            return Err(CoreError::validation(
                path,
                format!("{} is greater than the maximum of {}", value, max),
            ));
        }
    }

    Ok(())
}

// =============================================================================
// Extension schema documents
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaDocument {
    #[serde(default = "default_schema_version")]
    schema_version: String,

    #[serde(default)]
    properties: IndexMap<String, PropertyDoc>,
}

fn default_schema_version() -> String {
    "deckhand/v1".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
enum PropertyKind {
    String,
    Integer,
    Number,
    Boolean,
    Duration,
    IntOrString,
    Scalar,
    Array,
    Object,
    Map,
    NamedList,
    Any,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyDoc {
    #[serde(rename = "type")]
    kind: PropertyKind,

    #[serde(default)]
    description: Option<String>,

    #[serde(default)]
    default: Option<ConfigNode>,

    #[serde(default)]
    required: bool,

    #[serde(default, rename = "enum")]
    enum_values: Option<Vec<String>>,

    #[serde(default)]
    min: Option<f64>,

    #[serde(default)]
    max: Option<f64>,

    #[serde(default)]
    properties: Option<IndexMap<String, PropertyDoc>>,

    #[serde(default)]
    items: Option<Box<PropertyDoc>>,

    /// Identity key for named lists
    #[serde(default)]
    key: Option<String>,
}

fn flatten_properties(
    prefix: &str,
    props: &IndexMap<String, PropertyDoc>,
    out: &mut Vec<(String, FieldSpec)>,
) -> Result<()> {
    for (name, prop) in props {
        if name.contains('.') || name.contains(ITEMS) {
            return Err(CoreError::InvalidSchema {
                message: format!("property name '{}' may not contain '.' or '[]'", name),
            });
        }
        flatten_property(join_path(prefix, name), prop, out)?;
    }
    Ok(())
}

fn flatten_property(path: String, prop: &PropertyDoc, out: &mut Vec<(String, FieldSpec)>) -> Result<()> {
    let ty = match (&prop.enum_values, prop.kind) {
        (Some(values), _) => FieldType::Enum(values.clone()),
        (None, PropertyKind::String) => FieldType::String,
        (None, PropertyKind::Integer) => FieldType::Integer,
        (None, PropertyKind::Number) => FieldType::Number,
        (None, PropertyKind::Boolean) => FieldType::Boolean,
        (None, PropertyKind::Duration) => FieldType::Duration,
        (None, PropertyKind::IntOrString) => FieldType::IntOrString,
        (None, PropertyKind::Scalar) => FieldType::Scalar,
        (None, PropertyKind::Array) => FieldType::Sequence,
        (None, PropertyKind::Object) if prop.properties.is_some() => FieldType::Object,
        (None, PropertyKind::Object | PropertyKind::Map) => FieldType::Mapping,
        (None, PropertyKind::NamedList) => FieldType::NamedList {
            key: prop.key.clone().unwrap_or_else(|| "name".to_string()),
        },
        (None, PropertyKind::Any) => FieldType::Any,
    };

    let spec = FieldSpec {
        ty,
        default: prop.default.clone(),
        required: prop.required,
        description: prop.description.clone(),
        min: prop.min,
        max: prop.max,
    };
    out.push((path.clone(), spec));

    if let Some(nested) = &prop.properties {
        flatten_properties(&path, nested, out)?;
    }
    if let Some(items) = &prop.items {
        flatten_property(format!("{}{}", path, ITEMS), items, out)?;
    }
    Ok(())
}
