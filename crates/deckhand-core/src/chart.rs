//! Chart definition and loading

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::layer::{Layer, LayerOrigin};
use crate::schema::SchemaStore;

/// Chart metadata, read from `chart.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// API version (deckhand/v1)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    /// Version of the packaged application; the image tag falls back to it
    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_api_version() -> String {
    "deckhand/v1".to_string()
}

impl ChartMetadata {
    /// `name-version`, used in the chart label
    pub fn chart_label(&self) -> String {
        format!("{}-{}", self.name, self.version).replace('+', "_")
    }
}

/// A chart directory with resolved paths
#[derive(Debug, Clone)]
pub struct LoadedChart {
    pub metadata: ChartMetadata,

    /// Root directory of the chart
    pub root: PathBuf,

    /// Chart defaults (values.yaml)
    pub values_path: PathBuf,

    /// Extension schema, if present
    pub schema_path: Option<PathBuf>,

    /// Environment profiles directory, if present
    pub environments_dir: Option<PathBuf>,
}

impl LoadedChart {
    /// Load a chart from a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(CoreError::ChartNotFound {
                path: root.display().to_string(),
            });
        }

        let chart_file = root.join("chart.yaml");
        if !chart_file.exists() {
            return Err(CoreError::InvalidChart {
                message: format!("chart.yaml not found in {}", root.display()),
            });
        }

        let content = std::fs::read_to_string(&chart_file)?;
        let metadata: ChartMetadata = serde_yaml::from_str(&content)?;

        if metadata.api_version != "deckhand/v1" {
            return Err(CoreError::InvalidChart {
                message: format!(
                    "Unsupported API version: {}. Expected: deckhand/v1",
                    metadata.api_version
                ),
            });
        }
        if metadata.name.is_empty() {
            return Err(CoreError::InvalidChart {
                message: "name must not be empty".to_string(),
            });
        }

        let schema_path = Some(root.join("values.schema.yaml")).filter(|p| p.exists());
        let environments_dir = Some(root.join("environments")).filter(|p| p.is_dir());

        tracing::debug!(
            chart = %metadata.name,
            version = %metadata.version,
            "loaded chart"
        );

        Ok(Self {
            metadata,
            values_path: root.join("values.yaml"),
            root,
            schema_path,
            environments_dir,
        })
    }

    /// The chart's values.yaml as the lowest explicit layer
    ///
    /// A chart without values.yaml contributes an empty layer.
    pub fn defaults_layer(&self) -> Result<Layer> {
        if !self.values_path.exists() {
            return Ok(Layer::empty("values.yaml", LayerOrigin::Defaults));
        }
        let content = std::fs::read_to_string(&self.values_path)?;
        Layer::from_yaml("values.yaml", LayerOrigin::Defaults, &content)
    }

    /// Built-in schema, extended by the chart's values.schema.yaml
    pub fn schema(&self) -> Result<SchemaStore> {
        let mut schema = SchemaStore::builtin();
        if let Some(path) = &self.schema_path {
            schema.extend_from_file(path)?;
        }
        Ok(schema)
    }

    /// Names of the environment profiles, sorted
    pub fn environments(&self) -> Result<Vec<String>> {
        let Some(dir) = &self.environments_dir else {
            return Ok(Vec::new());
        };

        let mut names = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_yaml = path
                .extension()
                .map(|ext| matches!(ext.to_string_lossy().as_ref(), "yaml" | "yml"))
                .unwrap_or(false);
            if let (true, Some(stem)) = (is_yaml, path.file_stem()) {
                names.push(stem.to_string_lossy().into_owned());
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Load a named environment profile
    pub fn environment_layer(&self, name: &str) -> Result<Layer> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(CoreError::InvalidChart {
                message: format!("invalid environment name '{}'", name),
            });
        }

        let path = self
            .environments_dir
            .as_ref()
            .into_iter()
            .flat_map(|dir| [dir.join(format!("{name}.yaml")), dir.join(format!("{name}.yml"))])
            .find(|p| p.exists())
            .ok_or_else(|| CoreError::InvalidChart {
                message: format!(
                    "environment '{}' not found (available: {})",
                    name,
                    self.environments().unwrap_or_default().join(", ")
                ),
            })?;

        let content = std::fs::read_to_string(&path)?;
        Layer::from_yaml(name, LayerOrigin::Profile, &content)
    }
}

/// Custom serde for semver::Version
mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}
