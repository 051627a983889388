//! Resource names and standard labels

use deckhand_core::{ChartMetadata, ResolvedConfig};
use std::collections::BTreeMap;

/// Kubernetes limits most names (DNS-1123 labels) to 63 characters
pub const MAX_NAME_LEN: usize = 63;

/// Value of the `app.kubernetes.io/managed-by` label
pub const MANAGED_BY: &str = "Deckhand";

/// The release being rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    pub namespace: String,
}

impl Release {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// Truncate to `max` characters and drop trailing dashes
pub fn truncate_name(name: &str, max: usize) -> String {
    let truncated: String = name.chars().take(max).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Names and labels shared by every resource of a release
#[derive(Debug, Clone)]
pub struct Naming {
    name: String,
    fullname: String,
    chart_label: String,
    instance: String,
    app_version: Option<String>,
}

impl Naming {
    pub fn new(chart: &ChartMetadata, release: &Release, config: &ResolvedConfig) -> Self {
        let name_override = config.get_str("nameOverride").filter(|s| !s.is_empty());
        let base = name_override.unwrap_or(&chart.name);
        let name = truncate_name(base, MAX_NAME_LEN);

        let fullname = match config.get_str("fullnameOverride").filter(|s| !s.is_empty()) {
            Some(full) => truncate_name(full, MAX_NAME_LEN),
            None if release.name.contains(base) => truncate_name(&release.name, MAX_NAME_LEN),
            None => truncate_name(&format!("{}-{}", release.name, base), MAX_NAME_LEN),
        };

        Self {
            name,
            fullname,
            chart_label: truncate_name(&chart.chart_label(), MAX_NAME_LEN),
            instance: release.name.clone(),
            app_version: chart.app_version.clone(),
        }
    }

    /// Short application name (`app.kubernetes.io/name`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the release's resources
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app.kubernetes.io/name".to_string(), self.name.clone()),
            ("app.kubernetes.io/instance".to_string(), self.instance.clone()),
        ])
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert("helm.sh/chart".to_string(), self.chart_label.clone());
        if let Some(version) = &self.app_version {
            labels.insert("app.kubernetes.io/version".to_string(), version.clone());
        }
        labels.insert("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string());
        labels
    }

    /// Service account the pods run as
    pub fn service_account_name(&self, config: &ResolvedConfig) -> String {
        let explicit = config
            .get_str("serviceAccount.name")
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if config.get_bool("serviceAccount.create").unwrap_or(false) {
            explicit.unwrap_or_else(|| self.fullname.clone())
        } else {
            explicit.unwrap_or_else(|| "default".to_string())
        }
    }
}
