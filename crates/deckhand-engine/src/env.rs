//! Container environment assembly

use deckhand_core::{ConfigNode, ResolvedConfig};
use k8s_openapi::api::core::v1::{EnvFromSource, EnvVar, EnvVarSource};
use std::fmt;

use crate::error::{EngineError, Result};
use crate::project::project;

/// Where one piece of the container environment comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvSource {
    /// An inline `env` entry
    Var(String),
    /// An `envFrom` ConfigMap, with its optional prefix
    ConfigMap { name: String, prefix: Option<String> },
    /// An `envFrom` Secret, with its optional prefix
    Secret { name: String, prefix: Option<String> },
}

impl fmt::Display for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => write!(f, "env:{}", name),
            Self::ConfigMap { name, prefix } => {
                write!(f, "configMap:{}", name)?;
                prefix.iter().try_for_each(|p| write!(f, " (prefix {})", p))
            }
            Self::Secret { name, prefix } => {
                write!(f, "secret:{}", name)?;
                prefix.iter().try_for_each(|p| write!(f, " (prefix {})", p))
            }
        }
    }
}

/// The container environment: inline `env` entries in input order, then
/// `envFrom` sources in input order
///
/// Later entries shadow earlier ones at runtime, so this order is part of
/// the rendered output's meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvAssembly {
    pub env: Vec<EnvVar>,
    pub env_from: Vec<EnvFromSource>,
}

impl EnvAssembly {
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let env = sequence(config, "env")
            .iter()
            .enumerate()
            .map(|(i, item)| env_var(item, &format!("env[{}]", i)))
            .collect::<Result<Vec<_>>>()?;

        let env_from = sequence(config, "envFrom")
            .iter()
            .enumerate()
            .map(|(i, item)| env_from_source(item, &format!("envFrom[{}]", i)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { env, env_from })
    }

    pub fn is_empty(&self) -> bool {
        self.env.is_empty() && self.env_from.is_empty()
    }

    /// The assembled order, for display and diagnostics
    pub fn sources(&self) -> Vec<EnvSource> {
        let vars = self.env.iter().map(|var| EnvSource::Var(var.name.clone()));
        let refs = self.env_from.iter().filter_map(|src| {
            let prefix = src.prefix.clone();
            if let Some(cm) = &src.config_map_ref {
                Some(EnvSource::ConfigMap {
                    name: cm.name.clone(),
                    prefix,
                })
            } else {
                src.secret_ref.as_ref().map(|secret| EnvSource::Secret {
                    name: secret.name.clone(),
                    prefix,
                })
            }
        });
        vars.chain(refs).collect()
    }
}

fn sequence<'a>(config: &'a ResolvedConfig, path: &str) -> &'a [ConfigNode] {
    config
        .get(path)
        .and_then(ConfigNode::as_sequence)
        .unwrap_or_default()
}

fn env_var(item: &ConfigNode, path: &str) -> Result<EnvVar> {
    let name = item
        .get("name")
        .and_then(ConfigNode::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| EngineError::render(format!("{}.name", path), "variable name is required"))?;

    let value = item.get("value").filter(|v| !v.is_null());
    let value_from = item.get("valueFrom").filter(|v| !v.is_empty());

    let (value, value_from) = match (value, value_from) {
        (Some(_), Some(_)) => {
            return Err(EngineError::render(
                path,
                format!("'{}' sets both value and valueFrom", name),
            ));
        }
        (Some(v), None) => {
            let value = v.scalar_to_string().ok_or_else(|| {
                EngineError::render(
                    format!("{}.value", path),
                    format!("expected a scalar, found {}", v.kind_name()),
                )
            })?;
            (Some(value), None)
        }
        (None, Some(source)) => {
            let source: EnvVarSource = project(source, &format!("{}.valueFrom", path))?;
            (None, Some(source))
        }
        (None, None) => (None, None),
    };

    Ok(EnvVar {
        name: name.to_string(),
        value,
        value_from,
    })
}

fn env_from_source(item: &ConfigNode, path: &str) -> Result<EnvFromSource> {
    let source: EnvFromSource = project(item, path)?;
    match (&source.config_map_ref, &source.secret_ref) {
        (Some(_), None) | (None, Some(_)) => Ok(source),
        (Some(_), Some(_)) => Err(EngineError::render(
            path,
            "set either configMapRef or secretRef, not both",
        )),
        (None, None) => Err(EngineError::render_with_help(
            path,
            "no source given",
            "set configMapRef.name or secretRef.name",
        )),
    }
}
