//! Layer assembly shared by the commands
//!
//! Layers are stacked lowest priority first: chart values.yaml, the
//! environment profile, `-f` files in the order given, `--set`, then
//! `--set-string`. Schema defaults sit below all of them inside the merger.

use clap::Args;
use deckhand_core::{ConfigNode, Layer, LayerOrigin, LoadedChart, SchemaMode, SchemaStore};
use deckhand_source::{source_for, LayerLoader, LayerSource, LoaderConfig};
use std::time::Duration;

use crate::error::Result;

/// Value layer arguments, shared by `template` and `validate`
#[derive(Args, Debug, Clone)]
pub struct LayerArgs {
    /// Environment profile from the chart's environments/ directory
    #[arg(short = 'e', long = "environment", env = "DECKHAND_ENVIRONMENT")]
    pub environment: Option<String>,

    /// Values file(s) to merge: local paths or http(s) URLs
    #[arg(short = 'f', long = "values")]
    pub values: Vec<String>,

    /// Set values on command line (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Set string values on command line (key=value, never coerced)
    #[arg(long = "set-string")]
    pub set_string: Vec<String>,

    /// Let keys the schema does not describe pass through
    #[arg(long, env = "DECKHAND_PERMISSIVE")]
    pub permissive: bool,

    /// Limit for fetching each values file (e.g. 500ms, 10s)
    #[arg(long, default_value = "10s", value_parser = parse_timeout, env = "DECKHAND_TIMEOUT")]
    pub timeout: Duration,
}

impl LayerArgs {
    pub fn schema_mode(&self) -> SchemaMode {
        if self.permissive {
            SchemaMode::Permissive
        } else {
            SchemaMode::Strict
        }
    }
}

/// clap value parser for `--timeout`
pub fn parse_timeout(s: &str) -> std::result::Result<Duration, String> {
    deckhand_core::schema::parse_duration(&ConfigNode::from(s))
        .filter(|d| !d.is_zero())
        .ok_or_else(|| format!("invalid duration '{}' (expected e.g. 500ms, 10s, 1m)", s))
}

/// The chart's schema in the requested mode
pub fn chart_schema(chart: &LoadedChart, mode: SchemaMode) -> Result<SchemaStore> {
    Ok(chart.schema()?.with_mode(mode))
}

/// Collect every layer for a render, in priority order
pub async fn collect_layers(chart: &LoadedChart, args: &LayerArgs) -> Result<Vec<Layer>> {
    let mut layers = vec![chart.defaults_layer()?];

    if let Some(env) = &args.environment {
        layers.push(chart.environment_layer(env)?);
    }

    if !args.values.is_empty() {
        let sources = args
            .values
            .iter()
            .map(|location| source_for(location, LayerOrigin::Release))
            .collect::<std::result::Result<Vec<Box<dyn LayerSource>>, _>>()?;

        let loader = LayerLoader::new(LoaderConfig {
            timeout: args.timeout,
            ..LoaderConfig::default()
        });
        let _guard = cancel_on_ctrl_c(&loader);
        layers.extend(loader.load_all(&sources).await?);
    }

    if !args.set.is_empty() {
        layers.push(Layer::from_set_values(&args.set)?);
    }
    if !args.set_string.is_empty() {
        layers.push(Layer::from_set_string_values(&args.set_string)?);
    }

    for layer in &layers {
        tracing::debug!(layer = layer.name(), origin = %layer.origin(), "collected layer");
    }
    Ok(layers)
}

/// Cancel the loader's in-flight fetches on Ctrl-C
///
/// The watcher task is aborted when the returned guard drops.
fn cancel_on_ctrl_c(loader: &LayerLoader) -> tokio_util::sync::DropGuard {
    let token = loader.cancellation_token();
    let watcher = token.child_token();
    let guard = watcher.clone().drop_guard();

    tokio::spawn(async move {
        tokio::select! {
            _ = watcher.cancelled() => {}
            res = tokio::signal::ctrl_c() => {
                if res.is_ok() {
                    tracing::warn!("interrupted, cancelling values file retrieval");
                    token.cancel();
                }
            }
        }
    });

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_timeout("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_timeout("0s").is_err());
        assert!(parse_timeout("soon").is_err());
    }
}
