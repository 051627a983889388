//! Flavors command - render every environment profile of a chart
//!
//! Each profile is merged and rendered on its own blocking task. Tasks share
//! the chart, schema and defaults read-only; nothing is mutated across them.

use console::style;
use deckhand_core::{Layer, LoadedChart, OverlayMerger, SchemaMode, SchemaStore};
use deckhand_engine::{to_yaml, ManifestRenderer, Release};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::error::{CliError, Result};

pub async fn run(
    release: &str,
    chart_path: &Path,
    namespace: &str,
    mode: SchemaMode,
    output_dir: Option<&Path>,
) -> Result<()> {
    let chart = Arc::new(LoadedChart::load(chart_path)?);
    let environments = chart.environments()?;
    if environments.is_empty() {
        return Err(CliError::Chart {
            message: format!("chart '{}' has no environment profiles", chart.metadata.name),
            help: Some("add one YAML file per environment under environments/".to_string()),
        });
    }

    let schema = Arc::new(chart.schema()?.with_mode(mode));
    let defaults = chart.defaults_layer()?;
    let release = Release::new(release, namespace);

    let mut tasks = JoinSet::new();
    for env in environments {
        let chart = Arc::clone(&chart);
        let schema = Arc::clone(&schema);
        let defaults = defaults.clone();
        let release = release.clone();

        tasks.spawn_blocking(move || {
            let rendered = render_flavor(&chart, &schema, defaults, &env, release);
            (env, rendered)
        });
    }

    // Completion order varies; report in environment name order
    let mut flavors = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (env, rendered) =
            joined.map_err(|e| CliError::internal(format!("flavor task failed: {}", e)))?;
        flavors.insert(env, rendered);
    }

    let mut outputs = Vec::with_capacity(flavors.len());
    for (env, rendered) in flavors {
        let yaml = rendered.map_err(|e| e.with_context(&format!("environment '{}'", env)))?;
        outputs.push((env, yaml));
    }

    match output_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            for (env, yaml) in &outputs {
                let file_path = dir.join(format!("{}.yaml", env));
                fs::write(&file_path, yaml)?;
                println!("{} {}", style("wrote").green(), file_path.display());
            }
            println!();
            println!(
                "{} Rendered {} flavor(s) of {}",
                style("✓").green().bold(),
                outputs.len(),
                chart.metadata.name
            );
        }
        None => {
            for (env, yaml) in &outputs {
                println!("{}", style(format!("# Flavor: {}", env)).cyan().bold());
                print!("{}", yaml);
            }
        }
    }
    Ok(())
}

fn render_flavor(
    chart: &LoadedChart,
    schema: &SchemaStore,
    defaults: Layer,
    env: &str,
    release: Release,
) -> Result<String> {
    tracing::debug!(environment = env, "rendering flavor");

    let profile = chart.environment_layer(env)?;
    let resolved = OverlayMerger::new(schema).merge([defaults, profile])?;
    let renderer = ManifestRenderer::new(chart.metadata.clone(), release);
    let resources = renderer.render(&resolved)?;
    Ok(to_yaml(&resources)?)
}
