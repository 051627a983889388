//! Template command - render a chart's resources locally

use console::style;
use deckhand_core::{LoadedChart, OverlayMerger};
use deckhand_engine::{ManifestRenderer, Release, ResourceSpec};
use std::fs;
use std::path::Path;

use crate::error::{CliError, Result};
use crate::pipeline::{chart_schema, collect_layers, LayerArgs};

pub struct TemplateOptions<'a> {
    pub release: &'a str,
    pub chart_path: &'a Path,
    pub namespace: &'a str,
    pub layers: &'a LayerArgs,
    pub output_dir: Option<&'a Path>,
    pub show_only: Option<&'a str>,
    pub show_values: bool,
}

pub async fn run(opts: TemplateOptions<'_>) -> Result<()> {
    let chart = LoadedChart::load(opts.chart_path)?;
    tracing::debug!(
        chart = %chart.metadata.name,
        version = %chart.metadata.version,
        "loaded chart"
    );

    let schema = chart_schema(&chart, opts.layers.schema_mode())?;
    let layers = collect_layers(&chart, opts.layers).await?;
    let resolved = OverlayMerger::new(&schema).merge(layers)?;

    // Show merged values if requested
    if opts.show_values {
        println!("{}", style("# Computed Values").cyan().bold());
        println!("---");
        println!("{}", resolved.to_yaml()?.trim_end());
        println!("---");
        println!();
    }

    let release = Release::new(opts.release, opts.namespace);
    let renderer = ManifestRenderer::new(chart.metadata.clone(), release);
    let resources = renderer.render(&resolved)?;

    let selected: Vec<&ResourceSpec> = resources
        .iter()
        .filter(|r| opts.show_only.is_none_or(|filter| matches_filter(r, filter)))
        .collect();

    if let Some(filter) = opts.show_only {
        if selected.is_empty() {
            return Err(CliError::Render {
                message: format!("no rendered resource matches '{}'", filter),
                help: Some(format!(
                    "rendered: {}",
                    resources
                        .iter()
                        .map(ResourceSpec::source_file)
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            });
        }
    }

    match opts.output_dir {
        Some(output_path) => write_files(output_path, &selected),
        None => print_stream(&selected),
    }
}

/// `--show-only` matches the output file name or the kind
fn matches_filter(resource: &ResourceSpec, filter: &str) -> bool {
    resource.source_file().contains(filter) || resource.kind().eq_ignore_ascii_case(filter)
}

fn print_stream(resources: &[&ResourceSpec]) -> Result<()> {
    for resource in resources {
        println!("---");
        println!("{}", style(format!("# Source: {}", resource.source_file())).dim());
        print!("{}", resource.to_yaml()?);
    }
    Ok(())
}

fn write_files(output_path: &Path, resources: &[&ResourceSpec]) -> Result<()> {
    fs::create_dir_all(output_path)?;

    for resource in resources {
        let file_path = output_path.join(resource.source_file());
        let content = format!("# Source: {}\n{}", resource.source_file(), resource.to_yaml()?);
        fs::write(&file_path, content).map_err(|e| CliError::Io {
            message: format!("Failed to write {}: {}", file_path.display(), e),
        })?;

        println!("{} {}", style("wrote").green(), file_path.display());
    }
    Ok(())
}
