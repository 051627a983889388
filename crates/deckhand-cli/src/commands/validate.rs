//! Validate command - merge and check value layers without rendering

use console::style;
use deckhand_core::{CoreError, LoadedChart, OverlayMerger, ResolvedConfig};
use std::path::Path;

use crate::display;
use crate::error::{CliError, Result};
use crate::pipeline::{chart_schema, collect_layers, LayerArgs};

pub async fn run(chart_path: &Path, layer_args: &LayerArgs, verbose: bool, json_output: bool) -> Result<()> {
    let chart = LoadedChart::load(chart_path)?;

    if !json_output {
        println!(
            "{} Validating values for {} v{}",
            style("→").blue(),
            chart.metadata.name,
            chart.metadata.version
        );
        if let Some(env) = &layer_args.environment {
            println!("  {} Environment: {}", style("→").blue(), style(env).cyan());
        }
    }

    let schema = chart_schema(&chart, layer_args.schema_mode())?;
    let layers = collect_layers(&chart, layer_args).await?;

    if verbose && !json_output {
        display::print_layers(&layers);
    }

    let result = OverlayMerger::new(&schema).merge(layers);

    if json_output {
        println!("{}", json_report(&chart, &result)?);
        return result.map(|_| ()).map_err(CliError::from);
    }

    match result {
        Ok(resolved) => {
            println!("  {} Values are valid against schema", style("✓").green());
            if verbose {
                display::print_provenance(&resolved);
            }
            println!("  {} Checksum: {}", style("→").blue(), style(resolved.checksum()?).dim());
            println!();
            println!("{} Validation passed!", style("✓").green().bold());
            Ok(())
        }
        Err(err) => {
            let at = err
                .path()
                .map(|p| format!(" at {}", style(p).dim()))
                .unwrap_or_default();
            println!("  {} {}{}", style("✗").red(), err, at);
            println!();
            println!("{} Validation failed", style("✗").red().bold());
            Err(err.into())
        }
    }
}

fn json_report(
    chart: &LoadedChart,
    result: &std::result::Result<ResolvedConfig, CoreError>,
) -> Result<String> {
    let (checksum, errors) = match result {
        Ok(resolved) => (Some(resolved.checksum()?), Vec::new()),
        Err(err) => (
            None,
            vec![serde_json::json!({
                "path": err.path(),
                "message": err.to_string(),
            })],
        ),
    };

    let output = serde_json::json!({
        "valid": result.is_ok(),
        "chart": {
            "name": chart.metadata.name,
            "version": chart.metadata.version.to_string(),
        },
        "checksum": checksum,
        "errors": errors,
    });
    serde_json::to_string_pretty(&output).map_err(|e| CliError::internal(e.to_string()))
}
