//! Schema command - export the recognized keys as JSON Schema

use console::style;
use deckhand_core::{LoadedChart, SchemaStore};
use std::fs;
use std::path::Path;

use crate::error::{CliError, Result};

/// Print (or write) the JSON Schema of the built-in store, extended by the
/// chart's values.schema.yaml when a chart is given
pub fn run(chart_path: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let schema = match chart_path {
        Some(path) => LoadedChart::load(path)?.schema()?,
        None => SchemaStore::builtin(),
    };

    let json = serde_json::to_string_pretty(&schema.to_json_schema())
        .map_err(|e| CliError::internal(e.to_string()))?;

    match output {
        Some(path) => {
            fs::write(path, format!("{}\n", json))?;
            eprintln!("{} {}", style("wrote").green(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
