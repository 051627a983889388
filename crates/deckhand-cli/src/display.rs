//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - The layer stack that went into a merge
//! - Provenance of resolved values

use console::style;
use deckhand_core::{Layer, ResolvedConfig};

/// Print the layers in priority order, lowest first
pub fn print_layers(layers: &[Layer]) {
    println!("  {} Layers (lowest priority first):", style("→").blue());
    println!("    {} {}", style("0.").dim(), style("schema defaults").dim());
    for (i, layer) in layers.iter().enumerate() {
        println!(
            "    {} {} {}",
            style(format!("{}.", i + 1)).dim(),
            layer.name(),
            style(format!("({})", layer.origin())).dim()
        );
    }
}

/// Print which layer set each resolved value
pub fn print_provenance(config: &ResolvedConfig) {
    let entries: Vec<(&str, &str)> = config.provenance().collect();
    if entries.is_empty() {
        return;
    }

    let width = entries.iter().map(|(path, _)| path.len()).max().unwrap_or(0);
    println!("  {} Provenance:", style("→").blue());
    for (path, layer) in entries {
        println!("    {:width$}  {} {}", path, style("←").dim(), style(layer).cyan());
    }
}
