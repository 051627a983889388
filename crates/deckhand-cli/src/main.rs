//! Deckhand CLI - layered values to Kubernetes manifests

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod display;
mod error;
mod exit_codes;
mod pipeline;

use error::Result;
use pipeline::LayerArgs;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(author = "Deckhand Contributors")]
#[command(version)]
#[command(about = "Render Kubernetes manifests from layered, schema-checked values", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true, env = "DECKHAND_DEBUG")]
    debug: bool,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "DECKHAND_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Render chart resources locally
    Template {
        /// Release name
        release: String,

        /// Chart path
        chart: PathBuf,

        #[command(flatten)]
        layers: LayerArgs,

        /// Target namespace
        #[arg(short, long, default_value = "default", env = "DECKHAND_NAMESPACE")]
        namespace: String,

        /// Output directory (if not set, outputs to stdout)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Show only resources whose file name or kind matches
        #[arg(short = 's', long)]
        show_only: Option<String>,

        /// Show merged values
        #[arg(long)]
        show_values: bool,
    },

    /// Merge and validate values without rendering
    Validate {
        /// Chart path
        #[arg(default_value = ".")]
        chart: PathBuf,

        #[command(flatten)]
        layers: LayerArgs,

        /// Show the layer stack and where each value came from
        #[arg(short, long)]
        verbose: bool,

        /// Output validation results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the JSON Schema of recognized keys
    Schema {
        /// Chart whose values.schema.yaml extends the built-in keys
        chart: Option<PathBuf>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render every environment profile of a chart in parallel
    Flavors {
        /// Release name
        release: String,

        /// Chart path
        chart: PathBuf,

        /// Target namespace
        #[arg(short, long, default_value = "default", env = "DECKHAND_NAMESPACE")]
        namespace: String,

        /// Let keys the schema does not describe pass through
        #[arg(long, env = "DECKHAND_PERMISSIVE")]
        permissive: bool,

        /// Write one <environment>.yaml per profile instead of stdout
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn init_tracing(debug: bool, format: LogFormat) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("DECKHAND_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(console::colors_enabled_stderr())
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Template {
            release,
            chart,
            layers,
            namespace,
            output_dir,
            show_only,
            show_values,
        } => {
            commands::template::run(commands::template::TemplateOptions {
                release: &release,
                chart_path: &chart,
                namespace: &namespace,
                layers: &layers,
                output_dir: output_dir.as_deref(),
                show_only: show_only.as_deref(),
                show_values,
            })
            .await
        }

        Commands::Validate {
            chart,
            layers,
            verbose,
            json,
        } => commands::validate::run(&chart, &layers, verbose, json).await,

        Commands::Schema { chart, output } => {
            commands::schema::run(chart.as_deref(), output.as_deref())
        }

        Commands::Flavors {
            release,
            chart,
            namespace,
            permissive,
            output_dir,
        } => {
            let mode = if permissive {
                deckhand_core::SchemaMode::Permissive
            } else {
                deckhand_core::SchemaMode::Strict
            };
            commands::flavors::run(&release, &chart, &namespace, mode, output_dir.as_deref()).await
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_format);

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_template_layer_flags() {
        let cli = Cli::try_parse_from([
            "deckhand", "template", "prod", "./web", "-e", "production", "-f", "a.yaml", "-f",
            "https://catalog.example.com/web.yaml", "--set", "replicaCount=3", "--timeout", "2s",
        ])
        .unwrap();

        match cli.command {
            Commands::Template { layers, .. } => {
                assert_eq!(layers.environment.as_deref(), Some("production"));
                assert_eq!(layers.values, vec!["a.yaml", "https://catalog.example.com/web.yaml"]);
                assert_eq!(layers.set, vec!["replicaCount=3"]);
                assert_eq!(layers.timeout, std::time::Duration::from_secs(2));
            }
            _ => panic!("expected template command"),
        }
    }

    #[test]
    fn test_rejects_bad_timeout() {
        let parsed = Cli::try_parse_from(["deckhand", "validate", ".", "--timeout", "soon"]);
        assert!(parsed.is_err());
    }
}
