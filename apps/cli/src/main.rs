//! Builds snapshot and differential element trees for FHIR profiles
//!
//! Usage:
//!   fhir-tree render <dir> [--output <dir>] [--format text|json] [--continue-on-fail]
//!   fhir-tree inspect <file> [--key Patient.identifier(NHS).system]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ferrum_tree::{InMemoryStructureDefinitions, RenderContext};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

mod config;
mod events;
mod logging;
mod render;

use config::{CliConfig, Overrides};
use events::TracingEventHandler;
use render::{OutputFormat, Renderer};

#[derive(Parser, Debug)]
#[clap(name = "fhir-tree")]
#[clap(about = "Build snapshot and differential element trees for FHIR profiles")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[clap(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[clap(long, global = true)]
    log_json: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build trees for every StructureDefinition in a directory
    Render {
        dir: PathBuf,

        /// Write one file per profile here instead of printing
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Log failed files and keep going
        #[clap(long)]
        continue_on_fail: bool,

        /// Escalate every diagnostic event to an error
        #[clap(long)]
        strict: bool,

        #[clap(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show the differential tree of one profile, or a single node of it
    Inspect {
        file: PathBuf,

        /// Node key, e.g. Patient.identifier(NHS).system
        #[clap(short, long)]
        key: Option<String>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let overrides = match &cli.command {
        Command::Render {
            continue_on_fail,
            strict,
            ..
        } => Overrides {
            continue_on_fail: *continue_on_fail,
            strict: *strict,
            log_level: cli.log_level.clone(),
            log_json: cli.log_json,
        },
        Command::Inspect { .. } => Overrides {
            log_level: cli.log_level.clone(),
            log_json: cli.log_json,
            ..Overrides::default()
        },
    };
    let config = CliConfig::load(cli.config.as_deref(), &overrides)?;
    logging::init_logging(&config.logging)?;
    let events = TracingEventHandler::new(config.event_config()?);

    match cli.command {
        Command::Render {
            dir,
            output,
            format,
            ..
        } => {
            let loaded = render::load_directory(&dir, config.continue_on_fail)?;
            let repository = render::repository(&loaded.definitions);
            info!(
                dir = %dir.display(),
                profiles = loaded.definitions.len(),
                failed = loaded.failed,
                "Loaded StructureDefinitions"
            );

            let mut outcome = Renderer::new(&config, &events, format, output.as_deref())
                .render_all(&loaded.definitions, &repository)?;
            outcome.failed += loaded.failed;
            info!(
                rendered = outcome.rendered,
                failed = outcome.failed,
                events = outcome.warnings,
                "Finished rendering"
            );
            Ok(if outcome.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Inspect { file, key } => {
            inspect(&config, &events, file, key)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn inspect(
    config: &CliConfig,
    events: &TracingEventHandler,
    file: PathBuf,
    key: Option<String>,
) -> Result<()> {
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    let sd = ferrum_models::StructureDefinition::from_value(&value)
        .with_context(|| format!("Invalid StructureDefinition in {}", file.display()))?;

    let mut repository = InMemoryStructureDefinitions::new();
    repository.insert(sd.implicit_fhir_version()?, sd.clone());
    let ctx = RenderContext::new(events)
        .with_structure_definitions(&repository)
        .with_permitted_missing_extension_prefixes(&config.permitted_missing_extension_prefixes);

    let (_snapshot, differential) = render::build_trees(&sd, &ctx)?;
    match key {
        Some(key) => {
            let node = differential
                .node_with_key(&key)
                .with_context(|| format!("No node with key {}", key))?;
            let summary = render::summarize_node(node, &ctx)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => {
            for node in differential.nodes() {
                let summary = render::summarize_node(node, &ctx)?;
                println!(
                    "{}\t{}\t{}",
                    summary.key,
                    summary.cardinality,
                    summary.type_links.join(" | ")
                );
            }
        }
    }
    Ok(())
}
