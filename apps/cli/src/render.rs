//! Batch tree building over a directory of StructureDefinitions

use anyhow::{Context, Result};
use ferrum_models::{FhirVersion, StructureDefinition};
use ferrum_tree::{
    FhirNode, FhirTreeData, InMemoryStructureDefinitions, RenderContext,
    StructureDefinitionTreeDataProvider,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::CliConfig;
use crate::events::TracingEventHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct LoadedDefinition {
    pub file: PathBuf,
    pub structure_definition: StructureDefinition,
    pub version: FhirVersion,
}

/// Definitions that loaded, and how many files failed to
pub struct LoadedDirectory {
    pub definitions: Vec<LoadedDefinition>,
    pub failed: usize,
}

/// Every StructureDefinition among the `*.json` files of `dir`, in file name order.
///
/// A file that can't be read, parsed or versioned aborts loading unless
/// `continue_on_fail` is set, in which case it is logged and counted.
pub fn load_directory(dir: &Path, continue_on_fail: bool) -> Result<LoadedDirectory> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut loaded = LoadedDirectory {
        definitions: Vec::with_capacity(files.len()),
        failed: 0,
    };
    for file in files {
        match load_file(&file) {
            Ok(Some(definition)) => loaded.definitions.push(definition),
            Ok(None) => {
                tracing::debug!(file = %file.display(), "Skipping non-StructureDefinition file");
            }
            Err(err) if continue_on_fail => {
                tracing::error!(
                    file = %file.display(),
                    error = %format!("{:#}", err),
                    "Failed to load file"
                );
                loaded.failed += 1;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(loaded)
}

fn load_file(file: &Path) -> Result<Option<LoadedDefinition>> {
    let content =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    if value.get("resourceType").and_then(|v| v.as_str()) != Some("StructureDefinition") {
        return Ok(None);
    }
    let structure_definition = StructureDefinition::from_value(&value)
        .with_context(|| format!("Invalid StructureDefinition in {}", file.display()))?;
    let version = structure_definition
        .implicit_fhir_version()
        .with_context(|| format!("Unknown FHIR version in {}", file.display()))?;
    Ok(Some(LoadedDefinition {
        file: file.to_path_buf(),
        structure_definition,
        version,
    }))
}

pub fn repository(definitions: &[LoadedDefinition]) -> InMemoryStructureDefinitions {
    let mut repository = InMemoryStructureDefinitions::new();
    for definition in definitions {
        repository.insert(definition.version, definition.structure_definition.clone());
    }
    repository
}

/// One tree node as listed or written out
#[derive(Debug, Serialize)]
pub struct NodeSummary {
    pub key: String,
    pub path: String,
    pub display_name: String,
    pub cardinality: String,
    pub removed: bool,
    pub type_links: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_node: Option<String>,
    #[serde(skip)]
    depth: usize,
}

#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub url: String,
    pub name: String,
    pub fhir_version: String,
    pub snapshot_nodes: usize,
    pub differential: Vec<NodeSummary>,
    pub skipped: Vec<String>,
}

pub fn summarize_node(
    node: FhirNode<'_>,
    ctx: &RenderContext<'_>,
) -> ferrum_tree::Result<NodeSummary> {
    Ok(NodeSummary {
        key: node.node_key(),
        path: node.path().to_string(),
        display_name: node.data().display_name()?,
        cardinality: node.data().cardinality(),
        removed: node.is_removed_by_profile(),
        type_links: node.type_links(ctx)?.texts(),
        discriminator: node.discriminator_value().map(str::to_string),
        linked_node: node.linked_node()?.map(|linked| linked.node_key()),
        depth: node.ancestors().count(),
    })
}

/// Builds both trees of one profile
pub fn build_trees(
    sd: &StructureDefinition,
    ctx: &RenderContext<'_>,
) -> ferrum_tree::Result<(Arc<FhirTreeData>, FhirTreeData)> {
    let provider = StructureDefinitionTreeDataProvider::new(sd)?;
    let snapshot = provider.snapshot_tree_data(ctx)?;
    let differential = provider.differential_tree_data(Arc::clone(&snapshot), ctx)?;
    Ok((snapshot, differential))
}

fn summarize_profile(
    sd: &StructureDefinition,
    ctx: &RenderContext<'_>,
) -> ferrum_tree::Result<ProfileSummary> {
    let provider = StructureDefinitionTreeDataProvider::new(sd)?;
    let (snapshot, differential) = build_trees(sd, ctx)?;
    let nodes = differential
        .nodes()
        .map(|node| summarize_node(node, ctx))
        .collect::<ferrum_tree::Result<Vec<_>>>()?;
    Ok(ProfileSummary {
        url: sd.url.clone(),
        name: sd.name.clone(),
        fhir_version: format!("{:?}", provider.version()),
        snapshot_nodes: snapshot.len(),
        differential: nodes,
        skipped: differential.skipped().iter().map(|p| p.to_string()).collect(),
    })
}

pub fn format_listing(summary: &ProfileSummary) -> String {
    let mut out = format!("{} ({})\n", summary.name, summary.url);
    for node in &summary.differential {
        let mut line = format!(
            "{}{} {} {}",
            "  ".repeat(node.depth),
            node.display_name,
            node.cardinality,
            node.type_links.join(" | ")
        );
        if node.removed {
            line.push_str(" [removed]");
        }
        if let Some(value) = &node.discriminator {
            line.push_str(&format!(" discriminator={}", value));
        }
        if let Some(linked) = &node.linked_node {
            line.push_str(&format!(" -> {}", linked));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    for skipped in &summary.skipped {
        out.push_str(&format!("  (skipped {})\n", skipped));
    }
    out
}

pub struct BatchOutcome {
    pub rendered: usize,
    pub failed: usize,
    pub warnings: usize,
}

pub struct Renderer<'a> {
    config: &'a CliConfig,
    events: &'a TracingEventHandler,
    format: OutputFormat,
    output_dir: Option<&'a Path>,
}

impl<'a> Renderer<'a> {
    pub fn new(
        config: &'a CliConfig,
        events: &'a TracingEventHandler,
        format: OutputFormat,
        output_dir: Option<&'a Path>,
    ) -> Self {
        Self {
            config,
            events,
            format,
            output_dir,
        }
    }

    pub fn render_all(
        &self,
        definitions: &[LoadedDefinition],
        repository: &InMemoryStructureDefinitions,
    ) -> Result<BatchOutcome> {
        let ctx = RenderContext::new(self.events)
            .with_structure_definitions(repository)
            .with_permitted_missing_extension_prefixes(
                &self.config.permitted_missing_extension_prefixes,
            );
        if let Some(dir) = self.output_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let mut outcome = BatchOutcome {
            rendered: 0,
            failed: 0,
            warnings: 0,
        };
        for definition in definitions {
            let file = definition.file.display().to_string();
            let span = tracing::info_span!("render", file = %file);
            let _entered = span.enter();

            let result = summarize_profile(&definition.structure_definition, &ctx);
            let warnings = self.events.take_warning_count();
            outcome.warnings += warnings;

            match result {
                Ok(summary) => {
                    tracing::info!(
                        nodes = summary.differential.len(),
                        skipped = summary.skipped.len(),
                        events = warnings,
                        "Built trees"
                    );
                    self.write(definition, &summary)?;
                    outcome.rendered += 1;
                }
                Err(err) if self.config.continue_on_fail => {
                    tracing::error!(error = %err, events = warnings, "Failed to build trees");
                    outcome.failed += 1;
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to build trees for {}", file));
                }
            }
        }
        Ok(outcome)
    }

    fn write(&self, definition: &LoadedDefinition, summary: &ProfileSummary) -> Result<()> {
        match (self.format, self.output_dir) {
            (OutputFormat::Text, None) => {
                print!("{}", format_listing(summary));
                Ok(())
            }
            (OutputFormat::Text, Some(dir)) => {
                let target = output_path(dir, &definition.file, "txt");
                fs::write(&target, format_listing(summary))
                    .with_context(|| format!("Failed to write {}", target.display()))
            }
            (OutputFormat::Json, None) => {
                println!("{}", serde_json::to_string_pretty(summary)?);
                Ok(())
            }
            (OutputFormat::Json, Some(dir)) => {
                let target = output_path(dir, &definition.file, "json");
                let json = serde_json::to_string_pretty(summary)?;
                fs::write(&target, json)
                    .with_context(|| format!("Failed to write {}", target.display()))
            }
        }
    }
}

fn output_path(dir: &Path, source: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "profile".to_string());
    dir.join(format!("{}.tree.{}", stem, extension))
}
