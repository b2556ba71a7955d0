//! Query command - Targets, dependencies and platforms of a graph
//!
//! Queries run on the graph as loaded. With `--mapped` they run on the graph
//! produced by the mapper pipeline instead (without cached binaries).

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use xcgraph_core::model::{format_platforms, Platform, PlatformCondition, TargetReference};
use xcgraph_core::traverser::{DependencyReference, GraphTarget, GraphTraverser};
use xcgraph_core::Graph;

use super::{find_target, load_config, load_graph, map_graph, print_warning, resolve_path};
use crate::GlobalOptions;

/// Arguments for the query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Query the graph after the mapper pipeline ran
    #[arg(long, global = true)]
    mapped: bool,

    #[command(subcommand)]
    command: QueryCommand,
}

#[derive(Subcommand, Debug)]
pub enum QueryCommand {
    /// List targets
    Targets {
        /// Only targets of external projects
        #[arg(long, conflicts_with = "internal")]
        external: bool,

        /// Only targets of local projects
        #[arg(long)]
        internal: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the targets of the entry nodes
    Roots {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the target dependencies of a target
    Deps {
        #[command(flatten)]
        target: TargetSelector,

        /// Follow dependencies transitively
        #[arg(long, short = 't')]
        transitive: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what a target links
    Linkable {
        #[command(flatten)]
        target: TargetSelector,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the frameworks a target embeds
    Embeddable {
        #[command(flatten)]
        target: TargetSelector,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List external targets no local target needs
    Orphans {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the platforms external targets are needed on
    Platforms {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Identifies one target of the graph
#[derive(Args, Debug)]
pub struct TargetSelector {
    /// Target name
    name: String,

    /// Directory of the declaring project, relative to --path
    #[arg(long)]
    project: Option<PathBuf>,
}

/// Target as printed by queries
#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    pub name: String,
    pub project: PathBuf,
    pub product: String,
    pub platforms: BTreeSet<Platform>,
    pub external: bool,
}

impl TargetSummary {
    fn new(target: &GraphTarget<'_>) -> Self {
        Self {
            name: target.target.name.clone(),
            project: target.path.to_path_buf(),
            product: target.target.product.as_str().to_string(),
            platforms: target.target.platforms.clone(),
            external: target.project.is_external(),
        }
    }
}

/// Target dependency as printed by `deps`
#[derive(Debug, Clone, Serialize)]
pub struct DependencySummary {
    #[serde(flatten)]
    pub target: TargetSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<PlatformCondition>,
}

/// Platforms of one external target, as printed by `platforms`
#[derive(Debug, Clone, Serialize)]
pub struct PlatformsSummary {
    pub target: TargetReference,
    pub declared: BTreeSet<Platform>,
    pub needed: BTreeSet<Platform>,
}

/// Execute the query command
pub async fn execute(args: QueryArgs, global: GlobalOptions) -> Result<()> {
    let root = resolve_path(&global)?;
    let config = load_config(&global, &root)?;
    let mut graph = load_graph(&root, true)?;
    if args.mapped {
        graph = map_graph(graph, &config, false).await?.0;
    }
    let traverser = GraphTraverser::new(&graph);

    match args.command {
        QueryCommand::Targets {
            external,
            internal,
            json,
        } => {
            let targets = if external {
                traverser.all_external_targets()
            } else if internal {
                traverser.all_internal_targets()
            } else {
                traverser.all_targets()
            };
            print_targets(&targets, json)
        }
        QueryCommand::Roots { json } => print_targets(&traverser.root_targets(), json),
        QueryCommand::Deps {
            target,
            transitive,
            json,
        } => {
            let found = find_target(&traverser, &root, &target.name, target.project.as_deref())?;
            let dependencies: Vec<DependencySummary> = if transitive {
                traverser
                    .all_target_dependencies(found.path, &found.target.name)
                    .iter()
                    .map(|dependency| DependencySummary {
                        target: TargetSummary::new(dependency),
                        condition: None,
                    })
                    .collect()
            } else {
                traverser
                    .direct_target_dependencies(found.path, &found.target.name)
                    .into_iter()
                    .map(|dependency| DependencySummary {
                        target: TargetSummary::new(&dependency.target),
                        condition: dependency.condition,
                    })
                    .collect()
            };
            print_dependencies(&dependencies, json)
        }
        QueryCommand::Linkable { target, json } => {
            let found = find_target(&traverser, &root, &target.name, target.project.as_deref())?;
            let linked = traverser
                .linkable_dependencies(found.path, &found.target.name)
                .with_context(|| format!("Failed to resolve what {} links", found.target.name))?;
            print_references(&linked, json)
        }
        QueryCommand::Embeddable { target, json } => {
            let found = find_target(&traverser, &root, &target.name, target.project.as_deref())?;
            let embedded = traverser.embeddable_frameworks(found.path, &found.target.name);
            print_references(&embedded, json)
        }
        QueryCommand::Orphans { json } => {
            print_targets(&traverser.all_orphan_external_targets(), json)
        }
        QueryCommand::Platforms { json } => print_platforms(&graph, &traverser, json),
    }
}

fn print_targets(targets: &BTreeSet<GraphTarget<'_>>, json: bool) -> Result<()> {
    let summaries: Vec<TargetSummary> = targets.iter().map(TargetSummary::new).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    for summary in &summaries {
        println!(
            "{:<28} {:<20} {:<24} {}",
            summary.name,
            summary.product,
            format_platforms(&summary.platforms),
            summary.project.display()
        );
    }
    Ok(())
}

fn print_dependencies(dependencies: &[DependencySummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(dependencies)?);
        return Ok(());
    }

    for dependency in dependencies {
        let condition = dependency
            .condition
            .as_ref()
            .map(|condition| format!(" [{}]", format_platforms(condition.platforms())))
            .unwrap_or_default();
        println!(
            "{:<28} {}{}",
            dependency.target.name,
            dependency.target.project.display(),
            condition
        );
    }
    Ok(())
}

fn print_references(references: &BTreeSet<DependencyReference>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(references)?);
        return Ok(());
    }

    for reference in references {
        println!("{}", reference);
    }
    Ok(())
}

fn print_platforms(graph: &Graph, traverser: &GraphTraverser<'_>, json: bool) -> Result<()> {
    let resolved = traverser.resolve_external_platforms();

    let summaries: Vec<PlatformsSummary> = traverser
        .all_external_targets()
        .iter()
        .map(|target| {
            let reference = target.reference();
            PlatformsSummary {
                needed: resolved
                    .platforms
                    .get(&reference)
                    .cloned()
                    .unwrap_or_default(),
                declared: target.target.platforms.clone(),
                target: reference,
            }
        })
        .collect();

    for (from, to) in &resolved.incompatible {
        print_warning(&format!(
            "the condition on {} -> {} excludes every platform of {}",
            from.name, to.name, from.name
        ));
    }

    if json {
        let incompatible: Vec<serde_json::Value> = resolved
            .incompatible
            .iter()
            .map(|(from, to)| serde_json::json!({ "from": from, "to": to }))
            .collect();
        let report = serde_json::json!({
            "graph": graph.name,
            "targets": summaries,
            "incompatible": incompatible,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for summary in &summaries {
        let needed = if summary.needed.is_empty() {
            "-".to_string()
        } else {
            format_platforms(&summary.needed)
        };
        println!(
            "{:<28} {:<24} (declares {})",
            summary.target.name,
            needed,
            format_platforms(&summary.declared)
        );
    }
    Ok(())
}
