//! Graph command - Load the graph and run the mapper pipeline

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use xcgraph_core::model::format_platforms;
use xcgraph_core::{Graph, GraphDocument, SideEffect, SideEffectExecutor};

use super::{load_config, load_graph, map_graph, print_info, resolve_path};
use crate::GlobalOptions;

/// Arguments for the graph command
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Build every target from source
    #[arg(long)]
    no_cache: bool,

    /// Report side effects without applying them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Serialize)]
struct GraphReport<'a> {
    graph: GraphDocument,
    side_effects: &'a [SideEffect],
}

/// Execute the graph command
pub async fn execute(args: GraphArgs, global: GlobalOptions) -> Result<()> {
    let root = resolve_path(&global)?;
    let config = load_config(&global, &root)?;
    let graph = load_graph(&root, global.quiet || args.json)?;

    let (graph, side_effects) = map_graph(graph, &config, !args.no_cache).await?;

    let executor = if args.dry_run {
        SideEffectExecutor::dry_run()
    } else {
        SideEffectExecutor::new()
    };
    executor
        .execute(&side_effects)
        .context("Failed to apply side effects")?;

    if args.json {
        let report = GraphReport {
            graph: graph.to_document(),
            side_effects: &side_effects,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&graph, &side_effects, args.dry_run);
        print_info(
            &format!("{} side effects applied", side_effects.len()),
            global.quiet || args.dry_run,
        );
    }

    Ok(())
}

fn print_summary(graph: &Graph, side_effects: &[SideEffect], dry_run: bool) {
    println!("{} ({})", graph.name, graph.path.display());
    println!(
        "  {} projects, {} nodes, {} edges",
        graph.projects.len(),
        graph.node_count(),
        graph.edge_count()
    );

    for project in graph.projects.values() {
        let kind = if project.is_external() {
            " [external]"
        } else {
            ""
        };
        println!();
        println!("{}{} ({})", project.name, kind, project.path.display());
        for target in &project.targets {
            println!(
                "  {:<28} {:<20} {}",
                target.name,
                target.product.as_str(),
                format_platforms(&target.platforms)
            );
        }
    }

    if !side_effects.is_empty() {
        println!();
        println!(
            "Side effects{}:",
            if dry_run { " (dry run)" } else { "" }
        );
        for side_effect in side_effects {
            println!("  {}", side_effect);
        }
    }
}
