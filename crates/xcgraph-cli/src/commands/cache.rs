//! Cache command - Inspect and fill the binary cache
//!
//! - `hashes`: content hash of every target
//! - `status`: which cacheable targets have a stored artifact
//! - `store`: put a built artifact in the cache under its target's hash

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use xcgraph_core::binary_cache::{ArtifactStore, TargetContentHasher};
use xcgraph_core::paths::absolutize_from_cwd;
use xcgraph_core::traverser::GraphTraverser;

use super::{artifact_resolver, find_target, load_config, load_graph, print_info, resolve_path};
use crate::progress::{finish_spinner, finish_spinner_warn, spinner};
use crate::GlobalOptions;

/// Binary cache commands
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Print the content hash of every target
    Hashes(HashesArgs),

    /// Show which cacheable targets have a cached artifact
    Status(StatusArgs),

    /// Store a built artifact for a target
    Store(StoreArgs),
}

#[derive(Args, Debug)]
pub struct HashesArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Target the artifact was built from
    target: String,

    /// Built .framework, .xcframework or .bundle
    artifact: PathBuf,

    /// Directory of the declaring project, relative to --path
    #[arg(long)]
    project: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TargetHash {
    name: String,
    project: PathBuf,
    hash: String,
}

/// Execute the cache command
pub async fn execute(cmd: CacheCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        CacheCommand::Hashes(args) => execute_hashes(args, global),
        CacheCommand::Status(args) => execute_status(args, global).await,
        CacheCommand::Store(args) => execute_store(args, global).await,
    }
}

fn execute_hashes(args: HashesArgs, global: GlobalOptions) -> Result<()> {
    let root = resolve_path(&global)?;
    let graph = load_graph(&root, global.quiet || args.json)?;

    let hashes: Vec<TargetHash> = TargetContentHasher::new()
        .hash_graph(&graph)
        .context("Failed to hash targets")?
        .into_iter()
        .map(|(reference, hash)| TargetHash {
            name: reference.name,
            project: reference.project_path,
            hash,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hashes)?);
    } else {
        for entry in &hashes {
            println!("{}  {:<28} {}", entry.hash, entry.name, entry.project.display());
        }
    }
    Ok(())
}

async fn execute_status(args: StatusArgs, global: GlobalOptions) -> Result<()> {
    let root = resolve_path(&global)?;
    let config = load_config(&global, &root)?;
    let graph = load_graph(&root, global.quiet || args.json)?;
    let (store, resolver) = artifact_resolver(&config)?;

    let pb = spinner("Checking cached artifacts", global.quiet || args.json);
    let statuses = resolver
        .status(&graph)
        .await
        .context("Failed to look up cached artifacts")?;
    let hits = statuses
        .iter()
        .filter(|status| status.artifact.is_some())
        .count();
    let summary = format!("{}/{} targets cached", hits, statuses.len());
    if hits == statuses.len() {
        finish_spinner(pb, &summary);
    } else {
        finish_spinner_warn(pb, &summary);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    print_info(
        &format!("Cache directory: {}", store.root().display()),
        global.quiet,
    );
    for status in &statuses {
        let state = match status.artifact {
            Some(ref artifact) => format!("hit  {}", artifact.display()),
            None => "miss".to_string(),
        };
        println!("{:<28} {}  {}", status.target.name, status.hash, state);
    }
    Ok(())
}

async fn execute_store(args: StoreArgs, global: GlobalOptions) -> Result<()> {
    let root = resolve_path(&global)?;
    let config = load_config(&global, &root)?;
    let graph = load_graph(&root, global.quiet)?;
    let traverser = GraphTraverser::new(&graph);
    let target = find_target(&traverser, &root, &args.target, args.project.as_deref())?;
    let reference = target.reference();

    let artifact = absolutize_from_cwd(&args.artifact)
        .with_context(|| format!("Failed to resolve {}", args.artifact.display()))?;
    if !artifact.exists() {
        anyhow::bail!("Artifact '{}' does not exist", artifact.display());
    }

    let hash = TargetContentHasher::new()
        .hash_target(&graph, &reference)
        .with_context(|| format!("Failed to hash {}", reference.name))?;
    let (store, _) = artifact_resolver(&config)?;
    let stored = store
        .store(&hash, &reference.name, &artifact)
        .await
        .with_context(|| format!("Failed to store {}", artifact.display()))?;

    println!("Stored {} ({}) at {}", reference.name, hash, stored.display());
    Ok(())
}
