//! CLI command implementations

pub mod cache;
pub mod config;
pub mod graph;
pub mod query;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::debug;
use xcgraph_config::{ConfigLoader, XcgraphConfig};
use xcgraph_core::binary_cache::{ArtifactResolver, LocalArtifactStore};
use xcgraph_core::mappers::{default_pipeline, CacheMapper, GraphMapper};
use xcgraph_core::paths::{absolutize, absolutize_from_cwd};
use xcgraph_core::traverser::{GraphTarget, GraphTraverser};
use xcgraph_core::{Graph, GraphLoader, SideEffect, SystemMetadataProvider, TomlManifestLoader};

use crate::progress::{finish_spinner, finish_spinner_error, spinner};
use crate::GlobalOptions;

/// Resolve the graph root from options or current directory.
pub fn resolve_path(global: &GlobalOptions) -> Result<PathBuf> {
    let path = global.path.as_deref().unwrap_or(Path::new("."));
    let root = absolutize_from_cwd(path)
        .with_context(|| format!("Failed to resolve path {}", path.display()))?;
    if !root.is_dir() {
        bail!("Path '{}' is not a directory", root.display());
    }
    Ok(root)
}

/// Load configuration, from an explicit file when one is given.
pub fn load_config(global: &GlobalOptions, root: &Path) -> Result<XcgraphConfig> {
    let overrides = global.to_config_overrides();

    if let Some(ref config_path) = global.config {
        return ConfigLoader::new()
            .load_file(config_path, Some(&overrides))
            .with_context(|| format!("Failed to load config file {}", config_path.display()));
    }

    ConfigLoader::new()
        .load(root, Some(&overrides))
        .context("Failed to load configuration")
}

/// Load the graph rooted at `root`.
pub fn load_graph(root: &Path, quiet: bool) -> Result<Graph> {
    let pb = spinner(&format!("Loading graph at {}", root.display()), quiet);
    let loader = GraphLoader::new(TomlManifestLoader::new(), SystemMetadataProvider::new());

    match loader.load(root) {
        Ok(graph) => {
            finish_spinner(
                pb,
                &format!(
                    "Loaded {} ({} projects, {} nodes)",
                    graph.name,
                    graph.projects.len(),
                    graph.node_count()
                ),
            );
            Ok(graph)
        }
        Err(e) => {
            finish_spinner_error(pb, "Failed to load graph");
            Err(e).with_context(|| format!("Failed to load graph at {}", root.display()))
        }
    }
}

/// Build the artifact resolver over the configured cache directory.
pub fn artifact_resolver(config: &XcgraphConfig) -> Result<(Arc<LocalArtifactStore>, ArtifactResolver)> {
    let directory = config
        .cache_directory()
        .context("Failed to resolve cache directory")?;
    let store = Arc::new(LocalArtifactStore::new(directory));
    let resolver = ArtifactResolver::from_names(
        store.clone(),
        &config.cache.cacheable_products,
        &config.cache.sources,
    )
    .context("Invalid cache configuration")?;
    Ok((store, resolver))
}

/// Run the mapper pipeline, substituting cached binaries when `use_cache` is set.
pub async fn map_graph(
    graph: Graph,
    config: &XcgraphConfig,
    use_cache: bool,
) -> Result<(Graph, Vec<SideEffect>)> {
    let cache = if use_cache && config.cache.enabled {
        let (_, resolver) = artifact_resolver(config)?;
        let artifacts = resolver
            .resolve(&graph)
            .await
            .context("Failed to resolve cached artifacts")?;
        debug!("Resolved {} cached artifacts", artifacts.len());
        Some(CacheMapper::new(
            artifacts,
            config.cache.sources.clone(),
            Arc::new(SystemMetadataProvider::new()),
        ))
    } else {
        None
    };

    default_pipeline(config, cache)
        .map(graph)
        .context("Failed to map graph")
}

/// Find a target by name, optionally within the project at `project`.
///
/// Fails when the name is declared by more than one project and no project is given.
pub fn find_target<'g>(
    traverser: &GraphTraverser<'g>,
    root: &Path,
    name: &str,
    project: Option<&Path>,
) -> Result<GraphTarget<'g>> {
    if let Some(project) = project {
        let project = absolutize(root, project);
        return traverser.target(&project, name).with_context(|| {
            format!("Target '{}' not found in project {}", name, project.display())
        });
    }

    let matches: Vec<GraphTarget<'g>> = traverser
        .all_targets()
        .into_iter()
        .filter(|target| target.target.name == name)
        .collect();

    match matches.as_slice() {
        [] => bail!("Target '{}' not found", name),
        [target] => Ok(*target),
        _ => {
            let projects: Vec<String> = matches
                .iter()
                .map(|target| target.path.display().to_string())
                .collect();
            bail!(
                "Target '{}' is declared by several projects ({}); pass --project",
                name,
                projects.join(", ")
            )
        }
    }
}

/// Print a warning message to stderr.
pub fn print_warning(message: &str) {
    eprintln!("warning: {}", message);
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
