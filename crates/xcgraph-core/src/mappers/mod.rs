//! Graph mappers.
//!
//! A mapper is a pure transformation `Graph -> (Graph, Vec<SideEffect>)`. Mappers
//! run in a fixed order through [`SequentialGraphMapper`], which validates the
//! graph after every step and collects the side effects. Nothing is written to
//! disk until the caller executes the collected side effects.

mod cache;
mod external_paths;
mod platform;
mod prune;

pub use cache::CacheMapper;
pub use external_paths::ExternalDependencyPathMapper;
pub use platform::ExternalProjectsPlatformNarrowerMapper;
pub use prune::{PruneOrphanExternalTargetsMapper, TreeShakePrunedTargetsMapper};

use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};
use xcgraph_config::XcgraphConfig;

use crate::binary_cache::CacheError;
use crate::graph::{Graph, GraphError};
use crate::model::TargetReference;
use crate::side_effects::SideEffect;

/// Errors raised by graph mappers.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error(
        "The dependency of {from} on {to} has a platform condition that shares no platform with {}",
        from.name
    )]
    IncompatiblePlatformCondition {
        from: TargetReference,
        to: TargetReference,
    },

    #[error("Mapper '{mapper}' produced an invalid graph: {source}")]
    InvalidGraph {
        mapper: String,
        #[source]
        source: GraphError,
    },

    #[error("Project at {} is not in the graph", .0.display())]
    ProjectNotFound(PathBuf),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result type for mappers
pub type Result<T> = std::result::Result<T, MapperError>;

/// A graph transformation.
pub trait GraphMapper: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn map(&self, graph: Graph) -> Result<(Graph, Vec<SideEffect>)>;
}

/// Runs mappers one after the other, threading the graph through.
#[derive(Default)]
pub struct SequentialGraphMapper {
    mappers: Vec<Box<dyn GraphMapper>>,
}

impl SequentialGraphMapper {
    pub fn new(mappers: Vec<Box<dyn GraphMapper>>) -> Self {
        Self { mappers }
    }

    /// Append a mapper to the pipeline.
    pub fn with(mut self, mapper: impl GraphMapper + 'static) -> Self {
        self.mappers.push(Box::new(mapper));
        self
    }

    /// Names of the mappers, in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.mappers.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

impl GraphMapper for SequentialGraphMapper {
    fn name(&self) -> &str {
        "sequential"
    }

    fn map(&self, graph: Graph) -> Result<(Graph, Vec<SideEffect>)> {
        let mut graph = graph;
        let mut side_effects = Vec::new();

        for mapper in &self.mappers {
            debug!("Running mapper '{}' on graph {}", mapper.name(), graph.name);
            let (mapped, effects) = mapper.map(graph)?;
            mapped
                .validate()
                .map_err(|source| MapperError::InvalidGraph {
                    mapper: mapper.name().to_string(),
                    source,
                })?;
            debug!(
                "Mapper '{}' finished: {} nodes, {} side effects",
                mapper.name(),
                mapped.node_count(),
                effects.len()
            );
            graph = mapped;
            side_effects.extend(effects);
        }

        info!(
            "Mapped graph {} through {} mappers ({} side effects)",
            graph.name,
            self.mappers.len(),
            side_effects.len()
        );
        Ok((graph, side_effects))
    }
}

/// The standard pipeline: narrow, substitute cached binaries, prune, tree-shake,
/// then relocate external projects.
pub fn default_pipeline(config: &XcgraphConfig, cache: Option<CacheMapper>) -> SequentialGraphMapper {
    let mut pipeline = SequentialGraphMapper::default();

    if config.narrowing.enabled {
        pipeline = pipeline.with(ExternalProjectsPlatformNarrowerMapper::new(
            config.narrowing.on_incompatible,
        ));
    }
    if let Some(cache) = cache {
        pipeline = pipeline.with(cache);
    }

    pipeline
        .with(PruneOrphanExternalTargetsMapper)
        .with(TreeShakePrunedTargetsMapper)
        .with(ExternalDependencyPathMapper::new(
            config.generation.external_projects_directory.clone(),
            config.generation.derived_directory_name.clone(),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Platform, Product, Project, Target, Workspace};
    use crate::node::GraphNode;
    use std::sync::Arc;

    struct RenameMapper;

    impl GraphMapper for RenameMapper {
        fn name(&self) -> &str {
            "rename"
        }

        fn map(&self, mut graph: Graph) -> Result<(Graph, Vec<SideEffect>)> {
            graph.name = format!("{}-renamed", graph.name);
            Ok((
                graph,
                vec![SideEffect::Directory {
                    path: PathBuf::from("/tmp/renamed"),
                }],
            ))
        }
    }

    struct GhostNodeMapper;

    impl GraphMapper for GhostNodeMapper {
        fn name(&self) -> &str {
            "ghost"
        }

        fn map(&self, mut graph: Graph) -> Result<(Graph, Vec<SideEffect>)> {
            graph.add_node(GraphNode::target("/app", "Ghost"));
            Ok((graph, vec![]))
        }
    }

    fn graph() -> Graph {
        let mut graph = Graph::new("App", "/app", Workspace::new("/app", "App", vec![]));
        graph.add_project(Arc::new(Project::new(
            "/app",
            "App",
            vec![Target::new("App", Product::App, [Platform::IOS])],
        )));
        graph.add_node(GraphNode::target("/app", "App"));
        graph
    }

    #[test]
    fn test_sequential_threads_graph_and_collects_side_effects() {
        let pipeline = SequentialGraphMapper::default()
            .with(RenameMapper)
            .with(RenameMapper);

        let (graph, side_effects) = pipeline.map(graph()).unwrap();

        assert_eq!(graph.name, "App-renamed-renamed");
        assert_eq!(side_effects.len(), 2);
    }

    #[test]
    fn test_sequential_rejects_invalid_graph() {
        let pipeline = SequentialGraphMapper::default()
            .with(GhostNodeMapper)
            .with(RenameMapper);

        let err = pipeline.map(graph()).unwrap_err();

        match err {
            MapperError::InvalidGraph { mapper, .. } => assert_eq!(mapper, "ghost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_pipeline_order() {
        let pipeline = default_pipeline(&XcgraphConfig::default(), None);
        assert_eq!(
            pipeline.names(),
            vec![
                "external-projects-platform-narrower",
                "prune-orphan-external-targets",
                "tree-shake-pruned-targets",
                "external-dependency-path",
            ]
        );
    }

    #[test]
    fn test_default_pipeline_without_narrowing() {
        let mut config = XcgraphConfig::default();
        config.narrowing.enabled = false;

        let pipeline = default_pipeline(&config, None);

        assert_eq!(pipeline.len(), 3);
        assert!(!pipeline
            .names()
            .contains(&"external-projects-platform-narrower"));
    }
}
