use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{GraphMapper, Result};
use crate::binary_cache::{CacheGraphMutator, SourceTargets};
use crate::graph::Graph;
use crate::metadata::MetadataProviding;
use crate::model::TargetReference;
use crate::side_effects::SideEffect;

/// Links cached artifacts in place of the targets they were built from.
///
/// Artifacts are resolved beforehand, usually by
/// [`ArtifactResolver`](crate::binary_cache::ArtifactResolver), so mapping stays
/// synchronous. Entry targets without an artifact are always built from source.
pub struct CacheMapper {
    artifacts: BTreeMap<TargetReference, PathBuf>,
    sources: BTreeSet<String>,
    metadata: Arc<dyn MetadataProviding>,
}

impl CacheMapper {
    pub fn new(
        artifacts: BTreeMap<TargetReference, PathBuf>,
        sources: impl IntoIterator<Item = String>,
        metadata: Arc<dyn MetadataProviding>,
    ) -> Self {
        Self {
            artifacts,
            sources: sources.into_iter().collect(),
            metadata,
        }
    }

    /// Targets kept as source for `graph`: the configured names plus every
    /// entry target without an artifact.
    pub fn sources(&self, graph: &Graph) -> SourceTargets {
        let mut sources = SourceTargets::from_names(self.sources.iter().cloned());
        for key in &graph.entry_nodes {
            let Some(reference) = key.as_target() else {
                continue;
            };
            if !self.artifacts.contains_key(&reference) {
                sources.insert_reference(reference);
            }
        }
        sources
    }
}

impl GraphMapper for CacheMapper {
    fn name(&self) -> &str {
        "cache"
    }

    fn map(&self, graph: Graph) -> Result<(Graph, Vec<SideEffect>)> {
        if self.artifacts.is_empty() {
            debug!("No cached artifacts, building every target from source");
            return Ok((graph, Vec::new()));
        }

        let sources = self.sources(&graph);
        debug!("Building from source: {:?}", sources);
        let graph = CacheGraphMutator::new(self.metadata.as_ref()).map(
            graph,
            &self.artifacts,
            &sources,
        )?;
        Ok((graph, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::{SequentialGraphMapper, TreeShakePrunedTargetsMapper};
    use crate::metadata::{
        FrameworkMetadata, LibraryMetadata, MetadataError, SystemMetadataProvider,
        XCFrameworkMetadata,
    };
    use crate::model::{Platform, Product, Project, Target, Workspace};
    use crate::node::{BinaryArchitecture, BinaryLinking, GraphNode, NodeKey};
    use std::path::Path;
    use tempfile::TempDir;

    fn graph(root: &std::path::Path) -> Graph {
        let project = Project::new(
            root,
            "App",
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                Target::new("Resources", Product::Bundle, [Platform::IOS]),
            ],
        );
        let mut graph = Graph::new("App", root, Workspace::new(root, "App", vec![]));
        for target in &project.targets {
            graph.add_node(GraphNode::target(root, target.name.clone()));
        }
        graph.add_project(Arc::new(project));
        graph
            .add_edge(
                &NodeKey::target(root, "App"),
                &NodeKey::target(root, "Resources"),
                None,
            )
            .unwrap();
        graph.entry_nodes.insert(NodeKey::target(root, "App"));
        graph
    }

    #[test]
    fn test_entry_targets_without_artifacts_are_sources() {
        let temp = TempDir::new().unwrap();
        let graph = graph(temp.path());
        let mapper = CacheMapper::new(
            BTreeMap::new(),
            ["Extra".to_string()],
            Arc::new(SystemMetadataProvider::new()),
        );

        let sources = mapper.sources(&graph);
        assert_eq!(sources.names, BTreeSet::from(["Extra".to_string()]));
        assert_eq!(
            sources.references,
            BTreeSet::from([TargetReference::new(temp.path(), "App")])
        );
    }

    #[test]
    fn test_no_artifacts_leaves_graph_untouched() {
        let temp = TempDir::new().unwrap();
        let mapper = CacheMapper::new(
            BTreeMap::new(),
            Vec::new(),
            Arc::new(SystemMetadataProvider::new()),
        );

        let (graph, side_effects) = mapper.map(graph(temp.path())).unwrap();

        assert!(side_effects.is_empty());
        assert!(graph
            .project(temp.path())
            .unwrap()
            .targets
            .iter()
            .all(|t| !t.is_prunable()));
    }

    struct FrameworkMetadataStub;

    impl MetadataProviding for FrameworkMetadataStub {
        fn load_framework(&self, path: &Path) -> crate::metadata::Result<FrameworkMetadata> {
            Ok(FrameworkMetadata {
                path: path.to_path_buf(),
                binary_path: path.join("Core"),
                dsym_path: None,
                linking: BinaryLinking::Dynamic,
                architectures: vec![BinaryArchitecture::Arm64],
                is_carthage: false,
            })
        }

        fn load_library(
            &self,
            path: &Path,
            _public_headers: &Path,
            _swift_module_map: Option<&Path>,
        ) -> crate::metadata::Result<LibraryMetadata> {
            Err(MetadataError::BinaryNotFound(path.to_path_buf()))
        }

        fn load_xcframework(&self, path: &Path) -> crate::metadata::Result<XCFrameworkMetadata> {
            Err(MetadataError::XCFrameworkLibrariesNotFound(path.to_path_buf()))
        }
    }

    #[test]
    fn test_cached_framework_is_linked_and_target_shaken() {
        let root = Path::new("/repo/App");
        let project = Project::new(
            root,
            "App",
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                Target::new("Core", Product::Framework, [Platform::IOS]),
            ],
        );
        let mut graph = Graph::new("App", root, Workspace::new(root, "App", vec![]));
        graph.add_node(GraphNode::target(root, "App"));
        graph.add_node(GraphNode::target(root, "Core"));
        graph.add_project(Arc::new(project));
        let app = NodeKey::target(root, "App");
        graph.add_edge(&app, &NodeKey::target(root, "Core"), None).unwrap();
        graph.entry_nodes.insert(app.clone());

        let artifact = PathBuf::from("/cache/Core/abc/Core.framework");
        let artifacts = BTreeMap::from([(TargetReference::new(root, "Core"), artifact.clone())]);
        let pipeline = SequentialGraphMapper::default()
            .with(CacheMapper::new(
                artifacts,
                Vec::new(),
                Arc::new(FrameworkMetadataStub),
            ))
            .with(TreeShakePrunedTargetsMapper);

        let (graph, _) = pipeline.map(graph).unwrap();

        let dependencies: Vec<NodeKey> = graph
            .dependencies(&app)
            .into_iter()
            .map(|(node, _)| node.key())
            .collect();
        assert_eq!(dependencies, vec![NodeKey::Framework { path: artifact }]);
        assert!(graph.target(&TargetReference::new(root, "Core")).is_none());
        assert!(graph.target(&TargetReference::new(root, "App")).is_some());
    }

    #[test]
    fn test_entry_source_does_not_shadow_same_named_target_elsewhere() {
        let root = Path::new("/repo/App");
        let package = Path::new("/repo/Packages/Kit");
        let mut graph = Graph::new("App", root, Workspace::new(root, "App", vec![]));
        let projects = [
            Project::new(
                root,
                "App",
                vec![
                    Target::new("App", Product::App, [Platform::IOS]),
                    Target::new("Core", Product::Framework, [Platform::IOS]),
                ],
            ),
            Project::new(
                package,
                "Kit",
                vec![Target::new("Core", Product::Framework, [Platform::IOS])],
            )
            .external(),
        ];
        for project in projects {
            for target in &project.targets {
                graph.add_node(GraphNode::target(project.path.clone(), target.name.clone()));
            }
            graph.add_project(Arc::new(project));
        }
        let app = NodeKey::target(root, "App");
        let local_core = NodeKey::target(root, "Core");
        graph.add_edge(&app, &NodeKey::target(package, "Core"), None).unwrap();
        graph.entry_nodes.insert(app.clone());
        graph.entry_nodes.insert(local_core.clone());

        let artifact = PathBuf::from("/cache/Core/abc/Core.framework");
        let artifacts =
            BTreeMap::from([(TargetReference::new(package, "Core"), artifact.clone())]);
        let mapper = CacheMapper::new(artifacts, Vec::new(), Arc::new(FrameworkMetadataStub));

        let (graph, _) = SequentialGraphMapper::default()
            .with(mapper)
            .with(TreeShakePrunedTargetsMapper)
            .map(graph)
            .unwrap();

        let dependencies: Vec<NodeKey> = graph
            .dependencies(&app)
            .into_iter()
            .map(|(node, _)| node.key())
            .collect();
        assert_eq!(dependencies, vec![NodeKey::Framework { path: artifact }]);
        assert!(graph.target(&TargetReference::new(package, "Core")).is_none());
        assert!(graph.target(&TargetReference::new(root, "Core")).is_some());
    }
}
