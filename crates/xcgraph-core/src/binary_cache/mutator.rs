//! Substitution of cached artifacts for targets.
//!
//! Starting from the targets the user wants to build from source, the mutator
//! walks down the graph and replaces every target dependency that has a cached
//! artifact, and whose target dependencies all have one too, by the artifact
//! itself. Replaced targets are tagged prunable so that tree-shaking removes them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{CacheError, Result};
use crate::graph::Graph;
use crate::metadata::MetadataProviding;
use crate::model::{LinkingStatus, PlatformCondition, Product, TargetReference};
use crate::node::{BundleNode, GraphNode, NodeKey};
use crate::traverser::{GraphTarget, GraphTraverser};

type Dependencies = Vec<(NodeKey, Option<PlatformCondition>)>;

#[derive(Default)]
struct MutationState {
    /// Artifact path of each target checked so far, `None` when it stays source.
    visited: HashMap<TargetReference, Option<PathBuf>>,
    loaded: BTreeMap<PathBuf, GraphNode>,
    source_targets: BTreeSet<TargetReference>,
    /// New outgoing edges of the targets that stay source.
    target_dependencies: BTreeMap<NodeKey, Dependencies>,
    /// Dependencies re-attached to loaded artifacts.
    artifact_dependencies: BTreeMap<NodeKey, Dependencies>,
    mapped: HashMap<NodeKey, Dependencies>,
}

fn push_unique(dependencies: &mut Dependencies, key: NodeKey, condition: Option<PlatformCondition>) {
    if !dependencies.iter().any(|(existing, _)| existing == &key) {
        dependencies.push((key, condition));
    }
}

/// Targets that must be built from source.
///
/// Configured sources are plain target names and match in every project. Targets
/// picked from the graph itself, such as entry targets, are exact references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTargets {
    pub names: BTreeSet<String>,
    pub references: BTreeSet<TargetReference>,
}

impl SourceTargets {
    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            names: names.into_iter().collect(),
            references: BTreeSet::new(),
        }
    }

    pub fn insert_reference(&mut self, reference: TargetReference) {
        self.references.insert(reference);
    }

    pub fn contains(&self, target: &GraphTarget<'_>) -> bool {
        self.names.contains(&target.target.name) || self.references.contains(&target.reference())
    }
}

/// Rewrites a graph to link cached artifacts instead of building targets.
pub struct CacheGraphMutator<'m> {
    metadata: &'m dyn MetadataProviding,
}

impl<'m> CacheGraphMutator<'m> {
    pub fn new(metadata: &'m dyn MetadataProviding) -> Self {
        Self { metadata }
    }

    /// Replace targets by their artifacts.
    ///
    /// `sources` selects the targets that must be built from source; the walk
    /// starts from them. Every target the walk does not keep is tagged prunable.
    pub fn map(
        &self,
        graph: Graph,
        artifacts: &BTreeMap<TargetReference, PathBuf>,
        sources: &SourceTargets,
    ) -> Result<Graph> {
        let mut state = MutationState::default();
        {
            let traverser = GraphTraverser::new(&graph);
            let user_sources: Vec<GraphTarget<'_>> = traverser
                .all_targets()
                .into_iter()
                .filter(|target| sources.contains(target))
                .collect();

            for target in user_sources {
                let key = target.key();
                state.source_targets.insert(target.reference());
                visit_bundle_targets(&traverser, &key, &mut state.visited);
                let dependencies =
                    self.map_dependencies(&traverser, &key, artifacts, sources, &mut state)?;
                state.target_dependencies.insert(key, dependencies);
            }
        }

        let mut graph = graph;
        for node in state.loaded.values() {
            graph.add_node(node.clone());
        }
        for (key, dependencies) in &state.target_dependencies {
            graph.set_dependencies(key, dependencies.clone())?;
        }
        for (artifact, dependencies) in &state.artifact_dependencies {
            for (dependency, condition) in dependencies {
                graph.add_edge(artifact, dependency, condition.clone())?;
            }
        }
        let keys: Vec<NodeKey> = state.target_dependencies.keys().cloned().collect();
        add_prebuilt_dependencies(&mut graph, &keys)?;

        let all_targets: Vec<TargetReference> = graph
            .projects
            .values()
            .flat_map(|project| {
                project
                    .targets
                    .iter()
                    .map(|target| TargetReference::new(project.path.clone(), target.name.clone()))
            })
            .collect();
        let mut replaced = 0;
        for reference in all_targets {
            if state.source_targets.contains(&reference) {
                continue;
            }
            if let Some(target) = graph
                .project_mut(&reference.project_path)
                .and_then(|project| project.target_mut(&reference.name))
            {
                target.mark_prunable();
                replaced += 1;
            }
        }

        info!(
            "Linked {} cached artifacts, {} targets no longer built from source",
            state.loaded.len(),
            replaced
        );
        Ok(graph)
    }

    fn map_dependencies(
        &self,
        traverser: &GraphTraverser<'_>,
        key: &NodeKey,
        artifacts: &BTreeMap<TargetReference, PathBuf>,
        sources: &SourceTargets,
        state: &mut MutationState,
    ) -> Result<Dependencies> {
        if let Some(mapped) = state.mapped.get(key) {
            return Ok(mapped.clone());
        }

        let mut result = Dependencies::new();
        for (node, edge) in traverser.graph().dependencies(key) {
            let dependency_key = node.key();
            let condition = edge.condition.clone();
            let Some(reference) = dependency_key.as_target() else {
                push_unique(&mut result, dependency_key, condition);
                continue;
            };
            let Some(target) = traverser.target(&reference.project_path, &reference.name) else {
                continue;
            };

            let artifact_path = if sources.contains(&target) {
                None
            } else {
                artifact_path(traverser, target, artifacts, &mut state.visited)
            };

            match artifact_path {
                None => {
                    state.source_targets.insert(reference);
                    visit_bundle_targets(traverser, &dependency_key, &mut state.visited);
                    let mapped = self.map_dependencies(
                        traverser,
                        &dependency_key,
                        artifacts,
                        sources,
                        state,
                    )?;
                    state
                        .target_dependencies
                        .insert(dependency_key.clone(), mapped);
                    push_unique(&mut result, dependency_key, condition);
                }
                Some(path) => {
                    let artifact = self.load_artifact(&path, &mut state.loaded)?;
                    debug!("Replacing {} with {}", reference, artifact);
                    let mapped = self.map_dependencies(
                        traverser,
                        &dependency_key,
                        artifacts,
                        sources,
                        state,
                    )?;
                    for (dependency, dependency_condition) in mapped {
                        // Static products are inside the artifact's binary already.
                        if matches!(
                            dependency,
                            NodeKey::Framework { .. }
                                | NodeKey::XCFramework { .. }
                                | NodeKey::Bundle { .. }
                                | NodeKey::Sdk { .. }
                        ) {
                            push_unique(
                                state
                                    .artifact_dependencies
                                    .entry(artifact.clone())
                                    .or_default(),
                                dependency,
                                dependency_condition,
                            );
                        }
                    }
                    push_unique(&mut result, artifact, condition);
                }
            }
        }

        state.mapped.insert(key.clone(), result.clone());
        Ok(result)
    }

    fn load_artifact(&self, path: &Path, loaded: &mut BTreeMap<PathBuf, GraphNode>) -> Result<NodeKey> {
        if let Some(node) = loaded.get(path) {
            return Ok(node.key());
        }

        let node = match path.extension().and_then(|e| e.to_str()) {
            Some("framework") => GraphNode::Framework(
                self.metadata
                    .load_framework(path)?
                    .into_node(LinkingStatus::Required),
            ),
            Some("xcframework") => GraphNode::XCFramework(
                self.metadata
                    .load_xcframework(path)?
                    .into_node(LinkingStatus::Required),
            ),
            Some("bundle") => self.load_bundle(path)?,
            _ => {
                if let Ok(metadata) = self.metadata.load_framework(path) {
                    GraphNode::Framework(metadata.into_node(LinkingStatus::Required))
                } else if let Ok(metadata) = self.metadata.load_xcframework(path) {
                    GraphNode::XCFramework(metadata.into_node(LinkingStatus::Required))
                } else {
                    self.load_bundle(path)?
                }
            }
        };

        let key = node.key();
        loaded.insert(path.to_path_buf(), node);
        Ok(key)
    }

    fn load_bundle(&self, path: &Path) -> Result<GraphNode> {
        if !path.exists() {
            return Err(CacheError::ArtifactNotFound(path.to_path_buf()));
        }
        Ok(GraphNode::Bundle(BundleNode {
            path: path.to_path_buf(),
        }))
    }
}

/// The artifact a target can be replaced with: it needs one itself, and so does
/// every target it depends on.
fn artifact_path(
    traverser: &GraphTraverser<'_>,
    target: GraphTarget<'_>,
    artifacts: &BTreeMap<TargetReference, PathBuf>,
    visited: &mut HashMap<TargetReference, Option<PathBuf>>,
) -> Option<PathBuf> {
    let reference = target.reference();
    if let Some(visited) = visited.get(&reference) {
        return visited.clone();
    }

    let path = artifacts.get(&reference).and_then(|path| {
        let dependencies = traverser.direct_target_dependencies(target.path, &target.target.name);
        dependencies
            .iter()
            .all(|dependency| artifact_path(traverser, dependency.target, artifacts, visited).is_some())
            .then(|| path.clone())
    });
    visited.insert(reference, path.clone());
    path
}

/// Keep the resource bundles of a source target as source, so they stay editable.
fn visit_bundle_targets(
    traverser: &GraphTraverser<'_>,
    key: &NodeKey,
    visited: &mut HashMap<TargetReference, Option<PathBuf>>,
) {
    for (node, _) in traverser.graph().dependencies(key) {
        let Some(reference) = node.key().as_target() else {
            continue;
        };
        let is_bundle = traverser
            .graph()
            .target(&reference)
            .is_some_and(|target| target.product == Product::Bundle);
        if is_bundle {
            visited.insert(reference, None);
        }
    }
}

/// Runnable and unit-test targets must link the prebuilt binaries their static
/// framework dependencies were built against.
fn add_prebuilt_dependencies(graph: &mut Graph, keys: &[NodeKey]) -> Result<()> {
    let mut additions = Vec::new();
    {
        let traverser = GraphTraverser::new(graph);
        for key in keys {
            let Some(target) = key.as_target().and_then(|r| graph.target(&r)) else {
                continue;
            };
            if !(target.product.runnable() || target.product == Product::UnitTests) {
                continue;
            }
            for (node, _) in graph.dependencies(key) {
                let is_static_framework = node
                    .key()
                    .as_target()
                    .and_then(|r| graph.target(&r))
                    .is_some_and(|t| t.product == Product::StaticFramework);
                if !is_static_framework {
                    continue;
                }
                for prebuilt in traverser.prebuilt_dependencies(&node.key()) {
                    additions.push((key.clone(), prebuilt));
                }
            }
        }
    }

    for (from, to) in additions {
        if graph.edge(&from, &to).is_none() {
            graph.add_edge(&from, &to, None)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        FrameworkMetadata, LibraryMetadata, MetadataError, XCFrameworkMetadata,
    };
    use crate::model::{Platform, Project, Target, Workspace};
    use crate::node::{BinaryArchitecture, BinaryLinking, LibraryNode, SdkNode};
    use std::sync::Arc;

    const ROOT: &str = "/repo/App";

    struct StubMetadata;

    impl MetadataProviding for StubMetadata {
        fn load_framework(&self, path: &Path) -> crate::metadata::Result<FrameworkMetadata> {
            if path.extension().is_some_and(|e| e == "framework") {
                Ok(FrameworkMetadata {
                    path: path.to_path_buf(),
                    binary_path: path.join("Binary"),
                    dsym_path: None,
                    linking: BinaryLinking::Dynamic,
                    architectures: vec![BinaryArchitecture::Arm64],
                    is_carthage: false,
                })
            } else {
                Err(MetadataError::BinaryNotFound(path.to_path_buf()))
            }
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

    fn graph(targets: Vec<Target>, edges: &[(&str, &str)]) -> Graph {
        let project = Project::new(ROOT, "App", targets);
        let mut graph = Graph::new("App", ROOT, Workspace::new(ROOT, "App", vec![]));
        for target in &project.targets {
            graph.add_node(GraphNode::target(ROOT, target.name.clone()));
        }
        graph.add_project(Arc::new(project));
        for (from, to) in edges {
            graph.add_edge(&key(from), &key(to), None).unwrap();
        }
        graph
    }

    fn key(name: &str) -> NodeKey {
        NodeKey::target(ROOT, name)
    }

    fn reference(name: &str) -> TargetReference {
        TargetReference::new(ROOT, name)
    }

    fn cached(names: &[&str]) -> BTreeMap<TargetReference, PathBuf> {
        names
            .iter()
            .map(|name| {
                (
                    reference(name),
                    PathBuf::from(format!("/cache/{name}/hash/{name}.framework")),
                )
            })
            .collect()
    }

    fn artifact_key(name: &str) -> NodeKey {
        NodeKey::Framework {
            path: PathBuf::from(format!("/cache/{name}/hash/{name}.framework")),
        }
    }

    fn sources(names: &[&str]) -> SourceTargets {
        SourceTargets::from_names(names.iter().map(|n| n.to_string()))
    }

    fn dependency_keys(graph: &Graph, key: &NodeKey) -> Vec<NodeKey> {
        graph
            .dependencies(key)
            .into_iter()
            .map(|(node, _)| node.key())
            .collect()
    }

    fn is_prunable(graph: &Graph, name: &str) -> bool {
        graph.target(&reference(name)).unwrap().is_prunable()
    }

    fn framework(name: &str) -> Target {
        Target::new(name, Product::Framework, [Platform::IOS])
    }

    #[test]
    fn test_replaces_fully_cached_chain() {
        let graph = graph(
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                framework("Core"),
                framework("Util"),
            ],
            &[("App", "Core"), ("Core", "Util")],
        );

        let graph = CacheGraphMutator::new(&StubMetadata)
            .map(graph, &cached(&["Core", "Util"]), &sources(&["App"]))
            .unwrap();

        assert_eq!(dependency_keys(&graph, &key("App")), vec![artifact_key("Core")]);
        assert_eq!(
            dependency_keys(&graph, &artifact_key("Core")),
            vec![artifact_key("Util")]
        );
        assert!(!is_prunable(&graph, "App"));
        assert!(is_prunable(&graph, "Core"));
        assert!(is_prunable(&graph, "Util"));
    }

    #[test]
    fn test_keeps_target_whose_dependency_is_not_cached() {
        let graph = graph(
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                framework("Core"),
                framework("Util"),
            ],
            &[("App", "Core"), ("Core", "Util")],
        );

        let graph = CacheGraphMutator::new(&StubMetadata)
            .map(graph, &cached(&["Core"]), &sources(&["App"]))
            .unwrap();

        assert_eq!(dependency_keys(&graph, &key("App")), vec![key("Core")]);
        assert_eq!(dependency_keys(&graph, &key("Core")), vec![key("Util")]);
        assert!(!is_prunable(&graph, "Core"));
        assert!(!is_prunable(&graph, "Util"));
    }

    #[test]
    fn test_sources_are_never_replaced() {
        let graph = graph(
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                framework("Core"),
            ],
            &[("App", "Core")],
        );

        let graph = CacheGraphMutator::new(&StubMetadata)
            .map(graph, &cached(&["Core"]), &sources(&["App", "Core"]))
            .unwrap();

        assert_eq!(dependency_keys(&graph, &key("App")), vec![key("Core")]);
        assert!(!is_prunable(&graph, "Core"));
    }

    #[test]
    fn test_static_dependencies_are_dropped_and_sdks_reattached() {
        let mut graph = graph(
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                framework("Core"),
            ],
            &[("App", "Core")],
        );
        let library = GraphNode::Library(LibraryNode {
            path: PathBuf::from("/x/libStatic.a"),
            public_headers: PathBuf::from("/x/headers"),
            architectures: vec![BinaryArchitecture::Arm64],
            linking: BinaryLinking::Static,
            swift_module_map: None,
        });
        let sdk = NodeKey::Sdk {
            path: PathBuf::from("/System/Library/Frameworks/UIKit.framework"),
            status: LinkingStatus::Required,
        };
        let library_key = library.key();
        graph.add_node(library);
        graph.add_node(GraphNode::Sdk(
            SdkNode::resolve("UIKit.framework", LinkingStatus::Required).unwrap(),
        ));
        graph.add_edge(&key("Core"), &library_key, None).unwrap();
        graph.add_edge(&key("Core"), &sdk, None).unwrap();

        let graph = CacheGraphMutator::new(&StubMetadata)
            .map(graph, &cached(&["Core"]), &sources(&["App"]))
            .unwrap();

        assert_eq!(dependency_keys(&graph, &artifact_key("Core")), vec![sdk]);
    }

    #[test]
    fn test_edge_conditions_are_preserved() {
        let mut graph = graph(
            vec![
                Target::new("App", Product::App, [Platform::IOS, Platform::MacOS]),
                framework("Core"),
            ],
            &[],
        );
        let ios = PlatformCondition::when([Platform::IOS]);
        graph.add_edge(&key("App"), &key("Core"), ios.clone()).unwrap();

        let graph = CacheGraphMutator::new(&StubMetadata)
            .map(graph, &cached(&["Core"]), &sources(&["App"]))
            .unwrap();

        assert_eq!(
            graph.edge(&key("App"), &artifact_key("Core")).unwrap().condition,
            ios
        );
    }

    #[test]
    fn test_bundles_of_source_targets_stay_source() {
        let graph = graph(
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                Target::new("Resources", Product::Bundle, [Platform::IOS]),
            ],
            &[("App", "Resources")],
        );
        let artifacts = BTreeMap::from([(
            reference("Resources"),
            PathBuf::from("/cache/Resources/hash/Resources.bundle"),
        )]);

        let graph = CacheGraphMutator::new(&StubMetadata)
            .map(graph, &artifacts, &sources(&["App"]))
            .unwrap();

        assert_eq!(dependency_keys(&graph, &key("App")), vec![key("Resources")]);
        assert!(!is_prunable(&graph, "Resources"));
    }

    #[test]
    fn test_runnable_targets_link_prebuilt_dependencies_of_static_frameworks() {
        let graph = graph(
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                Target::new("Feature", Product::StaticFramework, [Platform::IOS]),
                framework("Net"),
            ],
            &[("App", "Feature"), ("Feature", "Net")],
        );

        let graph = CacheGraphMutator::new(&StubMetadata)
            .map(graph, &cached(&["Net"]), &sources(&["App"]))
            .unwrap();

        assert_eq!(dependency_keys(&graph, &key("Feature")), vec![artifact_key("Net")]);
        assert_eq!(
            dependency_keys(&graph, &key("App")),
            vec![key("Feature"), artifact_key("Net")]
        );
    }

    #[test]
    fn test_missing_bundle_artifact_fails() {
        let graph = graph(
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                framework("Core"),
            ],
            &[("App", "Core")],
        );
        let artifacts = BTreeMap::from([(reference("Core"), PathBuf::from("/nowhere/Core.bundle"))]);

        let err = CacheGraphMutator::new(&StubMetadata)
            .map(graph, &artifacts, &sources(&["App"]))
            .unwrap_err();

        assert!(matches!(err, CacheError::ArtifactNotFound(_)));
    }
}
