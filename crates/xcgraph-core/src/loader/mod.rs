//! Graph loading.
//!
//! [`GraphLoader`] turns a workspace or project manifest into a [`Graph`] by
//! resolving every declared dependency depth-first. Each top-level call creates a
//! fresh [`GraphLoaderCache`] and [`CircularDependencyDetector`] and threads them
//! through the recursion, so nothing leaks from one load into the next.
//!
//! Target nodes are inserted into the graph before their dependencies are
//! resolved; the detector, not the cache, is what catches true cycles.
//!
//! Configs are the exception: [`GraphLoader::load_config`] memoizes them for the
//! lifetime of the loader.

mod cache;
mod detector;

pub use cache::GraphLoaderCache;
pub use detector::CircularDependencyDetector;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{Graph, GraphError};
use crate::manifest::{Manifest, ManifestError, ManifestLoading};
use crate::metadata::{MetadataError, MetadataProviding};
use crate::model::{
    Config, LinkingStatus, Project, TargetDependency, TargetReference, Workspace,
};
use crate::node::{GraphNode, NodeKey, PackageProductNode, SdkError, SdkNode};
use crate::paths::normalize;

/// Errors raised while loading a graph. All of them abort the load.
#[derive(Debug, Error)]
pub enum GraphLoadingError {
    #[error("Couldn't find a workspace or project manifest at {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Target '{name}' can't be found in the project at {}", .path.display())]
    TargetNotFound { name: String, path: PathBuf },

    #[error(
        "Found circular dependency between {from} and {to}: {}",
        format_cycle(.cycle)
    )]
    CircularDependency {
        from: TargetReference,
        to: TargetReference,
        cycle: Vec<TargetReference>,
    },

    #[error("Couldn't find framework at {}", .0.display())]
    FrameworkNotFound(PathBuf),

    #[error("Couldn't find xcframework at {}", .0.display())]
    XCFrameworkNotFound(PathBuf),

    #[error("Couldn't find library at {}", .0.display())]
    LibraryNotFound(PathBuf),

    #[error("Couldn't find the public headers at {}", .0.display())]
    PublicHeadersNotFound(PathBuf),

    #[error("Couldn't find the Swift module map at {}", .0.display())]
    SwiftModuleMapNotFound(PathBuf),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Result type for loading operations
pub type Result<T> = std::result::Result<T, GraphLoadingError>;

/// Render a cycle as `a -> b -> a`.
pub fn format_cycle(cycle: &[TargetReference]) -> String {
    cycle
        .iter()
        .map(|reference| reference.name.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Loads graphs from manifests.
pub struct GraphLoader<M, P> {
    manifest_loader: M,
    metadata_provider: P,
    configs: Mutex<GraphLoaderCache>,
}

impl<M: ManifestLoading, P: MetadataProviding> GraphLoader<M, P> {
    pub fn new(manifest_loader: M, metadata_provider: P) -> Self {
        Self {
            manifest_loader,
            metadata_provider,
            configs: Mutex::new(GraphLoaderCache::new()),
        }
    }

    pub fn manifest_loader(&self) -> &M {
        &self.manifest_loader
    }

    /// Load whatever the directory declares. A workspace manifest wins over a
    /// project manifest.
    pub fn load(&self, path: &Path) -> Result<Graph> {
        let path = normalize(path);
        let manifests = self.manifest_loader.manifests_at(&path);
        if manifests.contains(&Manifest::Workspace) {
            self.load_workspace(&path)
        } else if manifests.contains(&Manifest::Project) {
            self.load_project(&path)
        } else {
            Err(GraphLoadingError::ManifestNotFound(path))
        }
    }

    /// Load the workspace at `path` and every project it reaches.
    pub fn load_workspace(&self, path: &Path) -> Result<Graph> {
        let path = normalize(path);
        let workspace = self.manifest_loader.load_workspace(&path)?;
        let mut cache = GraphLoaderCache::new();
        let mut detector = CircularDependencyDetector::new();
        let mut graph = Graph::new(workspace.name.clone(), &path, workspace.clone());

        for project_path in &workspace.projects {
            self.load_entry_project(project_path, &mut graph, &mut cache, &mut detector)?;
        }
        self.finish(graph, &mut cache, &mut detector)
    }

    /// Load the project at `path` and every project it reaches.
    pub fn load_project(&self, path: &Path) -> Result<Graph> {
        let path = normalize(path);
        let mut cache = GraphLoaderCache::new();
        let mut detector = CircularDependencyDetector::new();

        let project = self.load_project_at(&path, None, &mut cache)?;
        let workspace = Workspace::new(&path, project.name.clone(), vec![path.clone()]);
        let mut graph = Graph::new(project.name.clone(), &path, workspace);

        self.load_entry_project(&path, &mut graph, &mut cache, &mut detector)?;
        self.finish(graph, &mut cache, &mut detector)
    }

    /// Load the config that applies to `path`.
    ///
    /// Decoded configs are kept for the lifetime of the loader, so asking again
    /// for the same directory returns the same instance.
    pub fn load_config(&self, path: &Path) -> Result<Arc<Config>> {
        let path = normalize(path);
        let mut cache = self.configs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(config) = cache.config(&path) {
            return Ok(config);
        }
        let config = self.manifest_loader.load_config(&path)?;
        debug!("Loaded config for {}", path.display());
        Ok(cache.add_config(&path, config))
    }

    // ------------------------------------------------------------------------
    // Recursion
    // ------------------------------------------------------------------------

    fn load_entry_project(
        &self,
        path: &Path,
        graph: &mut Graph,
        cache: &mut GraphLoaderCache,
        detector: &mut CircularDependencyDetector,
    ) -> Result<()> {
        let project = self.load_project_at(path, Some(&mut *graph), cache)?;
        for target in &project.targets {
            let key = self.load_target(&project.path, &target.name, graph, cache, detector)?;
            graph.entry_nodes.insert(key);
        }
        Ok(())
    }

    /// Resolve the targets of reached projects that nothing depended on, then
    /// check the result.
    fn finish(
        &self,
        mut graph: Graph,
        cache: &mut GraphLoaderCache,
        detector: &mut CircularDependencyDetector,
    ) -> Result<Graph> {
        loop {
            let pending: Vec<(PathBuf, String)> = cache
                .projects()
                .iter()
                .flat_map(|project| {
                    project
                        .targets
                        .iter()
                        .map(|target| (project.path.clone(), target.name.clone()))
                        .collect::<Vec<_>>()
                })
                .filter(|(path, name)| cache.target_node(path, name).is_none())
                .collect();
            if pending.is_empty() {
                break;
            }
            for (path, name) in pending {
                self.load_target(&path, &name, &mut graph, cache, detector)?;
            }
        }

        graph.validate()?;
        info!(
            "Loaded graph '{}': {} projects, {} nodes, {} edges",
            graph.name,
            graph.projects.len(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    fn load_project_at(
        &self,
        path: &Path,
        graph: Option<&mut Graph>,
        cache: &mut GraphLoaderCache,
    ) -> Result<Arc<Project>> {
        let project = match cache.project(path) {
            Some(project) => project,
            None => {
                let project = cache.add_project(self.manifest_loader.load_project(path)?);
                debug!("Loaded project '{}' at {}", project.name, path.display());
                project
            }
        };
        if let Some(graph) = graph {
            if graph.project(path).is_none() {
                graph.add_project(Arc::clone(&project));
            }
        }
        Ok(project)
    }

    fn load_target(
        &self,
        path: &Path,
        name: &str,
        graph: &mut Graph,
        cache: &mut GraphLoaderCache,
        detector: &mut CircularDependencyDetector,
    ) -> Result<NodeKey> {
        let key = NodeKey::target(path, name);
        if cache.node(&key).is_some() {
            return Ok(key);
        }

        let project = self.load_project_at(path, Some(&mut *graph), cache)?;
        let target = project.target(name).ok_or_else(|| {
            GraphLoadingError::TargetNotFound {
                name: name.to_string(),
                path: path.to_path_buf(),
            }
        })?;

        let node = GraphNode::target(path, name);
        graph.add_node(node.clone());
        cache.add_node(node);

        let from = TargetReference::new(path, name);
        for dependency in &target.dependencies {
            let dependency_key = match dependency {
                TargetDependency::Target { .. } | TargetDependency::Project { .. } => {
                    let to = dependency.target_reference(path).ok_or_else(|| {
                        GraphLoadingError::TargetNotFound {
                            name: name.to_string(),
                            path: path.to_path_buf(),
                        }
                    })?;
                    detector.start(&from, &to)?;
                    self.load_target(&to.project_path, &to.name, graph, cache, detector)?
                }
                TargetDependency::Framework {
                    path: framework,
                    status,
                    ..
                } => self.load_framework(framework, *status, graph, cache)?,
                TargetDependency::Xcframework {
                    path: xcframework,
                    status,
                    ..
                } => self.load_xcframework(xcframework, *status, graph, cache)?,
                TargetDependency::Library {
                    path: library,
                    public_headers,
                    swift_module_map,
                    ..
                } => self.load_library(
                    library,
                    public_headers,
                    swift_module_map.as_deref(),
                    graph,
                    cache,
                )?,
                TargetDependency::Sdk {
                    name: sdk, status, ..
                } => self.load_sdk(sdk, *status, graph, cache)?,
                TargetDependency::Package { product, .. } => {
                    let node = GraphNode::PackageProduct(PackageProductNode {
                        path: path.to_path_buf(),
                        product: product.clone(),
                    });
                    insert_leaf(node, graph, cache)
                }
            };
            graph.add_edge(&key, &dependency_key, dependency.condition().cloned())?;
        }

        detector.complete(&from);
        Ok(key)
    }

    fn load_framework(
        &self,
        path: &Path,
        status: LinkingStatus,
        graph: &mut Graph,
        cache: &mut GraphLoaderCache,
    ) -> Result<NodeKey> {
        let key = NodeKey::Framework {
            path: path.to_path_buf(),
        };
        if cache.node(&key).is_some() {
            return Ok(key);
        }
        if !path.exists() {
            return Err(GraphLoadingError::FrameworkNotFound(path.to_path_buf()));
        }
        let metadata = self.metadata_provider.load_framework(path)?;
        Ok(insert_leaf(
            GraphNode::Framework(metadata.into_node(status)),
            graph,
            cache,
        ))
    }

    fn load_xcframework(
        &self,
        path: &Path,
        status: LinkingStatus,
        graph: &mut Graph,
        cache: &mut GraphLoaderCache,
    ) -> Result<NodeKey> {
        let key = NodeKey::XCFramework {
            path: path.to_path_buf(),
        };
        if cache.node(&key).is_some() {
            return Ok(key);
        }
        if !path.exists() {
            return Err(GraphLoadingError::XCFrameworkNotFound(path.to_path_buf()));
        }
        let metadata = self.metadata_provider.load_xcframework(path)?;
        Ok(insert_leaf(
            GraphNode::XCFramework(metadata.into_node(status)),
            graph,
            cache,
        ))
    }

    fn load_library(
        &self,
        path: &Path,
        public_headers: &Path,
        swift_module_map: Option<&Path>,
        graph: &mut Graph,
        cache: &mut GraphLoaderCache,
    ) -> Result<NodeKey> {
        if !path.exists() {
            return Err(GraphLoadingError::LibraryNotFound(path.to_path_buf()));
        }
        let key = NodeKey::Library {
            path: path.to_path_buf(),
        };
        if cache.node(&key).is_some() {
            return Ok(key);
        }
        if !public_headers.exists() {
            return Err(GraphLoadingError::PublicHeadersNotFound(
                public_headers.to_path_buf(),
            ));
        }
        if let Some(module_map) = swift_module_map {
            if !module_map.exists() {
                return Err(GraphLoadingError::SwiftModuleMapNotFound(
                    module_map.to_path_buf(),
                ));
            }
        }
        let metadata = self
            .metadata_provider
            .load_library(path, public_headers, swift_module_map)?;
        Ok(insert_leaf(
            GraphNode::Library(metadata.into_node()),
            graph,
            cache,
        ))
    }

    fn load_sdk(
        &self,
        name: &str,
        status: LinkingStatus,
        graph: &mut Graph,
        cache: &mut GraphLoaderCache,
    ) -> Result<NodeKey> {
        let node = GraphNode::Sdk(SdkNode::resolve(name, status)?);
        let key = node.key();
        if cache.node(&key).is_some() {
            return Ok(key);
        }
        Ok(insert_leaf(node, graph, cache))
    }
}

fn insert_leaf(node: GraphNode, graph: &mut Graph, cache: &mut GraphLoaderCache) -> NodeKey {
    let key = node.key();
    if cache.node(&key).is_none() {
        graph.add_node(node.clone());
        cache.add_node(node);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_message_lists_cycle() {
        let a = TargetReference::new("/p", "A");
        let b = TargetReference::new("/p", "B");
        let err = GraphLoadingError::CircularDependency {
            from: b.clone(),
            to: a.clone(),
            cycle: vec![a.clone(), b, a],
        };
        assert!(err.to_string().ends_with("A -> B -> A"));
    }

    #[test]
    fn test_target_not_found_message() {
        let err = GraphLoadingError::TargetNotFound {
            name: "Core".to_string(),
            path: PathBuf::from("/p"),
        };
        assert_eq!(
            err.to_string(),
            "Target 'Core' can't be found in the project at /p"
        );
    }
}
