//! Lookup of cached artifacts for the cacheable targets of a graph.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ArtifactStore, CacheError, Result, TargetContentHasher};
use crate::graph::Graph;
use crate::model::{Product, TargetReference};
use crate::traverser::GraphTraverser;

/// Cache state of one cacheable target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
    pub target: TargetReference,
    pub hash: String,
    /// Where the artifact is, when it is cached.
    pub artifact: Option<PathBuf>,
}

/// Finds which cacheable targets of a graph have a stored artifact.
pub struct ArtifactResolver {
    store: Arc<dyn ArtifactStore>,
    cacheable_products: BTreeSet<Product>,
    sources: BTreeSet<String>,
}

impl ArtifactResolver {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        cacheable_products: impl IntoIterator<Item = Product>,
        sources: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            store,
            cacheable_products: cacheable_products.into_iter().collect(),
            sources: sources.into_iter().collect(),
        }
    }

    /// Build a resolver from product names as written in the configuration.
    pub fn from_names(
        store: Arc<dyn ArtifactStore>,
        cacheable_products: &[String],
        sources: &[String],
    ) -> Result<Self> {
        let products = cacheable_products
            .iter()
            .map(|name| name.parse::<Product>().map_err(CacheError::InvalidProduct))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(store, products, sources.iter().cloned()))
    }

    /// Targets that may be replaced by a cached artifact.
    pub fn cacheable_targets(&self, graph: &Graph) -> BTreeSet<TargetReference> {
        GraphTraverser::new(graph)
            .all_targets()
            .into_iter()
            .filter(|target| self.cacheable_products.contains(&target.target.product))
            .filter(|target| !self.sources.contains(&target.target.name))
            .map(|target| target.reference())
            .collect()
    }

    /// Hash every cacheable target and look its artifact up in the store.
    pub async fn status(&self, graph: &Graph) -> Result<Vec<ArtifactStatus>> {
        let cacheable = self.cacheable_targets(graph);
        if cacheable.is_empty() {
            return Ok(Vec::new());
        }

        let hashes = TargetContentHasher::new().hash_graph(graph)?;
        let lookups = cacheable.into_iter().filter_map(|target| {
            let hash = hashes.get(&target)?.clone();
            let store = Arc::clone(&self.store);
            Some(async move {
                let artifact = store.fetch(&hash, &target.name).await?;
                Ok::<_, CacheError>(ArtifactStatus {
                    target,
                    hash,
                    artifact,
                })
            })
        });

        let statuses = join_all(lookups)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        debug!("Checked {} cacheable targets", statuses.len());
        Ok(statuses)
    }

    /// Cached artifacts by target.
    pub async fn resolve(&self, graph: &Graph) -> Result<BTreeMap<TargetReference, PathBuf>> {
        let artifacts: BTreeMap<_, _> = self
            .status(graph)
            .await?
            .into_iter()
            .filter_map(|status| status.artifact.map(|path| (status.target, path)))
            .collect();
        info!("Found {} cached artifacts", artifacts.len());
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary_cache::LocalArtifactStore;
    use crate::model::{Platform, Project, Target, Workspace};
    use crate::node::{GraphNode, NodeKey};
    use tempfile::TempDir;

    fn graph(root: &std::path::Path) -> Graph {
        let project = Project::new(
            root,
            "App",
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                Target::new("Core", Product::Framework, [Platform::IOS]),
                Target::new("UI", Product::Framework, [Platform::IOS]),
            ],
        );
        let mut graph = Graph::new("App", root, Workspace::new(root, "App", vec![]));
        for target in &project.targets {
            graph.add_node(GraphNode::target(root, target.name.clone()));
        }
        graph.add_project(Arc::new(project));
        let app = NodeKey::target(root, "App");
        graph.add_edge(&app, &NodeKey::target(root, "Core"), None).unwrap();
        graph.add_edge(&app, &NodeKey::target(root, "UI"), None).unwrap();
        graph
    }

    fn framework(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(format!("{}.framework", name));
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(name), "binary").unwrap();
        path
    }

    #[test]
    fn test_cacheable_targets_skip_sources_and_other_products() {
        let temp = TempDir::new().unwrap();
        let graph = graph(temp.path());
        let store = Arc::new(LocalArtifactStore::new(temp.path().join("cache")));
        let resolver =
            ArtifactResolver::new(store, [Product::Framework], ["UI".to_string()]);

        assert_eq!(
            resolver.cacheable_targets(&graph),
            BTreeSet::from([TargetReference::new(temp.path(), "Core")])
        );
    }

    #[test]
    fn test_from_names_rejects_unknown_products() {
        let store = Arc::new(LocalArtifactStore::new("/tmp/cache"));
        let result = ArtifactResolver::from_names(store, &["gem".to_string()], &[]);
        assert!(matches!(result, Err(CacheError::InvalidProduct(_))));
    }

    #[tokio::test]
    async fn test_resolve_finds_stored_artifacts() {
        let temp = TempDir::new().unwrap();
        let graph = graph(temp.path());
        let store = Arc::new(LocalArtifactStore::new(temp.path().join("cache")));
        let core = TargetReference::new(temp.path(), "Core");

        let hashes = TargetContentHasher::new().hash_graph(&graph).unwrap();
        let stored = store
            .store(&hashes[&core], "Core", &framework(temp.path(), "Core"))
            .await
            .unwrap();

        let resolver = ArtifactResolver::new(store, [Product::Framework], Vec::new());
        let artifacts = resolver.resolve(&graph).await.unwrap();

        assert_eq!(artifacts, BTreeMap::from([(core, stored)]));
    }

    #[tokio::test]
    async fn test_status_reports_misses() {
        let temp = TempDir::new().unwrap();
        let graph = graph(temp.path());
        let store = Arc::new(LocalArtifactStore::new(temp.path().join("cache")));
        let resolver = ArtifactResolver::new(store, [Product::Framework], Vec::new());

        let statuses = resolver.status(&graph).await.unwrap();

        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|status| status.artifact.is_none()));
    }
}
