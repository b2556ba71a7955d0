//! Per-load memoization of projects, configs and nodes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::model::Config;
use crate::model::Project;
use crate::node::{GraphNode, NodeKey};

/// Memoizes decoded manifests and resolved nodes for the lifetime of one load.
///
/// Keys are canonical absolute paths (node keys embed them). Values are shared
/// through `Arc`, so a second lookup returns the very same instance.
#[derive(Debug, Default)]
pub struct GraphLoaderCache {
    projects: HashMap<PathBuf, Arc<Project>>,
    configs: HashMap<PathBuf, Arc<Config>>,
    nodes: HashMap<NodeKey, Arc<GraphNode>>,
}

impl GraphLoaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a project under its path and return the shared instance.
    pub fn add_project(&mut self, project: Project) -> Arc<Project> {
        let project = Arc::new(project);
        self.projects
            .insert(project.path.clone(), Arc::clone(&project));
        project
    }

    pub fn project(&self, path: &Path) -> Option<Arc<Project>> {
        self.projects.get(path).cloned()
    }

    /// Store a config under its path and return the shared instance.
    pub fn add_config(&mut self, path: &Path, config: Config) -> Arc<Config> {
        let config = Arc::new(config);
        self.configs.insert(path.to_path_buf(), Arc::clone(&config));
        config
    }

    pub fn config(&self, path: &Path) -> Option<Arc<Config>> {
        self.configs.get(path).cloned()
    }

    /// Store a node under its key and return the shared instance.
    pub fn add_node(&mut self, node: GraphNode) -> Arc<GraphNode> {
        let node = Arc::new(node);
        self.nodes.insert(node.key(), Arc::clone(&node));
        node
    }

    pub fn node(&self, key: &NodeKey) -> Option<Arc<GraphNode>> {
        self.nodes.get(key).cloned()
    }

    /// Cached target node, if the target was already resolved.
    pub fn target_node(&self, path: &Path, name: &str) -> Option<Arc<GraphNode>> {
        self.node(&NodeKey::target(path, name))
    }

    /// Every cached project, sorted by path.
    pub fn projects(&self) -> Vec<Arc<Project>> {
        let mut projects: Vec<_> = self.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.path.cmp(&b.path));
        projects
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
