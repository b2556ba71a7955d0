//! The resolved dependency graph.
//!
//! [`Graph`] owns the projects that were loaded (shared through `Arc` so that every
//! holder of a project sees the same instance) and a petgraph arena of
//! [`GraphNode`]s indexed by [`NodeKey`].
//!
//! Edges carry the platform condition declared on the dependency and an ordinal
//! recording insertion order, so `dependencies()` always yields declaration order
//! regardless of how petgraph stores adjacency lists.

use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::model::{PlatformCondition, Project, Target, TargetReference, Workspace};
use crate::node::{GraphNode, NodeKey};

/// Errors raised when the graph structure is inconsistent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("Edge from {from} to {to} references a node missing from the graph")]
    DanglingEdge { from: NodeKey, to: NodeKey },

    #[error("Node {0} is not in the graph")]
    MissingNode(NodeKey),

    #[error("Target node '{name}' has no matching target in project {}", path.display())]
    TargetNotInProject { path: PathBuf, name: String },

    #[error("Target '{name}' of project {} has no node in the graph", path.display())]
    MissingTargetNode { path: PathBuf, name: String },

    #[error("Entry node {0} is not in the graph")]
    MissingEntryNode(NodeKey),

    #[error("The graph contains a cycle through {0}")]
    Cycle(NodeKey),
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

// ============================================================================
// Edge Data
// ============================================================================

/// Payload of a dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    /// Platforms the dependency applies to; `None` means all of them.
    pub condition: Option<PlatformCondition>,
    ordinal: u64,
}

impl EdgeData {
    pub fn condition(&self) -> Option<&PlatformCondition> {
        self.condition.as_ref()
    }
}

/// Serializable snapshot of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDocument {
    pub from: NodeKey,
    pub to: NodeKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<PlatformCondition>,
}

/// Serializable snapshot of a whole graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub name: String,
    pub path: PathBuf,
    pub workspace: Workspace,
    pub projects: Vec<Project>,
    pub entry_nodes: Vec<NodeKey>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<EdgeDocument>,
}

// ============================================================================
// Graph
// ============================================================================

/// A resolved dependency graph.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Name of the workspace or project the graph was loaded from.
    pub name: String,
    /// Directory the graph was loaded from.
    pub path: PathBuf,
    pub workspace: Workspace,
    /// Loaded projects by directory.
    pub projects: BTreeMap<PathBuf, Arc<Project>>,
    /// Targets declared by the manifests the load was invoked on.
    pub entry_nodes: BTreeSet<NodeKey>,

    graph: StableGraph<GraphNode, EdgeData, petgraph::Directed>,
    node_index_map: HashMap<NodeKey, NodeIndex>,
    next_ordinal: u64,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, workspace: Workspace) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            workspace,
            projects: BTreeMap::new(),
            entry_nodes: BTreeSet::new(),
            graph: StableGraph::new(),
            node_index_map: HashMap::new(),
            next_ordinal: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    /// Register a shared project, replacing any project at the same path.
    pub fn add_project(&mut self, project: Arc<Project>) {
        self.projects.insert(project.path.clone(), project);
    }

    pub fn project(&self, path: &Path) -> Option<&Arc<Project>> {
        self.projects.get(path)
    }

    /// Mutable access to a project. Clones it first if it is shared.
    pub fn project_mut(&mut self, path: &Path) -> Option<&mut Project> {
        self.projects.get_mut(path).map(Arc::make_mut)
    }

    /// Remove a project. Its target nodes are left untouched.
    pub fn remove_project(&mut self, path: &Path) -> Option<Arc<Project>> {
        self.projects.remove(path)
    }

    /// Look up target data by reference.
    pub fn target(&self, reference: &TargetReference) -> Option<&Target> {
        self.projects
            .get(&reference.project_path)
            .and_then(|project| project.target(&reference.name))
    }

    // ------------------------------------------------------------------------
    // Node Operations
    // ------------------------------------------------------------------------

    /// Insert a node, or replace the payload of the node with the same key.
    ///
    /// Replacing keeps the node's index and edges, so a node can be inserted
    /// before its dependencies are known and updated later.
    pub fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        let key = node.key();
        if let Some(&idx) = self.node_index_map.get(&key) {
            if let Some(weight) = self.graph.node_weight_mut(idx) {
                *weight = node;
            }
            return idx;
        }
        let idx = self.graph.add_node(node);
        self.node_index_map.insert(key, idx);
        idx
    }

    pub fn node(&self, key: &NodeKey) -> Option<&GraphNode> {
        self.node_index_map
            .get(key)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn contains_node(&self, key: &NodeKey) -> bool {
        self.node_index_map.contains_key(key)
    }

    /// Remove a node and all its incident edges.
    pub fn remove_node(&mut self, key: &NodeKey) -> Option<GraphNode> {
        let idx = self.node_index_map.remove(key)?;
        self.entry_nodes.remove(key);
        self.graph.remove_node(idx)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_weights()
    }

    /// Keys of every node, sorted.
    pub fn node_keys(&self) -> BTreeSet<NodeKey> {
        self.node_index_map.keys().cloned().collect()
    }

    // ------------------------------------------------------------------------
    // Edge Operations
    // ------------------------------------------------------------------------

    /// Add a dependency edge from `from` to `to`.
    ///
    /// Adding an edge that already exists replaces its condition and keeps its
    /// position in the declaration order.
    pub fn add_edge(
        &mut self,
        from: &NodeKey,
        to: &NodeKey,
        condition: Option<PlatformCondition>,
    ) -> Result<()> {
        let (Some(&source), Some(&target)) =
            (self.node_index_map.get(from), self.node_index_map.get(to))
        else {
            return Err(GraphError::DanglingEdge {
                from: from.clone(),
                to: to.clone(),
            });
        };

        if let Some(edge) = self.graph.find_edge(source, target) {
            if let Some(data) = self.graph.edge_weight_mut(edge) {
                data.condition = condition;
            }
            return Ok(());
        }

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.graph
            .add_edge(source, target, EdgeData { condition, ordinal });
        Ok(())
    }

    /// Replace every outgoing edge of `from`.
    pub fn set_dependencies(
        &mut self,
        from: &NodeKey,
        dependencies: Vec<(NodeKey, Option<PlatformCondition>)>,
    ) -> Result<()> {
        let source = *self
            .node_index_map
            .get(from)
            .ok_or_else(|| GraphError::MissingNode(from.clone()))?;

        for (to, _) in &dependencies {
            if !self.node_index_map.contains_key(to) {
                return Err(GraphError::DanglingEdge {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }

        let outgoing: Vec<_> = self
            .graph
            .edges_directed(source, Direction::Outgoing)
            .map(|edge| edge.id())
            .collect();
        for edge in outgoing {
            self.graph.remove_edge(edge);
        }

        for (to, condition) in dependencies {
            self.add_edge(from, &to, condition)?;
        }
        Ok(())
    }

    /// Remove the edge from `from` to `to`, returning whether it existed.
    pub fn remove_edge(&mut self, from: &NodeKey, to: &NodeKey) -> bool {
        let (Some(&source), Some(&target)) =
            (self.node_index_map.get(from), self.node_index_map.get(to))
        else {
            return false;
        };
        match self.graph.find_edge(source, target) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    /// The edge between two nodes.
    pub fn edge(&self, from: &NodeKey, to: &NodeKey) -> Option<&EdgeData> {
        let source = *self.node_index_map.get(from)?;
        let target = *self.node_index_map.get(to)?;
        let edge = self.graph.find_edge(source, target)?;
        self.graph.edge_weight(edge)
    }

    /// Direct dependencies of a node, in declaration order.
    pub fn dependencies(&self, key: &NodeKey) -> Vec<(&GraphNode, &EdgeData)> {
        let Some(&idx) = self.node_index_map.get(key) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(|edge| {
                let node = self.graph.node_weight(edge.target())?;
                Some((node, edge.weight()))
            })
            .collect();
        edges.sort_by_key(|(_, data)| data.ordinal);
        edges
    }

    /// Nodes that depend directly on `key`, sorted by key.
    pub fn dependents(&self, key: &NodeKey) -> Vec<&GraphNode> {
        let Some(&idx) = self.node_index_map.get(key) else {
            return Vec::new();
        };
        let mut nodes: Vec<_> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .filter_map(|n| self.graph.node_weight(n))
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterate over all edges as `(from, to, data)`.
    pub fn iter_edges(&self) -> impl Iterator<Item = (&GraphNode, &GraphNode, &EdgeData)> {
        self.graph.edge_references().filter_map(move |edge| {
            let source = self.graph.node_weight(edge.source())?;
            let target = self.graph.node_weight(edge.target())?;
            Some((source, target, edge.weight()))
        })
    }

    // ------------------------------------------------------------------------
    // Whole-graph Operations
    // ------------------------------------------------------------------------

    /// Node keys in dependency-first order.
    pub fn topological_order(&self) -> Result<Vec<NodeKey>> {
        let order = petgraph::algo::toposort(&self.graph, None).map_err(|cycle| {
            let key = self
                .graph
                .node_weight(cycle.node_id())
                .map(GraphNode::key)
                .unwrap_or_else(|| NodeKey::target(PathBuf::new(), String::new()));
            GraphError::Cycle(key)
        })?;
        Ok(order
            .into_iter()
            .rev()
            .filter_map(|idx| self.graph.node_weight(idx).map(GraphNode::key))
            .collect())
    }

    /// Check referential completeness.
    ///
    /// Every target node must name a target of a loaded project, every project
    /// target must have a node, and every entry node must exist.
    pub fn validate(&self) -> Result<()> {
        for node in self.graph.node_weights() {
            if let GraphNode::Target(target) = node {
                let reference = TargetReference::new(target.path.clone(), target.name.clone());
                if self.target(&reference).is_none() {
                    return Err(GraphError::TargetNotInProject {
                        path: target.path.clone(),
                        name: target.name.clone(),
                    });
                }
            }
        }

        for project in self.projects.values() {
            for target in &project.targets {
                let key = NodeKey::target(project.path.clone(), target.name.clone());
                if !self.contains_node(&key) {
                    return Err(GraphError::MissingTargetNode {
                        path: project.path.clone(),
                        name: target.name.clone(),
                    });
                }
            }
        }

        for entry in &self.entry_nodes {
            if !self.contains_node(entry) {
                return Err(GraphError::MissingEntryNode(entry.clone()));
            }
        }

        Ok(())
    }

    /// Build a serializable snapshot with deterministic ordering.
    pub fn to_document(&self) -> GraphDocument {
        let mut nodes: Vec<GraphNode> = self.graph.node_weights().cloned().collect();
        nodes.sort();

        let mut edges: Vec<EdgeDocument> = self
            .iter_edges()
            .map(|(from, to, data)| EdgeDocument {
                from: from.key(),
                to: to.key(),
                condition: data.condition.clone(),
            })
            .collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        GraphDocument {
            name: self.name.clone(),
            path: self.path.clone(),
            workspace: self.workspace.clone(),
            projects: self.projects.values().map(|p| p.as_ref().clone()).collect(),
            entry_nodes: self.entry_nodes.iter().cloned().collect(),
            nodes,
            edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinkingStatus, Platform, Product};
    use crate::node::{BinaryLinking, FrameworkNode};

    fn graph_with(targets: &[&str]) -> Graph {
        let project = Project::new(
            "/app",
            "App",
            targets
                .iter()
                .map(|name| Target::new(*name, Product::Framework, [Platform::IOS]))
                .collect(),
        );
        let mut graph = Graph::new("App", "/app", Workspace::new("/app", "App", vec![]));
        graph.add_project(Arc::new(project));
        for name in targets {
            graph.add_node(GraphNode::target("/app", *name));
        }
        graph
    }

    fn key(name: &str) -> NodeKey {
        NodeKey::target("/app", name)
    }

    #[test]
    fn test_add_node_keeps_index_and_edges() {
        let mut graph = graph_with(&["A", "B"]);
        graph.add_edge(&key("A"), &key("B"), None).unwrap();

        let before = graph.add_node(GraphNode::target("/app", "A"));
        let after = graph.add_node(GraphNode::target("/app", "A"));
        assert_eq!(before, after);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.dependencies(&key("A")).len(), 1);
    }

    #[test]
    fn test_add_edge_rejects_dangling_endpoint() {
        let mut graph = graph_with(&["A"]);
        let err = graph.add_edge(&key("A"), &key("Missing"), None).unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingEdge {
                from: key("A"),
                to: key("Missing")
            }
        );
    }

    #[test]
    fn test_dependencies_follow_declaration_order() {
        let mut graph = graph_with(&["A", "B", "C", "D"]);
        for dep in ["D", "B", "C"] {
            graph.add_edge(&key("A"), &key(dep), None).unwrap();
        }
        let names: Vec<_> = graph
            .dependencies(&key("A"))
            .into_iter()
            .filter_map(|(node, _)| node.as_target().map(|t| t.name.clone()))
            .collect();
        assert_eq!(names, vec!["D", "B", "C"]);
    }

    #[test]
    fn test_duplicate_edge_replaces_condition() {
        let mut graph = graph_with(&["A", "B"]);
        graph.add_edge(&key("A"), &key("B"), None).unwrap();
        let ios = PlatformCondition::when([Platform::IOS]);
        graph.add_edge(&key("A"), &key("B"), ios.clone()).unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge(&key("A"), &key("B")).unwrap().condition, ios);
    }

    #[test]
    fn test_set_dependencies_replaces_edges() {
        let mut graph = graph_with(&["A", "B", "C"]);
        graph.add_edge(&key("A"), &key("B"), None).unwrap();
        graph
            .set_dependencies(&key("A"), vec![(key("C"), None)])
            .unwrap();

        assert!(graph.edge(&key("A"), &key("B")).is_none());
        assert!(graph.edge(&key("A"), &key("C")).is_some());
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let mut graph = graph_with(&["A", "B"]);
        graph.add_edge(&key("A"), &key("B"), None).unwrap();
        graph.entry_nodes.insert(key("B"));

        assert!(graph.remove_node(&key("B")).is_some());
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.entry_nodes.is_empty());
    }

    #[test]
    fn test_validate_detects_orphan_target_node() {
        let mut graph = graph_with(&["A"]);
        graph.add_node(GraphNode::target("/app", "Ghost"));
        assert_eq!(
            graph.validate(),
            Err(GraphError::TargetNotInProject {
                path: PathBuf::from("/app"),
                name: "Ghost".to_string()
            })
        );
    }

    #[test]
    fn test_topological_order_is_dependency_first() {
        let mut graph = graph_with(&["App", "Core"]);
        let framework = GraphNode::Framework(FrameworkNode {
            path: PathBuf::from("/x/Net.framework"),
            binary_path: PathBuf::from("/x/Net.framework/Net"),
            dsym_path: None,
            linking: BinaryLinking::Dynamic,
            architectures: vec![],
            status: LinkingStatus::Required,
            is_carthage: false,
        });
        let framework_key = framework.key();
        graph.add_node(framework);
        graph.add_edge(&key("App"), &key("Core"), None).unwrap();
        graph.add_edge(&key("Core"), &framework_key, None).unwrap();

        let order = graph.topological_order().unwrap();
        let position = |k: &NodeKey| order.iter().position(|o| o == k).unwrap();
        assert!(position(&framework_key) < position(&key("Core")));
        assert!(position(&key("Core")) < position(&key("App")));
    }
}
