//! Pruning of targets nothing needs.
//!
//! Pruning is two-phase. Mappers such as [`PruneOrphanExternalTargetsMapper`] only
//! tag targets as prunable; [`TreeShakePrunedTargetsMapper`] then removes every
//! tagged target along with its node, its edges and the scheme references to it.

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

use super::{GraphMapper, MapperError, Result};
use crate::graph::Graph;
use crate::model::{Scheme, TargetDependency, TargetReference};
use crate::node::NodeKey;
use crate::side_effects::SideEffect;
use crate::traverser::GraphTraverser;

/// Tags external targets that no internal target needs on any platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOrphanExternalTargetsMapper;

impl GraphMapper for PruneOrphanExternalTargetsMapper {
    fn name(&self) -> &str {
        "prune-orphan-external-targets"
    }

    fn map(&self, graph: Graph) -> Result<(Graph, Vec<SideEffect>)> {
        let orphans: Vec<TargetReference> = GraphTraverser::new(&graph)
            .all_orphan_external_targets()
            .iter()
            .map(|target| target.reference())
            .collect();

        if orphans.is_empty() {
            return Ok((graph, Vec::new()));
        }

        let mut graph = graph;
        for reference in &orphans {
            let project = graph
                .project_mut(&reference.project_path)
                .ok_or_else(|| MapperError::ProjectNotFound(reference.project_path.clone()))?;
            if let Some(target) = project.target_mut(&reference.name) {
                debug!("Marking orphan external target {} as prunable", reference);
                target.mark_prunable();
            }
        }
        info!("Marked {} orphan external targets as prunable", orphans.len());

        Ok((graph, Vec::new()))
    }
}

/// Removes every target tagged prunable.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeShakePrunedTargetsMapper;

impl GraphMapper for TreeShakePrunedTargetsMapper {
    fn name(&self) -> &str {
        "tree-shake-pruned-targets"
    }

    fn map(&self, graph: Graph) -> Result<(Graph, Vec<SideEffect>)> {
        let pruned: BTreeSet<TargetReference> = graph
            .projects
            .values()
            .flat_map(|project| {
                project
                    .targets
                    .iter()
                    .filter(|target| target.is_prunable())
                    .map(|target| TargetReference::new(project.path.clone(), target.name.clone()))
            })
            .collect();

        if pruned.is_empty() {
            return Ok((graph, Vec::new()));
        }

        let mut graph = graph;

        // Non-target nodes only the pruned targets reached may be left dangling.
        let candidates = reachable_leaves(&graph, &pruned);

        for reference in &pruned {
            graph.remove_node(&NodeKey::from(reference));
        }
        remove_unreferenced(&mut graph, candidates);

        let project_paths: Vec<_> = graph.projects.keys().cloned().collect();
        let mut emptied = Vec::new();
        for path in project_paths {
            let Some(project) = graph.project_mut(&path) else {
                continue;
            };
            project.targets.retain(|target| !target.is_prunable());
            for target in &mut project.targets {
                target
                    .dependencies
                    .retain(|dependency| keeps_dependency(dependency, &path, &pruned));
            }
            project.schemes = tree_shake_schemes(std::mem::take(&mut project.schemes), &pruned);
            if project.targets.is_empty() {
                emptied.push(path);
            }
        }

        for path in &emptied {
            debug!("Removing project {} left without targets", path.display());
            graph.remove_project(path);
        }
        graph.workspace.projects.retain(|path| !emptied.contains(path));
        graph.workspace.schemes = tree_shake_schemes(std::mem::take(&mut graph.workspace.schemes), &pruned);

        info!(
            "Tree-shook {} targets and {} projects",
            pruned.len(),
            emptied.len()
        );
        Ok((graph, Vec::new()))
    }
}

fn keeps_dependency(
    dependency: &TargetDependency,
    project_path: &std::path::Path,
    pruned: &BTreeSet<TargetReference>,
) -> bool {
    match dependency.target_reference(project_path) {
        Some(reference) => !pruned.contains(&reference),
        None => true,
    }
}

/// Drop pruned targets from schemes, and schemes left with nothing to do.
fn tree_shake_schemes(schemes: Vec<Scheme>, pruned: &BTreeSet<TargetReference>) -> Vec<Scheme> {
    schemes
        .into_iter()
        .filter_map(|mut scheme| {
            scheme.build_targets.retain(|t| !pruned.contains(t));
            scheme.test_targets.retain(|t| !pruned.contains(t));
            if scheme.run_target.as_ref().is_some_and(|t| pruned.contains(t)) {
                scheme.run_target = None;
            }
            let has_work = !scheme.build_targets.is_empty()
                || !scheme.test_targets.is_empty()
                || scheme.run_target.is_some();
            has_work.then_some(scheme)
        })
        .collect()
}

/// Non-target nodes reachable from the pruned targets without crossing a kept target.
fn reachable_leaves(graph: &Graph, pruned: &BTreeSet<TargetReference>) -> HashSet<NodeKey> {
    let mut stack: Vec<NodeKey> = pruned.iter().map(NodeKey::from).collect();
    let mut visited = HashSet::new();
    let mut leaves = HashSet::new();

    while let Some(key) = stack.pop() {
        if !visited.insert(key.clone()) {
            continue;
        }
        for (node, _) in graph.dependencies(&key) {
            let dependency = node.key();
            if dependency.is_target() {
                continue;
            }
            leaves.insert(dependency.clone());
            stack.push(dependency);
        }
    }
    leaves
}

/// Remove candidates nothing depends on anymore, until none is left to remove.
fn remove_unreferenced(graph: &mut Graph, mut candidates: HashSet<NodeKey>) {
    loop {
        let unreferenced: Vec<NodeKey> = candidates
            .iter()
            .filter(|key| graph.contains_node(key) && graph.dependents(key).is_empty())
            .cloned()
            .collect();
        if unreferenced.is_empty() {
            return;
        }
        for key in unreferenced {
            debug!("Removing unreferenced {}", key);
            graph.remove_node(&key);
            candidates.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinkingStatus, Platform, Product, Project, Target, Workspace};
    use crate::node::{BinaryLinking, FrameworkNode, GraphNode};
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    const APP: &str = "/repo/App";
    const PKG: &str = "/repo/.build/checkouts/Pkg";

    fn graph_with(app_targets: Vec<Target>, pkg_targets: Vec<Target>) -> Graph {
        let mut graph = Graph::new(
            "App",
            APP,
            Workspace::new(APP, "App", vec![PathBuf::from(APP), PathBuf::from(PKG)]),
        );
        let projects = [
            Project::new(APP, "App", app_targets),
            Project::new(PKG, "Pkg", pkg_targets).external(),
        ];
        for project in projects {
            for target in &project.targets {
                graph.add_node(GraphNode::target(project.path.clone(), target.name.clone()));
            }
            graph.add_project(Arc::new(project));
        }
        graph
    }

    fn framework(path: &str) -> GraphNode {
        GraphNode::Framework(FrameworkNode {
            path: PathBuf::from(path),
            binary_path: PathBuf::from(path).join("Binary"),
            dsym_path: None,
            linking: BinaryLinking::Dynamic,
            architectures: vec![],
            status: LinkingStatus::Required,
            is_carthage: false,
        })
    }

    fn prunable(mut target: Target) -> Target {
        target.mark_prunable();
        target
    }

    #[test]
    fn test_orphan_external_targets_are_marked() {
        let mut graph = graph_with(
            vec![Target::new("App", Product::App, [Platform::IOS])],
            vec![
                Target::new("Used", Product::Framework, [Platform::IOS]),
                Target::new("Unused", Product::Framework, [Platform::IOS]),
            ],
        );
        graph
            .add_edge(&NodeKey::target(APP, "App"), &NodeKey::target(PKG, "Used"), None)
            .unwrap();

        let (graph, _) = PruneOrphanExternalTargetsMapper.map(graph).unwrap();

        let pkg = graph.project(Path::new(PKG)).unwrap();
        assert!(pkg.target("Unused").unwrap().is_prunable());
        assert!(!pkg.target("Used").unwrap().is_prunable());
    }

    #[test]
    fn test_tree_shake_removes_targets_edges_and_declarations() {
        let mut graph = graph_with(
            vec![Target::new("App", Product::App, [Platform::IOS])
                .with_dependency(TargetDependency::project("Gone", PKG))
                .with_dependency(TargetDependency::project("Kept", PKG))],
            vec![
                prunable(Target::new("Gone", Product::Framework, [Platform::IOS])),
                Target::new("Kept", Product::Framework, [Platform::IOS]),
            ],
        );
        let app = NodeKey::target(APP, "App");
        graph.add_edge(&app, &NodeKey::target(PKG, "Gone"), None).unwrap();
        graph.add_edge(&app, &NodeKey::target(PKG, "Kept"), None).unwrap();

        let (graph, _) = TreeShakePrunedTargetsMapper.map(graph).unwrap();

        assert!(!graph.contains_node(&NodeKey::target(PKG, "Gone")));
        assert_eq!(graph.dependencies(&app).len(), 1);
        let app_target = graph.target(&TargetReference::new(APP, "App")).unwrap();
        assert_eq!(
            app_target.dependencies,
            vec![TargetDependency::project("Kept", PKG)]
        );
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_tree_shake_removes_emptied_projects_from_workspace() {
        let graph = graph_with(
            vec![Target::new("App", Product::App, [Platform::IOS])],
            vec![prunable(Target::new("Gone", Product::Framework, [Platform::IOS]))],
        );

        let (graph, _) = TreeShakePrunedTargetsMapper.map(graph).unwrap();

        assert!(graph.project(Path::new(PKG)).is_none());
        assert_eq!(graph.workspace.projects, vec![PathBuf::from(APP)]);
    }

    #[test]
    fn test_tree_shake_drops_schemes_left_empty() {
        let gone = TargetReference::new(APP, "Gone");
        let app = TargetReference::new(APP, "App");
        let mut graph = graph_with(
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                prunable(Target::new("Gone", Product::Framework, [Platform::IOS])),
            ],
            vec![],
        );
        graph.workspace.schemes = vec![
            Scheme {
                name: "Gone".into(),
                build_targets: vec![gone.clone()],
                ..Default::default()
            },
            Scheme {
                name: "App".into(),
                build_targets: vec![app.clone(), gone.clone()],
                run_target: Some(app.clone()),
                ..Default::default()
            },
        ];

        let (graph, _) = TreeShakePrunedTargetsMapper.map(graph).unwrap();

        assert_eq!(
            graph.workspace.schemes,
            vec![Scheme {
                name: "App".into(),
                build_targets: vec![app.clone()],
                run_target: Some(app),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn test_tree_shake_removes_frameworks_only_pruned_targets_used() {
        let mut graph = graph_with(
            vec![Target::new("App", Product::App, [Platform::IOS])],
            vec![prunable(Target::new("Gone", Product::Framework, [Platform::IOS]))],
        );
        let shared = framework("/fw/Shared.framework");
        let private = framework("/fw/Private.framework");
        let (shared_key, private_key) = (shared.key(), private.key());
        graph.add_node(shared);
        graph.add_node(private);
        let gone = NodeKey::target(PKG, "Gone");
        let app = NodeKey::target(APP, "App");
        graph.add_edge(&gone, &private_key, None).unwrap();
        graph.add_edge(&gone, &shared_key, None).unwrap();
        graph.add_edge(&app, &shared_key, None).unwrap();

        let (graph, _) = TreeShakePrunedTargetsMapper.map(graph).unwrap();

        assert!(!graph.contains_node(&private_key));
        assert!(graph.contains_node(&shared_key));
    }

    #[test]
    fn test_tree_shake_without_prunable_targets_is_noop() {
        let graph = graph_with(
            vec![Target::new("App", Product::App, [Platform::IOS])],
            vec![Target::new("Lib", Product::Framework, [Platform::IOS])],
        );
        let before = graph.to_document();

        let (graph, _) = TreeShakePrunedTargetsMapper.map(graph).unwrap();

        assert_eq!(graph.to_document().nodes, before.nodes);
        assert_eq!(graph.projects.len(), 2);
    }
}
