//! Narrowing of external targets to the platforms their consumers need.
//!
//! Packages that declare no platforms are treated as supporting all of them. Left
//! alone, every generated external target would build for every platform. This
//! mapper cascades the platforms of internal targets down through the external
//! part of the graph and keeps only what is needed.

use std::collections::BTreeMap;
use tracing::{debug, warn};
use xcgraph_config::IncompatibleConditionPolicy;

use super::{GraphMapper, MapperError, Result};
use crate::graph::Graph;
use crate::model::format_platforms;
use crate::node::NodeKey;
use crate::side_effects::SideEffect;
use crate::traverser::GraphTraverser;

/// Restricts external targets to the platforms their internal consumers build for.
#[derive(Debug, Clone, Default)]
pub struct ExternalProjectsPlatformNarrowerMapper {
    policy: IncompatibleConditionPolicy,
}

impl ExternalProjectsPlatformNarrowerMapper {
    pub fn new(policy: IncompatibleConditionPolicy) -> Self {
        Self { policy }
    }
}

impl GraphMapper for ExternalProjectsPlatformNarrowerMapper {
    fn name(&self) -> &str {
        "external-projects-platform-narrower"
    }

    fn map(&self, graph: Graph) -> Result<(Graph, Vec<SideEffect>)> {
        if !graph.projects.values().any(|project| project.is_external()) {
            return Ok((graph, Vec::new()));
        }

        let resolved = GraphTraverser::new(&graph).resolve_external_platforms();

        let mut dropped = Vec::new();
        for (from, to) in &resolved.incompatible {
            let to_external = graph
                .project(&to.project_path)
                .is_some_and(|project| project.is_external());
            if !to_external {
                continue;
            }
            match self.policy {
                IncompatibleConditionPolicy::Error => {
                    return Err(MapperError::IncompatiblePlatformCondition {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
                IncompatibleConditionPolicy::Warn => {
                    warn!(
                        "Dropping dependency of {} on {}: its platform condition excludes every platform of {}",
                        from, to, from.name
                    );
                    dropped.push((
                        NodeKey::target(&from.project_path, &from.name),
                        NodeKey::target(&to.project_path, &to.name),
                    ));
                }
            }
        }

        let mut narrowed = BTreeMap::new();
        for (reference, platforms) in resolved.platforms {
            let is_external = graph
                .project(&reference.project_path)
                .is_some_and(|project| project.is_external());
            if is_external {
                narrowed.insert(reference, platforms);
            }
        }

        let mut graph = graph;
        for (from, to) in &dropped {
            graph.remove_edge(from, to);
        }

        for (reference, platforms) in narrowed {
            let Some(project) = graph.project_mut(&reference.project_path) else {
                return Err(MapperError::ProjectNotFound(reference.project_path));
            };
            let Some(target) = project.target_mut(&reference.name) else {
                continue;
            };

            debug!(
                "Narrowed {} from {} to {}",
                reference,
                format_platforms(&target.platforms),
                format_platforms(&platforms)
            );
            target.deployment_targets = target.deployment_targets.filtered(&platforms);
            if platforms.is_empty() {
                target.mark_prunable();
            }
            target.platforms = platforms;
        }

        Ok((graph, Vec::new()))
    }
}
