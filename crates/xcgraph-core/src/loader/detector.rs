//! Cycle detection during graph loading.
//!
//! The loader resolves dependencies depth-first. Before following an edge it calls
//! [`CircularDependencyDetector::start`]; once a target's dependencies are all
//! resolved it calls [`CircularDependencyDetector::complete`]. The detector keeps
//! the edges of every target whose resolution is still in flight. Reaching one of
//! those targets again means it is an ancestor of the current path: a cycle.

use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

use super::GraphLoadingError;
use crate::model::TargetReference;

/// Tracks in-flight dependency edges of a single load.
#[derive(Debug, Default)]
pub struct CircularDependencyDetector {
    edges: BTreeMap<TargetReference, Vec<TargetReference>>,
}

impl CircularDependencyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` is about to resolve its dependency `to`.
    ///
    /// Fails when `to` is already being resolved, with the full cycle
    /// `to -> ... -> from -> to`.
    pub fn start(
        &mut self,
        from: &TargetReference,
        to: &TargetReference,
    ) -> Result<(), GraphLoadingError> {
        trace!("start {} -> {}", from, to);

        if from == to || self.edges.contains_key(to) {
            let mut cycle = self.path_between(to, from).unwrap_or_else(|| {
                if from == to {
                    vec![from.clone()]
                } else {
                    vec![to.clone(), from.clone()]
                }
            });
            cycle.push(to.clone());
            return Err(GraphLoadingError::CircularDependency {
                from: from.clone(),
                to: to.clone(),
                cycle,
            });
        }

        self.edges.entry(from.clone()).or_default().push(to.clone());
        Ok(())
    }

    /// Mark `node` as fully resolved, together with every edge it recorded.
    pub fn complete(&mut self, node: &TargetReference) {
        trace!("complete {}", node);
        let mut pending = vec![node.clone()];
        let mut visited = BTreeSet::new();
        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(children) = self.edges.remove(&current) {
                pending.extend(children);
            }
        }
    }

    /// Whether any resolution is still in flight.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Depth-first search over in-flight edges for a path `from -> ... -> to`.
    fn path_between(
        &self,
        from: &TargetReference,
        to: &TargetReference,
    ) -> Option<Vec<TargetReference>> {
        let mut stack = vec![vec![from.clone()]];
        let mut visited = BTreeSet::new();
        while let Some(path) = stack.pop() {
            let last = path.last()?;
            if last == to {
                return Some(path);
            }
            if !visited.insert(last.clone()) {
                continue;
            }
            if let Some(children) = self.edges.get(last) {
                for child in children.iter().rev() {
                    let mut next = path.clone();
                    next.push(child.clone());
                    stack.push(next);
                }
            }
        }
        None
    }
}
