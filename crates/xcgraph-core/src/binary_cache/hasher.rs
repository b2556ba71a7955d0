//! Content fingerprints of targets.
//!
//! A target's hash covers everything that affects its built product: its own
//! declaration, the contents of its sources and resources, and the hashes of the
//! targets it depends on. A change anywhere below a target therefore changes the
//! target's hash too.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::{CacheError, Result};
use crate::graph::Graph;
use crate::model::TargetReference;
use crate::node::NodeKey;
use crate::traverser::GraphTraverser;

/// Hash the contents of a file as lowercase hex SHA-256.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(8192, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Computes and memoizes target fingerprints.
#[derive(Debug, Default)]
pub struct TargetContentHasher {
    hashes: HashMap<TargetReference, String>,
}

impl TargetContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash every target of the graph, dependencies first.
    pub fn hash_graph(&mut self, graph: &Graph) -> Result<BTreeMap<TargetReference, String>> {
        let targets: Vec<TargetReference> = GraphTraverser::new(graph)
            .all_targets_topological_sorted()?
            .iter()
            .map(|target| target.reference())
            .collect();

        let mut hashes = BTreeMap::new();
        for reference in targets {
            let hash = self.hash_target(graph, &reference)?;
            hashes.insert(reference, hash);
        }
        debug!("Hashed {} targets of {}", hashes.len(), graph.name);
        Ok(hashes)
    }

    /// Hash one target, hashing its target dependencies first.
    pub fn hash_target(&mut self, graph: &Graph, reference: &TargetReference) -> Result<String> {
        if let Some(hash) = self.hashes.get(reference) {
            return Ok(hash.clone());
        }

        let target = graph
            .target(reference)
            .ok_or_else(|| CacheError::TargetNotFound(reference.clone()))?;

        let mut dependency_hashes = Vec::new();
        for (node, edge) in graph.dependencies(&NodeKey::from(reference)) {
            let key = node.key();
            let fingerprint = match key.as_target() {
                Some(dependency) => self.hash_target(graph, &dependency)?,
                None => key.to_string(),
            };
            let condition = edge
                .condition()
                .map(|c| serde_json::to_string(c).unwrap_or_default())
                .unwrap_or_default();
            dependency_hashes.push(format!("{}|{}", fingerprint, condition));
        }

        let sources = hash_files(&target.sources)?;
        let resources = hash_files(&target.resources)?;

        let mut hasher = Sha256::new();
        hasher.update(target.name.as_bytes());
        hasher.update(target.product_name().as_bytes());
        hasher.update(target.product.as_str().as_bytes());
        for platform in &target.platforms {
            hasher.update(platform.as_str().as_bytes());
        }
        for (key, value) in &target.settings {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        for hash in sources.iter().chain(resources.iter()) {
            hasher.update(hash.as_bytes());
        }
        for dependency in &target.dependencies {
            hasher.update(serde_json::to_string(dependency).unwrap_or_default().as_bytes());
        }
        for hash in &dependency_hashes {
            hasher.update(hash.as_bytes());
        }

        let hash = format!("{:x}", hasher.finalize());
        trace!("Hash of {}: {}", reference, hash);
        self.hashes.insert(reference.clone(), hash.clone());
        Ok(hash)
    }
}

/// Hash the files under `paths` in parallel. Directories are walked in name order.
///
/// Files are labelled relative to the path that named them, so moving a checkout
/// does not change its hashes.
fn hash_files(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    CacheError::io(path, source)
                })?;
                if entry.file_type().is_file() {
                    let label = entry
                        .path()
                        .strip_prefix(path)
                        .unwrap_or(entry.path())
                        .display()
                        .to_string();
                    files.push((label, entry.into_path()));
                }
            }
        } else if path.is_file() {
            let label = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push((label, path.clone()));
        } else {
            return Err(CacheError::SourceNotFound(path.clone()));
        }
    }

    files
        .par_iter()
        .map(|(label, file)| {
            hash_file(file)
                .map(|hash| format!("{}:{}", label, hash))
                .map_err(|e| CacheError::io(file, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Platform, Product, Project, Target, Workspace};
    use crate::node::GraphNode;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn graph(root: &Path, core_sources: Vec<PathBuf>) -> Graph {
        let project = Project::new(
            root,
            "App",
            vec![
                Target::new("App", Product::App, [Platform::IOS]),
                Target::new("Core", Product::Framework, [Platform::IOS]).with_sources(core_sources),
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
                &NodeKey::target(root, "Core"),
                None,
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_hash_file_is_sha256() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.swift");
        std::fs::write(&path, "hello").unwrap();

        assert_eq!(
            hash_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_hash_is_stable() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("Core.swift");
        std::fs::write(&source, "struct Core {}").unwrap();
        let graph = graph(temp.path(), vec![source]);

        let first = TargetContentHasher::new().hash_graph(&graph).unwrap();
        let second = TargetContentHasher::new().hash_graph(&graph).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_source_change_propagates_to_dependents() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("Core.swift");
        std::fs::write(&source, "struct Core {}").unwrap();
        let graph = graph(temp.path(), vec![source.clone()]);
        let app = TargetReference::new(temp.path(), "App");
        let core = TargetReference::new(temp.path(), "Core");

        let before = TargetContentHasher::new().hash_graph(&graph).unwrap();
        std::fs::write(&source, "struct Core { let x = 1 }").unwrap();
        let after = TargetContentHasher::new().hash_graph(&graph).unwrap();

        assert_ne!(before[&core], after[&core]);
        assert_ne!(before[&app], after[&app]);
    }

    #[test]
    fn test_source_directories_are_walked() {
        let temp = TempDir::new().unwrap();
        let sources = temp.path().join("Sources");
        std::fs::create_dir_all(sources.join("Nested")).unwrap();
        std::fs::write(sources.join("A.swift"), "a").unwrap();
        std::fs::write(sources.join("Nested/B.swift"), "b").unwrap();
        let graph = graph(temp.path(), vec![sources.clone()]);
        let core = TargetReference::new(temp.path(), "Core");

        let before = TargetContentHasher::new().hash_target(&graph, &core).unwrap();
        std::fs::write(sources.join("Nested/B.swift"), "changed").unwrap();
        let after = TargetContentHasher::new().hash_target(&graph, &core).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_missing_source_names_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("Missing.swift");
        let graph = graph(temp.path(), vec![missing.clone()]);

        let err = TargetContentHasher::new().hash_graph(&graph).unwrap_err();

        match err {
            CacheError::SourceNotFound(path) => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_target() {
        let temp = TempDir::new().unwrap();
        let graph = graph(temp.path(), vec![]);
        let err = TargetContentHasher::new()
            .hash_target(&graph, &TargetReference::new(temp.path(), "Ghost"))
            .unwrap_err();
        assert!(matches!(err, CacheError::TargetNotFound(_)));
    }
}
