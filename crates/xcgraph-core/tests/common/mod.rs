//! Common test utilities for integration tests.
//!
//! Provides an in-memory manifest loader, a metadata provider that never shells
//! out, and helpers to build graphs and lay out fixture files.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use xcgraph_core::graph::Graph;
use xcgraph_core::manifest::{self, Manifest, ManifestError, ManifestLoading};
use xcgraph_core::metadata::{
    self, FrameworkMetadata, LibraryMetadata, MetadataError, MetadataProviding,
    XCFrameworkMetadata,
};
use xcgraph_core::model::{Config, Platform, Project, Workspace};
use xcgraph_core::node::{BinaryArchitecture, BinaryLinking, GraphNode, NodeKey, XCFrameworkLibrary};

// ============================================================================
// Manifests
// ============================================================================

/// Serves projects and workspaces registered up front.
#[derive(Default)]
pub struct InMemoryManifestLoader {
    projects: HashMap<PathBuf, Project>,
    workspaces: HashMap<PathBuf, Workspace>,
    project_loads: AtomicUsize,
    config_loads: AtomicUsize,
}

impl InMemoryManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.projects.insert(project.path.clone(), project);
        self
    }

    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspaces.insert(workspace.path.clone(), workspace);
        self
    }

    /// How many times a project manifest was decoded.
    pub fn project_loads(&self) -> usize {
        self.project_loads.load(Ordering::SeqCst)
    }

    /// How many times a config manifest was decoded.
    pub fn config_loads(&self) -> usize {
        self.config_loads.load(Ordering::SeqCst)
    }
}

impl ManifestLoading for InMemoryManifestLoader {
    fn manifests_at(&self, path: &Path) -> BTreeSet<Manifest> {
        let mut manifests = BTreeSet::new();
        if self.projects.contains_key(path) {
            manifests.insert(Manifest::Project);
        }
        if self.workspaces.contains_key(path) {
            manifests.insert(Manifest::Workspace);
        }
        manifests
    }

    fn load_project(&self, path: &Path) -> manifest::Result<Project> {
        self.project_loads.fetch_add(1, Ordering::SeqCst);
        self.projects
            .get(path)
            .cloned()
            .ok_or_else(|| ManifestError::ManifestNotFound {
                path: path.join(manifest::PROJECT_MANIFEST),
            })
    }

    fn load_workspace(&self, path: &Path) -> manifest::Result<Workspace> {
        self.workspaces
            .get(path)
            .cloned()
            .ok_or_else(|| ManifestError::ManifestNotFound {
                path: path.join(manifest::WORKSPACE_MANIFEST),
            })
    }

    fn load_config(&self, path: &Path) -> manifest::Result<Config> {
        self.config_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Config::default_at(path))
    }
}

// ============================================================================
// Binary Metadata
// ============================================================================

/// Reports fixed metadata for any binary.
///
/// Libraries are dynamic `armv7`/`armv7s` binaries, frameworks dynamic `arm64`
/// binaries and xcframeworks carry a single iOS device slice.
#[derive(Debug, Clone, Default)]
pub struct StubMetadataProvider;

impl MetadataProviding for StubMetadataProvider {
    fn load_framework(&self, path: &Path) -> metadata::Result<FrameworkMetadata> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| MetadataError::BinaryNotFound(path.to_path_buf()))?;
        Ok(FrameworkMetadata {
            path: path.to_path_buf(),
            binary_path: path.join(name),
            dsym_path: None,
            linking: BinaryLinking::Dynamic,
            architectures: vec![BinaryArchitecture::Arm64],
            is_carthage: false,
        })
    }

    fn load_library(
        &self,
        path: &Path,
        public_headers: &Path,
        swift_module_map: Option<&Path>,
    ) -> metadata::Result<LibraryMetadata> {
        Ok(LibraryMetadata {
            path: path.to_path_buf(),
            public_headers: public_headers.to_path_buf(),
            swift_module_map: swift_module_map.map(Path::to_path_buf),
            architectures: vec![BinaryArchitecture::Armv7, BinaryArchitecture::Armv7s],
            linking: BinaryLinking::Dynamic,
        })
    }

    fn load_xcframework(&self, path: &Path) -> metadata::Result<XCFrameworkMetadata> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| MetadataError::XCFrameworkLibrariesNotFound(path.to_path_buf()))?;
        Ok(XCFrameworkMetadata {
            path: path.to_path_buf(),
            libraries: vec![XCFrameworkLibrary {
                identifier: "ios-arm64".to_string(),
                library_path: PathBuf::from(format!("{name}.framework")),
                platform: Platform::IOS,
                architectures: vec![BinaryArchitecture::Arm64],
                variant: None,
            }],
            linking: BinaryLinking::Dynamic,
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Directory of the TOML fixture workspaces.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Create an empty file, and its parent directories.
pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, "").unwrap();
}

/// Names of the targets a target depends on directly, in declaration order.
pub fn dependency_names(graph: &Graph, key: &NodeKey) -> Vec<String> {
    graph
        .dependencies(key)
        .into_iter()
        .map(|(node, _)| match node {
            GraphNode::Target(target) => target.name.clone(),
            other => other.path().display().to_string(),
        })
        .collect()
}

/// Every dependency edge points at a node of the graph.
pub fn assert_referentially_complete(graph: &Graph) {
    let keys = graph.node_keys();
    for (from, to, _) in graph.iter_edges() {
        assert!(keys.contains(&from.key()), "dangling source {}", from.key());
        assert!(keys.contains(&to.key()), "dangling target {}", to.key());
    }
}
