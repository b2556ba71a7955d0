//! xcgraph Core - Dependency graph of Xcode-style projects
//!
//! This crate provides the core functionality behind project generation:
//! - Manifest decoding into projects, targets and workspaces
//! - Graph loading with circular dependency detection
//! - Traversal queries for linking, embedding and copying products
//! - Graph mappers: platform narrowing, pruning and tree-shaking
//! - Binary caching: content hashing, artifact lookup and substitution

pub mod binary_cache;
pub mod graph;
pub mod loader;
pub mod manifest;
pub mod mappers;
pub mod metadata;
pub mod model;
pub mod node;
pub mod paths;
pub mod side_effects;
pub mod traverser;

// Graph re-exports
pub use graph::{EdgeData, Graph, GraphDocument, GraphError};
pub use node::{
    BinaryArchitecture, BinaryLinking, BundleNode, FrameworkNode, GraphNode, LibraryNode, NodeKey,
    PackageProductNode, SdkNode, TargetNode, XCFrameworkNode,
};

// Model re-exports
pub use model::{
    DeploymentTargets, LinkingStatus, Platform, PlatformCondition, Product, Project, Scheme,
    Target, TargetDependency, TargetReference, Workspace,
};

// Loading re-exports
pub use loader::{GraphLoader, GraphLoadingError};
pub use manifest::{Manifest, ManifestError, ManifestLoading, TomlManifestLoader};
pub use metadata::{MetadataError, MetadataProviding, SystemMetadataProvider};

// Traversal re-exports
pub use traverser::{DependencyReference, GraphTarget, GraphTraverser, LinkingError};

// Mapper re-exports
pub use mappers::{default_pipeline, GraphMapper, MapperError, SequentialGraphMapper};
pub use side_effects::{SideEffect, SideEffectExecutor};

// Binary cache re-exports
pub use binary_cache::{
    ArtifactResolver, ArtifactStatus, ArtifactStore, CacheError, LocalArtifactStore,
    TargetContentHasher,
};
