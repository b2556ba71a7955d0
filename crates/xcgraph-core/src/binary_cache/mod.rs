//! Binary caching of targets.
//!
//! Targets are fingerprinted by [`TargetContentHasher`]; the fingerprints address
//! prebuilt artifacts in an [`ArtifactStore`]; [`ArtifactResolver`] finds which
//! cacheable targets have an artifact; and [`CacheGraphMutator`] rewrites the graph
//! so consumers link those artifacts instead of building the targets from source.

mod hasher;
mod mutator;
mod resolver;
mod store;

pub use hasher::{hash_file, TargetContentHasher};
pub use mutator::{CacheGraphMutator, SourceTargets};
pub use resolver::{ArtifactResolver, ArtifactStatus};
pub use store::{ArtifactStore, LocalArtifactStore, ARTIFACT_EXTENSIONS};

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::graph::GraphError;
use crate::metadata::MetadataError;
use crate::model::TargetReference;

/// Errors raised by the binary cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Couldn't find source file {} needed to hash the target", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Target {0} is not in the graph")]
    TargetNotFound(TargetReference),

    #[error("Couldn't load the cached artifact at {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Unsupported artifact {}: expected a .xcframework, .framework or .bundle", .0.display())]
    UnsupportedArtifact(PathBuf),

    #[error("Invalid cacheable product: {0}")]
    InvalidProduct(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl CacheError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for binary cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
