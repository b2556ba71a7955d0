//! Storage of prebuilt artifacts addressed by target hash.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{CacheError, Result};

/// Artifact kinds a cached target can be replaced with, in lookup order.
pub const ARTIFACT_EXTENSIONS: &[&str] = &["xcframework", "framework", "bundle"];

/// A store of prebuilt artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Path of the artifact of `name` with the given hash, if stored.
    async fn fetch(&self, hash: &str, name: &str) -> Result<Option<PathBuf>>;

    /// Store a copy of `artifact` and return where it was stored.
    async fn store(&self, hash: &str, name: &str, artifact: &Path) -> Result<PathBuf>;

    async fn exists(&self, hash: &str, name: &str) -> Result<bool> {
        Ok(self.fetch(hash, name).await?.is_some())
    }
}

/// Artifact store on the local filesystem.
///
/// Artifacts live at `<root>/<name>/<hash>/<name>.<extension>`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory(&self, hash: &str, name: &str) -> PathBuf {
        self.root.join(name).join(hash)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn fetch(&self, hash: &str, name: &str) -> Result<Option<PathBuf>> {
        let directory = self.directory(hash, name);
        for extension in ARTIFACT_EXTENSIONS {
            let candidate = directory.join(format!("{}.{}", name, extension));
            let exists = tokio::fs::try_exists(&candidate)
                .await
                .map_err(|e| CacheError::io(&candidate, e))?;
            if exists {
                debug!("Cache hit for {} ({})", name, hash);
                return Ok(Some(candidate));
            }
        }
        debug!("Cache miss for {} ({})", name, hash);
        Ok(None)
    }

    async fn store(&self, hash: &str, name: &str, artifact: &Path) -> Result<PathBuf> {
        let extension = artifact
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| ARTIFACT_EXTENSIONS.contains(e))
            .ok_or_else(|| CacheError::UnsupportedArtifact(artifact.to_path_buf()))?;

        let directory = self.directory(hash, name);
        if tokio::fs::try_exists(&directory)
            .await
            .map_err(|e| CacheError::io(&directory, e))?
        {
            tokio::fs::remove_dir_all(&directory)
                .await
                .map_err(|e| CacheError::io(&directory, e))?;
        }
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| CacheError::io(&directory, e))?;

        let destination = directory.join(format!("{}.{}", name, extension));
        copy_recursively(artifact, &destination).await?;
        debug!("Stored {} ({}) at {}", name, hash, destination.display());
        Ok(destination)
    }
}

/// Copy a file or a directory tree.
async fn copy_recursively(source: &Path, destination: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(source)
        .await
        .map_err(|e| CacheError::io(source, e))?;
    if metadata.is_file() {
        tokio::fs::copy(source, destination)
            .await
            .map_err(|e| CacheError::io(source, e))?;
        return Ok(());
    }

    let mut pending = vec![(source.to_path_buf(), destination.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to)
            .await
            .map_err(|e| CacheError::io(&to, e))?;
        let mut entries = tokio::fs::read_dir(&from)
            .await
            .map_err(|e| CacheError::io(&from, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&from, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CacheError::io(&entry.path(), e))?;
            let target = to.join(entry.file_name());
            if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), &target)
                    .await
                    .map_err(|e| CacheError::io(&entry.path(), e))?;
            }
        }
    }
    Ok(())
}
