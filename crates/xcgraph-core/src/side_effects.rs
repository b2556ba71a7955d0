//! Filesystem side effects produced by graph mappers.
//!
//! Mappers never touch the filesystem. They describe what must happen as
//! [`SideEffect`] values, and the caller runs them through a
//! [`SideEffectExecutor`] once the whole pipeline has succeeded.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors executing side effects.
#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file {}: {source}", path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SideEffectError {
    fn create_dir(path: &Path, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for side effect execution
pub type Result<T> = std::result::Result<T, SideEffectError>;

/// A filesystem change requested by a mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    /// Write `contents` to `path`, creating parent directories.
    File { path: PathBuf, contents: Vec<u8> },
    /// Ensure a directory exists.
    Directory { path: PathBuf },
    /// Remove a file or directory if present.
    Delete { path: PathBuf },
}

impl SideEffect {
    pub fn path(&self) -> &Path {
        match self {
            SideEffect::File { path, .. }
            | SideEffect::Directory { path }
            | SideEffect::Delete { path } => path,
        }
    }
}

impl std::fmt::Display for SideEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SideEffect::File { path, contents } => {
                write!(f, "write {} ({} bytes)", path.display(), contents.len())
            }
            SideEffect::Directory { path } => write!(f, "mkdir {}", path.display()),
            SideEffect::Delete { path } => write!(f, "delete {}", path.display()),
        }
    }
}

/// Applies side effects in order.
#[derive(Debug, Clone, Default)]
pub struct SideEffectExecutor {
    dry_run: bool,
}

impl SideEffectExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor that only logs what it would do.
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }

    /// Execute every side effect, stopping at the first failure.
    pub fn execute(&self, side_effects: &[SideEffect]) -> Result<()> {
        for side_effect in side_effects {
            if self.dry_run {
                info!("Would {}", side_effect);
                continue;
            }
            debug!("Executing {}", side_effect);
            self.execute_one(side_effect)?;
        }
        Ok(())
    }

    fn execute_one(&self, side_effect: &SideEffect) -> Result<()> {
        match side_effect {
            SideEffect::Directory { path } => {
                std::fs::create_dir_all(path).map_err(|e| SideEffectError::create_dir(path, e))
            }
            SideEffect::File { path, contents } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| SideEffectError::create_dir(parent, e))?;
                }
                std::fs::write(path, contents).map_err(|source| SideEffectError::WriteFile {
                    path: path.clone(),
                    source,
                })
            }
            SideEffect::Delete { path } => {
                let removed = if path.is_dir() {
                    std::fs::remove_dir_all(path)
                } else if path.exists() {
                    std::fs::remove_file(path)
                } else {
                    Ok(())
                };
                removed.map_err(|source| SideEffectError::Delete {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_execute_creates_files_and_directories() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("Derived");
        let file = temp.path().join("nested/Info.plist");

        SideEffectExecutor::new()
            .execute(&[
                SideEffect::Directory { path: dir.clone() },
                SideEffect::File {
                    path: file.clone(),
                    contents: b"plist".to_vec(),
                },
            ])
            .unwrap();

        assert!(dir.is_dir());
        assert_eq!(std::fs::read(&file).unwrap(), b"plist");
    }

    #[test]
    fn test_delete_missing_path_is_noop() {
        let temp = TempDir::new().unwrap();
        SideEffectExecutor::new()
            .execute(&[SideEffect::Delete {
                path: temp.path().join("missing"),
            }])
            .unwrap();
    }

    #[test]
    fn test_delete_removes_directory_tree() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("Old");
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        std::fs::write(dir.join("sub/file"), "x").unwrap();

        SideEffectExecutor::new()
            .execute(&[SideEffect::Delete { path: dir.clone() }])
            .unwrap();

        assert!(!dir.exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("Derived");

        SideEffectExecutor::dry_run()
            .execute(&[SideEffect::Directory { path: dir.clone() }])
            .unwrap();

        assert!(!dir.exists());
    }
}
