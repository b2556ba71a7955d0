//! Manifest decoding.
//!
//! The graph loader consumes already-decoded [`Project`], [`Workspace`] and
//! [`Config`] values through the [`ManifestLoading`] trait. [`TomlManifestLoader`]
//! decodes them from `Project.toml`, `Workspace.toml` and `Config.toml` files and
//! resolves every relative path against the manifest's directory.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::model::{
    Config, GenerationOptions, Project, ProjectKind, Scheme, Settings, Target, TargetDependency,
    TargetReference, Workspace,
};
use crate::paths::{absolutize, normalize};

/// File name of a project manifest
pub const PROJECT_MANIFEST: &str = "Project.toml";
/// File name of a workspace manifest
pub const WORKSPACE_MANIFEST: &str = "Workspace.toml";
/// File name of a config manifest
pub const CONFIG_MANIFEST: &str = "Config.toml";

/// Errors decoding manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest not found at {}", path.display())]
    ManifestNotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Project {} declares the target '{name}' more than once", path.display())]
    DuplicateTarget { path: PathBuf, name: String },
}

impl ManifestError {
    pub fn read_file(path: &Path, source: std::io::Error) -> Self {
        ManifestError::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn parse(path: &Path, source: toml::de::Error) -> Self {
        ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Kinds of manifest a directory can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Manifest {
    Project,
    Workspace,
    Config,
}

impl Manifest {
    pub fn file_name(&self) -> &'static str {
        match self {
            Manifest::Project => PROJECT_MANIFEST,
            Manifest::Workspace => WORKSPACE_MANIFEST,
            Manifest::Config => CONFIG_MANIFEST,
        }
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Produces decoded manifests for a directory.
pub trait ManifestLoading: Send + Sync {
    /// Manifests present in the directory.
    fn manifests_at(&self, path: &Path) -> BTreeSet<Manifest>;

    fn load_project(&self, path: &Path) -> Result<Project>;

    fn load_workspace(&self, path: &Path) -> Result<Workspace>;

    /// Load the config that applies to `path`, or a default one.
    fn load_config(&self, path: &Path) -> Result<Config>;
}

// ============================================================================
// TOML Documents
// ============================================================================

#[derive(Debug, Deserialize)]
struct ProjectDocument {
    name: String,
    #[serde(default)]
    kind: ProjectKind,
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    targets: Vec<Target>,
    #[serde(default)]
    schemes: Vec<SchemeDocument>,
}

/// Schemes reference targets of the same project by name.
#[derive(Debug, Deserialize)]
struct SchemeDocument {
    name: String,
    #[serde(default)]
    build_targets: Vec<String>,
    #[serde(default)]
    test_targets: Vec<String>,
    run_target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceDocument {
    name: String,
    #[serde(default)]
    projects: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigDocument {
    compatible_xcode_versions: Vec<String>,
    generation_options: GenerationOptions,
}

// ============================================================================
// TOML Loader
// ============================================================================

/// Reads manifests from TOML files.
#[derive(Debug, Clone, Default)]
pub struct TomlManifestLoader;

impl TomlManifestLoader {
    pub fn new() -> Self {
        Self
    }

    fn read<T: for<'de> Deserialize<'de>>(&self, file: &Path) -> Result<T> {
        if !file.exists() {
            return Err(ManifestError::ManifestNotFound {
                path: file.to_path_buf(),
            });
        }
        let content =
            std::fs::read_to_string(file).map_err(|e| ManifestError::read_file(file, e))?;
        toml::from_str(&content).map_err(|e| ManifestError::parse(file, e))
    }
}

impl ManifestLoading for TomlManifestLoader {
    fn manifests_at(&self, path: &Path) -> BTreeSet<Manifest> {
        [Manifest::Project, Manifest::Workspace, Manifest::Config]
            .into_iter()
            .filter(|manifest| path.join(manifest.file_name()).is_file())
            .collect()
    }

    fn load_project(&self, path: &Path) -> Result<Project> {
        let path = normalize(path);
        let file = path.join(PROJECT_MANIFEST);
        let document: ProjectDocument = self.read(&file)?;
        debug!("Decoded project manifest {}", file.display());
        project_from_document(&path, document)
    }

    fn load_workspace(&self, path: &Path) -> Result<Workspace> {
        let path = normalize(path);
        let document: WorkspaceDocument = self.read(&path.join(WORKSPACE_MANIFEST))?;
        let projects = document
            .projects
            .iter()
            .map(|project| absolutize(&path, project))
            .collect();
        Ok(Workspace::new(path, document.name, projects))
    }

    fn load_config(&self, path: &Path) -> Result<Config> {
        let path = normalize(path);
        for dir in path.ancestors() {
            let file = dir.join(CONFIG_MANIFEST);
            if file.is_file() {
                let document: ConfigDocument = self.read(&file)?;
                let mut generation_options = document.generation_options;
                generation_options.external_projects_directory = generation_options
                    .external_projects_directory
                    .map(|directory| absolutize(dir, &directory));
                return Ok(Config {
                    path: dir.to_path_buf(),
                    compatible_xcode_versions: document.compatible_xcode_versions,
                    generation_options,
                });
            }
        }
        Ok(Config::default_at(path))
    }
}

fn project_from_document(path: &Path, document: ProjectDocument) -> Result<Project> {
    let mut seen = BTreeSet::new();
    for target in &document.targets {
        if !seen.insert(target.name.as_str()) {
            return Err(ManifestError::DuplicateTarget {
                path: path.to_path_buf(),
                name: target.name.clone(),
            });
        }
    }

    let targets = document
        .targets
        .into_iter()
        .map(|target| absolutize_target(path, target))
        .collect();

    let reference = |name: &String| TargetReference::new(path, name.clone());
    let schemes = document
        .schemes
        .into_iter()
        .map(|scheme| Scheme {
            build_targets: scheme.build_targets.iter().map(reference).collect(),
            test_targets: scheme.test_targets.iter().map(reference).collect(),
            run_target: scheme.run_target.as_ref().map(reference),
            name: scheme.name,
        })
        .collect();

    let mut project = Project::new(path, document.name, targets);
    project.kind = document.kind;
    project.settings = document.settings;
    project.schemes = schemes;
    Ok(project)
}

fn absolutize_target(base: &Path, mut target: Target) -> Target {
    target.sources = target.sources.iter().map(|p| absolutize(base, p)).collect();
    target.resources = target.resources.iter().map(|p| absolutize(base, p)).collect();
    target.dependencies = target
        .dependencies
        .into_iter()
        .map(|dependency| absolutize_dependency(base, dependency))
        .collect();
    target
}

fn absolutize_dependency(base: &Path, dependency: TargetDependency) -> TargetDependency {
    match dependency {
        TargetDependency::Project {
            target,
            path,
            condition,
        } => TargetDependency::Project {
            target,
            path: absolutize(base, &path),
            condition,
        },
        TargetDependency::Framework {
            path,
            status,
            condition,
        } => TargetDependency::Framework {
            path: absolutize(base, &path),
            status,
            condition,
        },
        TargetDependency::Xcframework {
            path,
            status,
            condition,
        } => TargetDependency::Xcframework {
            path: absolutize(base, &path),
            status,
            condition,
        },
        TargetDependency::Library {
            path,
            public_headers,
            swift_module_map,
            condition,
        } => TargetDependency::Library {
            path: absolutize(base, &path),
            public_headers: absolutize(base, &public_headers),
            swift_module_map: swift_module_map.map(|p| absolutize(base, &p)),
            condition,
        },
        other => other,
    }
}
