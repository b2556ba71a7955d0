//! Projects, targets, workspaces and their declared dependencies.
//!
//! These are the already-decoded manifest structures. Every path stored here is
//! absolute; relative manifest paths are resolved by the manifest loader.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use super::platform::{DeploymentTargets, Platform, PlatformCondition};
use super::product::Product;

/// Tag marking a target for removal by the tree-shaking mapper.
pub const PRUNABLE_TAG: &str = "xcgraph:prunable";

/// Build setting naming the project's source root.
pub const SRCROOT_SETTING: &str = "SRCROOT";

/// Base build settings (`KEY = value`).
pub type Settings = BTreeMap<String, String>;

// ============================================================================
// References
// ============================================================================

/// A target addressed by the directory of its project and its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetReference {
    pub project_path: PathBuf,
    pub name: String,
}

impl TargetReference {
    pub fn new(project_path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project_path.display(), self.name)
    }
}

/// Whether a linked dependency must be present at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkingStatus {
    #[default]
    Required,
    Optional,
}

// ============================================================================
// Target Dependencies
// ============================================================================

/// An unresolved dependency declaration of a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetDependency {
    /// A target in the same project.
    Target {
        name: String,
        condition: Option<PlatformCondition>,
    },
    /// A target in the project at `path`.
    Project {
        target: String,
        path: PathBuf,
        condition: Option<PlatformCondition>,
    },
    /// A precompiled `.framework`.
    Framework {
        path: PathBuf,
        #[serde(default)]
        status: LinkingStatus,
        condition: Option<PlatformCondition>,
    },
    /// A precompiled `.xcframework`.
    Xcframework {
        path: PathBuf,
        #[serde(default)]
        status: LinkingStatus,
        condition: Option<PlatformCondition>,
    },
    /// A precompiled library with its public headers.
    Library {
        path: PathBuf,
        public_headers: PathBuf,
        swift_module_map: Option<PathBuf>,
        condition: Option<PlatformCondition>,
    },
    /// A product of a resolved package.
    Package {
        product: String,
        condition: Option<PlatformCondition>,
    },
    /// A system framework or library (`UIKit.framework`, `libc++.tbd`).
    Sdk {
        name: String,
        #[serde(default)]
        status: LinkingStatus,
        condition: Option<PlatformCondition>,
    },
}

impl TargetDependency {
    pub fn target(name: impl Into<String>) -> Self {
        TargetDependency::Target {
            name: name.into(),
            condition: None,
        }
    }

    pub fn project(target: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        TargetDependency::Project {
            target: target.into(),
            path: path.into(),
            condition: None,
        }
    }

    pub fn framework(path: impl Into<PathBuf>) -> Self {
        TargetDependency::Framework {
            path: path.into(),
            status: LinkingStatus::Required,
            condition: None,
        }
    }

    pub fn xcframework(path: impl Into<PathBuf>) -> Self {
        TargetDependency::Xcframework {
            path: path.into(),
            status: LinkingStatus::Required,
            condition: None,
        }
    }

    pub fn library(
        path: impl Into<PathBuf>,
        public_headers: impl Into<PathBuf>,
        swift_module_map: Option<PathBuf>,
    ) -> Self {
        TargetDependency::Library {
            path: path.into(),
            public_headers: public_headers.into(),
            swift_module_map,
            condition: None,
        }
    }

    pub fn package(product: impl Into<String>) -> Self {
        TargetDependency::Package {
            product: product.into(),
            condition: None,
        }
    }

    pub fn sdk(name: impl Into<String>, status: LinkingStatus) -> Self {
        TargetDependency::Sdk {
            name: name.into(),
            status,
            condition: None,
        }
    }

    /// Restrict the dependency to the given condition.
    pub fn when(mut self, new_condition: Option<PlatformCondition>) -> Self {
        match &mut self {
            TargetDependency::Target { condition, .. }
            | TargetDependency::Project { condition, .. }
            | TargetDependency::Framework { condition, .. }
            | TargetDependency::Xcframework { condition, .. }
            | TargetDependency::Library { condition, .. }
            | TargetDependency::Package { condition, .. }
            | TargetDependency::Sdk { condition, .. } => *condition = new_condition,
        }
        self
    }

    /// The platform condition attached to the declaration.
    pub fn condition(&self) -> Option<&PlatformCondition> {
        match self {
            TargetDependency::Target { condition, .. }
            | TargetDependency::Project { condition, .. }
            | TargetDependency::Framework { condition, .. }
            | TargetDependency::Xcframework { condition, .. }
            | TargetDependency::Library { condition, .. }
            | TargetDependency::Package { condition, .. }
            | TargetDependency::Sdk { condition, .. } => condition.as_ref(),
        }
    }

    /// The referenced target, resolved against the declaring project's path.
    pub fn target_reference(&self, project_path: &Path) -> Option<TargetReference> {
        match self {
            TargetDependency::Target { name, .. } => {
                Some(TargetReference::new(project_path, name.clone()))
            }
            TargetDependency::Project { target, path, .. } => {
                Some(TargetReference::new(path.clone(), target.clone()))
            }
            _ => None,
        }
    }
}

// ============================================================================
// Target
// ============================================================================

/// A buildable unit declared by a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub product: Product,
    pub platforms: BTreeSet<Platform>,
    #[serde(default)]
    pub deployment_targets: DeploymentTargets,
    /// Overrides the product name (defaults to the target name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub resources: Vec<PathBuf>,
    #[serde(default)]
    pub dependencies: Vec<TargetDependency>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Target {
    /// Create a target without sources or dependencies.
    pub fn new(
        name: impl Into<String>,
        product: Product,
        platforms: impl IntoIterator<Item = Platform>,
    ) -> Self {
        Self {
            name: name.into(),
            product,
            platforms: platforms.into_iter().collect(),
            deployment_targets: DeploymentTargets::default(),
            product_name: None,
            sources: Vec::new(),
            resources: Vec::new(),
            dependencies: Vec::new(),
            settings: Settings::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Add a dependency declaration.
    pub fn with_dependency(mut self, dependency: TargetDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Add source files.
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = PathBuf>) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Add resource files.
    pub fn with_resources(mut self, resources: impl IntoIterator<Item = PathBuf>) -> Self {
        self.resources.extend(resources);
        self
    }

    /// Set the deployment targets.
    pub fn with_deployment_targets(mut self, deployment_targets: DeploymentTargets) -> Self {
        self.deployment_targets = deployment_targets;
        self
    }

    /// Product name without extension.
    pub fn product_name(&self) -> &str {
        self.product_name.as_deref().unwrap_or(&self.name)
    }

    /// Product name including its extension (`Core.framework`).
    pub fn product_name_with_extension(&self) -> String {
        match self.product {
            Product::StaticLibrary | Product::DynamicLibrary => {
                format!("lib{}.{}", self.product_name(), self.product.extension())
            }
            Product::CommandLineTool | Product::Macro => self.product_name().to_string(),
            product => format!("{}.{}", self.product_name(), product.extension()),
        }
    }

    /// Whether the product can carry resources in its own bundle.
    pub fn supports_resources(&self) -> bool {
        !matches!(
            self.product,
            Product::StaticLibrary | Product::DynamicLibrary | Product::StaticFramework
                | Product::CommandLineTool | Product::Macro
        )
    }

    /// Whether the target declares any resources.
    pub fn contains_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    /// Whether the target is marked for removal.
    pub fn is_prunable(&self) -> bool {
        self.tags.contains(PRUNABLE_TAG)
    }

    /// Mark the target for removal.
    pub fn mark_prunable(&mut self) {
        self.tags.insert(PRUNABLE_TAG.to_string());
    }
}

// ============================================================================
// Project
// ============================================================================

/// Whether a project is first-party or fetched from an external package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    #[default]
    Local,
    External,
}

/// A scheme grouping build, test and run actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheme {
    pub name: String,
    #[serde(default)]
    pub build_targets: Vec<TargetReference>,
    #[serde(default)]
    pub test_targets: Vec<TargetReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_target: Option<TargetReference>,
}

impl Scheme {
    /// Every target the scheme references.
    pub fn referenced_targets(&self) -> impl Iterator<Item = &TargetReference> {
        self.build_targets
            .iter()
            .chain(self.test_targets.iter())
            .chain(self.run_target.iter())
    }
}

/// A project: a directory with a manifest declaring an ordered list of targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Directory containing the manifest. Used as the project's identity.
    pub path: PathBuf,
    pub name: String,
    pub source_root: PathBuf,
    /// Where the generated project file is written.
    pub xcodeproj_path: PathBuf,
    #[serde(default)]
    pub kind: ProjectKind,
    pub targets: Vec<Target>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub schemes: Vec<Scheme>,
}

impl Project {
    /// Create a local project rooted at `path`.
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, targets: Vec<Target>) -> Self {
        let path = path.into();
        let name = name.into();
        Self {
            source_root: path.clone(),
            xcodeproj_path: path.join(format!("{}.xcodeproj", name)),
            path,
            name,
            kind: ProjectKind::Local,
            targets,
            settings: Settings::new(),
            schemes: Vec::new(),
        }
    }

    /// Mark the project as coming from an external package.
    pub fn external(mut self) -> Self {
        self.kind = ProjectKind::External;
        self
    }

    /// Add a scheme.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.schemes.push(scheme);
        self
    }

    pub fn is_external(&self) -> bool {
        self.kind == ProjectKind::External
    }

    /// Look up a target by name.
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Look up a target by name for mutation.
    pub fn target_mut(&mut self, name: &str) -> Option<&mut Target> {
        self.targets.iter_mut().find(|t| t.name == name)
    }
}

// ============================================================================
// Workspace & Config
// ============================================================================

/// A workspace: a named set of projects generated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub path: PathBuf,
    pub name: String,
    pub projects: Vec<PathBuf>,
    #[serde(default)]
    pub schemes: Vec<Scheme>,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, projects: Vec<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            projects,
            schemes: Vec::new(),
        }
    }
}

/// Options that influence how the graph is prepared for generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Overrides where external projects are generated, relative to the graph root.
    pub external_projects_directory: Option<PathBuf>,
}

/// Project-level configuration manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory the configuration applies to.
    pub path: PathBuf,
    #[serde(default)]
    pub compatible_xcode_versions: Vec<String>,
    #[serde(default)]
    pub generation_options: GenerationOptions,
}

impl Config {
    /// Default configuration for a directory without a config manifest.
    pub fn default_at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}
