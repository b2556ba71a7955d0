//! Decoded manifest structures: platforms, products, targets, projects and workspaces.

pub mod platform;
pub mod product;
pub mod project;

pub use platform::{
    format_platforms, CombinationResult, DeploymentTargets, Platform, PlatformCondition,
};
pub use product::Product;
pub use project::{
    Config, GenerationOptions, LinkingStatus, Project, ProjectKind, Scheme, Settings, Target,
    TargetDependency, TargetReference, Workspace, PRUNABLE_TAG, SRCROOT_SETTING,
};
