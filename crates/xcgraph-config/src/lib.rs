//! xcgraph Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.xcgraph/config.toml`
//! - Local config: `.xcgraph/config.toml` (next to the workspace or project manifest)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Product kinds that may be listed in `cache.cacheable_products`.
pub const KNOWN_PRODUCTS: &[&str] = &[
    "app",
    "app_clip",
    "app_extension",
    "watch2_app",
    "watch2_extension",
    "static_library",
    "dynamic_library",
    "framework",
    "static_framework",
    "bundle",
    "unit_tests",
    "ui_tests",
    "command_line_tool",
    "macro",
    "xpc",
    "system_extension",
];

/// Root configuration for xcgraph.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct XcgraphConfig {
    /// Where generated projects of external dependencies go
    pub generation: GenerationConfig,

    /// Platform narrowing of external targets
    pub narrowing: NarrowingConfig,

    /// Binary cache settings
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Directory for external projects, relative to the graph root unless absolute
    pub external_projects_directory: PathBuf,

    /// Name of the derived directory created next to each generated project
    pub derived_directory_name: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            external_projects_directory: PathBuf::from(".build/derived"),
            derived_directory_name: "Derived".to_string(),
        }
    }
}

/// What to do when a dependency condition shares no platform with its consumer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IncompatibleConditionPolicy {
    /// Fail the mapping with an error naming the edge (default)
    #[default]
    Error,
    /// Drop that path's contribution and log a warning
    Warn,
}

impl std::fmt::Display for IncompatibleConditionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
        }
    }
}

impl std::str::FromStr for IncompatibleConditionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Platform narrowing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NarrowingConfig {
    /// Narrow external targets to the platforms their consumers need
    pub enabled: bool,

    /// Policy for incompatible platform conditions
    pub on_incompatible: IncompatibleConditionPolicy,
}

impl Default for NarrowingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_incompatible: IncompatibleConditionPolicy::default(),
        }
    }
}

/// Binary cache configuration.
///
/// # Example TOML
///
/// ```toml
/// [cache]
/// enabled = true
/// directory = "/var/cache/xcgraph"
/// cacheable_products = ["framework", "static_framework", "bundle"]
/// sources = ["App", "AppTests"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Artifact directory (default: `~/.xcgraph/cache`)
    pub directory: Option<PathBuf>,

    /// Products that may be replaced by cached binaries
    pub cacheable_products: Vec<String>,

    /// Targets always built from source
    pub sources: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            cacheable_products: vec![
                "framework".to_string(),
                "static_framework".to_string(),
                "bundle".to_string(),
            ],
            sources: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cacheable_products.is_empty() {
            return Err(ConfigError::NoCacheableProducts);
        }
        for product in &self.cacheable_products {
            if !KNOWN_PRODUCTS.contains(&product.as_str()) {
                return Err(ConfigError::unknown_product(product.as_str()));
            }
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,

    /// Log file path (optional)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the artifact directory
    pub cache_dir: Option<PathBuf>,

    /// Disable or enable platform narrowing
    pub narrowing_enabled: Option<bool>,

    /// Override the incompatible-condition policy
    pub on_incompatible: Option<IncompatibleConditionPolicy>,

    /// Additional targets to keep as sources
    pub sources: Vec<String>,

    /// Override log level
    pub log_level: Option<String>,
}

impl XcgraphConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.cache_dir {
            self.cache.directory = Some(dir.clone());
        }

        if let Some(enabled) = overrides.narrowing_enabled {
            self.narrowing.enabled = enabled;
        }

        if let Some(policy) = overrides.on_incompatible {
            self.narrowing.on_incompatible = policy;
        }

        for source in &overrides.sources {
            if !self.cache.sources.contains(source) {
                self.cache.sources.push(source.clone());
            }
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        if self.generation.derived_directory_name.is_empty() {
            return Err(ConfigError::EmptyDerivedDirectoryName);
        }
        Ok(())
    }

    /// Directory generated projects of external dependencies are written to.
    pub fn external_projects_directory(&self, graph_root: &Path) -> PathBuf {
        if self.generation.external_projects_directory.is_absolute() {
            self.generation.external_projects_directory.clone()
        } else {
            graph_root.join(&self.generation.external_projects_directory)
        }
    }

    /// Artifact directory, defaulting to `~/.xcgraph/cache`.
    pub fn cache_directory(&self) -> Result<PathBuf, ConfigError> {
        match self.cache.directory {
            Some(ref directory) => Ok(directory.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".xcgraph").join("cache"))
                .ok_or(ConfigError::CacheDirectoryUnavailable),
        }
    }
}
