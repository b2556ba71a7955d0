//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.xcgraph/config.toml`
//! 2. Local config: `.xcgraph/config.toml` (in the graph root)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{
    CacheConfig, ConfigOverrides, GenerationConfig, LoggingConfig, NarrowingConfig, XcgraphConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".xcgraph";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".xcgraph";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.xcgraph`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<XcgraphConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.xcgraph`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    pub fn local_config_path(&self, root: &Path) -> PathBuf {
        root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a graph root with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates.
    pub fn load(
        &mut self,
        root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<XcgraphConfig, ConfigError> {
        let mut config = XcgraphConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file, skipping global and local lookup.
    pub fn load_file(
        &self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<XcgraphConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        let mut config = merge_configs(XcgraphConfig::default(), load_config_file(path)?);

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<XcgraphConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration of a graph root.
    pub fn load_local(&self, root: &Path) -> Result<Option<XcgraphConfig>, ConfigError> {
        let local_path = self.local_config_path(root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Initialize global configuration.
    ///
    /// Creates `~/.xcgraph/config.toml` with default configuration.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::GlobalConfigUnavailable);
        };
        init_config_file(global_dir)
    }

    /// Initialize local configuration for a graph root.
    ///
    /// Creates `.xcgraph/config.toml` with default configuration.
    pub fn init_local(&self, root: &Path) -> Result<PathBuf, ConfigError> {
        init_config_file(&root.join(LOCAL_CONFIG_DIR))
    }
}

fn init_config_file(dir: &Path) -> Result<PathBuf, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        save_config_file(&config_path, &XcgraphConfig::default())?;
    }

    Ok(config_path)
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<XcgraphConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &XcgraphConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::write_file(path, e))?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// This performs a field-by-field merge, allowing partial configs.
fn merge_configs(base: XcgraphConfig, overlay: XcgraphConfig) -> XcgraphConfig {
    XcgraphConfig {
        generation: merge_generation(base.generation, overlay.generation),
        narrowing: merge_narrowing(base.narrowing, overlay.narrowing),
        cache: merge_cache(base.cache, overlay.cache),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

fn merge_generation(base: GenerationConfig, overlay: GenerationConfig) -> GenerationConfig {
    let defaults = GenerationConfig::default();
    GenerationConfig {
        external_projects_directory: if overlay.external_projects_directory
            != defaults.external_projects_directory
        {
            overlay.external_projects_directory
        } else {
            base.external_projects_directory
        },
        derived_directory_name: if overlay.derived_directory_name != defaults.derived_directory_name
        {
            overlay.derived_directory_name
        } else {
            base.derived_directory_name
        },
    }
}

fn merge_narrowing(base: NarrowingConfig, overlay: NarrowingConfig) -> NarrowingConfig {
    let defaults = NarrowingConfig::default();
    NarrowingConfig {
        enabled: if overlay.enabled != defaults.enabled {
            overlay.enabled
        } else {
            base.enabled
        },
        on_incompatible: if overlay.on_incompatible != defaults.on_incompatible {
            overlay.on_incompatible
        } else {
            base.on_incompatible
        },
    }
}

fn merge_cache(base: CacheConfig, overlay: CacheConfig) -> CacheConfig {
    let defaults = CacheConfig::default();
    CacheConfig {
        enabled: if overlay.enabled != defaults.enabled {
            overlay.enabled
        } else {
            base.enabled
        },
        directory: overlay.directory.or(base.directory),
        cacheable_products: if overlay.cacheable_products != defaults.cacheable_products {
            overlay.cacheable_products
        } else {
            base.cacheable_products
        },
        // Source lists accumulate across layers
        sources: {
            let mut sources = base.sources;
            for source in overlay.sources {
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
            sources
        },
    }
}

fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
        format: if overlay.format != crate::LogFormat::Text {
            overlay.format
        } else {
            base.format
        },
        file: overlay.file.or(base.file),
    }
}
