//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading, validating or writing xcgraph configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Couldn't read config file {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not valid TOML, or a value has the wrong type.
    #[error("Couldn't parse config file {}: {source}", .path.display())]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Couldn't write config file {}: {source}", .path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't encode the default config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Unknown product '{product}' in cache.cacheable_products. Valid values: {}", crate::KNOWN_PRODUCTS.join(", "))]
    UnknownProduct { product: String },

    #[error("cache.cacheable_products must list at least one product")]
    NoCacheableProducts,

    #[error("generation.derived_directory_name must not be empty")]
    EmptyDerivedDirectoryName,

    #[error("Unknown incompatible-condition policy: '{0}'. Valid values: error, warn")]
    UnknownPolicy(String),

    /// No `cache.directory` was configured and the home directory is unknown.
    #[error("Couldn't resolve the cache directory: no home directory found. Set cache.directory or pass --cache-dir")]
    CacheDirectoryUnavailable,

    #[error("Couldn't locate ~/.xcgraph: no home directory found")]
    GlobalConfigUnavailable,
}

impl ConfigError {
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    /// Directory creation failures are reported against the file being written.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.into(),
            source,
        }
    }

    pub fn unknown_product(product: impl Into<String>) -> Self {
        Self::UnknownProduct {
            product: product.into(),
        }
    }
}
