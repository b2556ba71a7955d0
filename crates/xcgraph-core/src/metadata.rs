//! Binary metadata for precompiled frameworks, libraries and xcframeworks.
//!
//! The loader does not inspect binaries itself. It asks a [`MetadataProviding`]
//! implementation, which by default shells out to `lipo` and `file`.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use crate::model::{LinkingStatus, Platform};
use crate::node::{
    BinaryArchitecture, BinaryLinking, FrameworkNode, LibraryNode, XCFrameworkLibrary,
    XCFrameworkNode,
};

/// Errors reading binary metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Couldn't find the binary at {}", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("Couldn't find architectures for binary at {}", .0.display())]
    ArchitecturesNotFound(PathBuf),

    #[error("Unknown architecture '{name}' in {}", path.display())]
    UnknownArchitecture { path: PathBuf, name: String },

    #[error("The xcframework at {} contains no libraries", .0.display())]
    XCFrameworkLibrariesNotFound(PathBuf),

    #[error("Failed to run '{command}' on {}: {source}", path.display())]
    Command {
        command: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MetadataError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        MetadataError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for metadata operations
pub type Result<T> = std::result::Result<T, MetadataError>;

// ============================================================================
// Metadata Types
// ============================================================================

/// Metadata of a `.framework` bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkMetadata {
    pub path: PathBuf,
    pub binary_path: PathBuf,
    pub dsym_path: Option<PathBuf>,
    pub linking: BinaryLinking,
    pub architectures: Vec<BinaryArchitecture>,
    pub is_carthage: bool,
}

impl FrameworkMetadata {
    pub fn into_node(self, status: LinkingStatus) -> FrameworkNode {
        FrameworkNode {
            path: self.path,
            binary_path: self.binary_path,
            dsym_path: self.dsym_path,
            linking: self.linking,
            architectures: self.architectures,
            status,
            is_carthage: self.is_carthage,
        }
    }
}

/// Metadata of a precompiled library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryMetadata {
    pub path: PathBuf,
    pub public_headers: PathBuf,
    pub swift_module_map: Option<PathBuf>,
    pub architectures: Vec<BinaryArchitecture>,
    pub linking: BinaryLinking,
}

impl LibraryMetadata {
    pub fn into_node(self) -> LibraryNode {
        LibraryNode {
            path: self.path,
            public_headers: self.public_headers,
            architectures: self.architectures,
            linking: self.linking,
            swift_module_map: self.swift_module_map,
        }
    }
}

/// Metadata of an `.xcframework`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XCFrameworkMetadata {
    pub path: PathBuf,
    pub libraries: Vec<XCFrameworkLibrary>,
    pub linking: BinaryLinking,
}

impl XCFrameworkMetadata {
    pub fn into_node(self, status: LinkingStatus) -> XCFrameworkNode {
        XCFrameworkNode {
            path: self.path,
            libraries: self.libraries,
            linking: self.linking,
            status,
        }
    }
}

/// Reads metadata of precompiled binaries.
pub trait MetadataProviding: Send + Sync {
    fn load_framework(&self, path: &Path) -> Result<FrameworkMetadata>;

    fn load_library(
        &self,
        path: &Path,
        public_headers: &Path,
        swift_module_map: Option<&Path>,
    ) -> Result<LibraryMetadata>;

    fn load_xcframework(&self, path: &Path) -> Result<XCFrameworkMetadata>;
}

// ============================================================================
// System Provider
// ============================================================================

/// Reads metadata with the `lipo` and `file` command line tools.
#[derive(Debug, Clone, Default)]
pub struct SystemMetadataProvider;

impl SystemMetadataProvider {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, program: &str, binary: &Path, args: &[&str]) -> Result<String> {
        let output = Command::new(program)
            .args(args)
            .arg(binary)
            .output()
            .map_err(|source| MetadataError::Command {
                command: program.to_string(),
                path: binary.to_path_buf(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn architectures(&self, binary: &Path) -> Result<Vec<BinaryArchitecture>> {
        let output = self.run("lipo", binary, &["-info"])?;
        parse_lipo_output(binary, &output)
    }

    fn linking(&self, binary: &Path) -> Result<BinaryLinking> {
        let output = self.run("file", binary, &[])?;
        Ok(parse_file_output(&output))
    }
}

impl MetadataProviding for SystemMetadataProvider {
    fn load_framework(&self, path: &Path) -> Result<FrameworkMetadata> {
        let binary_path = framework_binary_path(path);
        if !binary_path.exists() {
            return Err(MetadataError::BinaryNotFound(binary_path));
        }

        let dsym_path = path.file_name().and_then(|name| {
            let mut dsym = name.to_os_string();
            dsym.push(".dSYM");
            let candidate = path.with_file_name(dsym);
            candidate.exists().then_some(candidate)
        });

        let metadata = FrameworkMetadata {
            path: path.to_path_buf(),
            architectures: self.architectures(&binary_path)?,
            linking: self.linking(&binary_path)?,
            binary_path,
            dsym_path,
            is_carthage: path.to_string_lossy().contains("Carthage/Build"),
        };
        debug!(
            "Framework {} is {} ({} architectures)",
            path.display(),
            metadata.linking,
            metadata.architectures.len()
        );
        Ok(metadata)
    }

    fn load_library(
        &self,
        path: &Path,
        public_headers: &Path,
        swift_module_map: Option<&Path>,
    ) -> Result<LibraryMetadata> {
        Ok(LibraryMetadata {
            path: path.to_path_buf(),
            public_headers: public_headers.to_path_buf(),
            swift_module_map: swift_module_map.map(Path::to_path_buf),
            architectures: self.architectures(path)?,
            linking: self.linking(path)?,
        })
    }

    fn load_xcframework(&self, path: &Path) -> Result<XCFrameworkMetadata> {
        let libraries = read_xcframework_libraries(path)?;
        let Some(primary) = libraries.first() else {
            return Err(MetadataError::XCFrameworkLibrariesNotFound(path.to_path_buf()));
        };

        let library_path = path.join(&primary.identifier).join(&primary.library_path);
        let linking = if library_path.extension().is_some_and(|ext| ext == "a") {
            BinaryLinking::Static
        } else {
            let binary = if library_path.extension().is_some_and(|ext| ext == "framework") {
                framework_binary_path(&library_path)
            } else {
                library_path
            };
            self.linking(&binary)?
        };

        Ok(XCFrameworkMetadata {
            path: path.to_path_buf(),
            libraries,
            linking,
        })
    }
}

// ============================================================================
// Parsing Helpers
// ============================================================================

/// Binary inside a framework bundle: `Foo.framework/Foo`.
pub fn framework_binary_path(framework: &Path) -> PathBuf {
    let name = framework
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_default();
    framework.join(name)
}

fn thin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r".+:\s.+\sis\sarchitecture:\s(.+)").expect("valid regex"))
}

fn fat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Architectures in the fat file:.+\sare:\s(.+)").expect("valid regex")
    })
}

/// Parse the output of `lipo -info`.
pub fn parse_lipo_output(binary: &Path, output: &str) -> Result<Vec<BinaryArchitecture>> {
    let captures = thin_regex()
        .captures(output)
        .or_else(|| fat_regex().captures(output))
        .and_then(|c| c.get(1))
        .ok_or_else(|| MetadataError::ArchitecturesNotFound(binary.to_path_buf()))?;

    captures
        .as_str()
        .split_whitespace()
        .map(|name| {
            BinaryArchitecture::from_str(name).map_err(|_| MetadataError::UnknownArchitecture {
                path: binary.to_path_buf(),
                name: name.to_string(),
            })
        })
        .collect()
}

/// Parse the output of `file`.
pub fn parse_file_output(output: &str) -> BinaryLinking {
    if output.contains("dynamically linked") {
        BinaryLinking::Dynamic
    } else {
        BinaryLinking::Static
    }
}

/// Parse a slice identifier such as `ios-arm64_x86_64-simulator`.
pub fn parse_slice_identifier(
    identifier: &str,
) -> Option<(Platform, Vec<BinaryArchitecture>, Option<String>)> {
    let mut parts = identifier.splitn(3, '-');
    let platform = Platform::from_str(parts.next()?).ok()?;
    let architectures = parse_joined_architectures(parts.next()?)?;
    let variant = parts.next().map(str::to_string);
    Some((platform, architectures, variant))
}

/// Split `arm64_x86_64` into architectures. Names may themselves contain `_`.
fn parse_joined_architectures(joined: &str) -> Option<Vec<BinaryArchitecture>> {
    let tokens: Vec<&str> = joined.split('_').collect();
    let mut architectures = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if i + 1 < tokens.len() {
            let pair = format!("{}_{}", tokens[i], tokens[i + 1]);
            if let Ok(arch) = BinaryArchitecture::from_str(&pair) {
                architectures.push(arch);
                i += 2;
                continue;
            }
        }
        architectures.push(BinaryArchitecture::from_str(tokens[i]).ok()?);
        i += 1;
    }
    (!architectures.is_empty()).then_some(architectures)
}

/// Discover slices from the xcframework's directory layout.
fn read_xcframework_libraries(path: &Path) -> Result<Vec<XCFrameworkLibrary>> {
    let entries = std::fs::read_dir(path).map_err(|e| MetadataError::io(path, e))?;

    let mut libraries = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MetadataError::io(path, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let identifier = entry.file_name().to_string_lossy().into_owned();
        let Some((platform, architectures, variant)) = parse_slice_identifier(&identifier) else {
            debug!("Skipping unrecognized xcframework slice {}", identifier);
            continue;
        };

        let slice = entry.path();
        let library = std::fs::read_dir(&slice)
            .map_err(|e| MetadataError::io(&slice, e))?
            .filter_map(|e| e.ok())
            .map(|e| PathBuf::from(e.file_name()))
            .filter(|name| {
                name.extension()
                    .is_some_and(|ext| ext == "framework" || ext == "a" || ext == "dylib")
            })
            .min();

        if let Some(library_path) = library {
            libraries.push(XCFrameworkLibrary {
                identifier,
                library_path,
                platform,
                architectures,
                variant,
            });
        }
    }

    libraries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    Ok(libraries)
}
