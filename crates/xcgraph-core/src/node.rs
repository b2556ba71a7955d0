//! Node model for the dependency graph.
//!
//! Every vertex of the graph is a [`GraphNode`], a closed sum type over the artifact
//! kinds the loader can resolve. Each node exposes a [`NodeKey`] that identifies it
//! within a graph: two nodes with the same key are the same node, whatever the rest
//! of their payload says. Equality, ordering and hashing all delegate to the key.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::model::{LinkingStatus, Platform, TargetReference};

/// Errors resolving system SDK dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    #[error("The SDK '{0}' is not supported, only .framework and .tbd SDKs are")]
    Unsupported(String),
}

// ============================================================================
// Binary Metadata Types
// ============================================================================

/// How a precompiled binary is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryLinking {
    Static,
    Dynamic,
}

impl BinaryLinking {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryLinking::Static => "static",
            BinaryLinking::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for BinaryLinking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CPU architecture slice of a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryArchitecture {
    X8664,
    I386,
    Arm64,
    Arm64e,
    Armv7,
    Armv7s,
    Armv7k,
    Arm6432,
}

impl BinaryArchitecture {
    /// Name as printed by `lipo`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryArchitecture::X8664 => "x86_64",
            BinaryArchitecture::I386 => "i386",
            BinaryArchitecture::Arm64 => "arm64",
            BinaryArchitecture::Arm64e => "arm64e",
            BinaryArchitecture::Armv7 => "armv7",
            BinaryArchitecture::Armv7s => "armv7s",
            BinaryArchitecture::Armv7k => "armv7k",
            BinaryArchitecture::Arm6432 => "arm64_32",
        }
    }
}

impl fmt::Display for BinaryArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BinaryArchitecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(BinaryArchitecture::X8664),
            "i386" => Ok(BinaryArchitecture::I386),
            "arm64" => Ok(BinaryArchitecture::Arm64),
            "arm64e" => Ok(BinaryArchitecture::Arm64e),
            "armv7" => Ok(BinaryArchitecture::Armv7),
            "armv7s" => Ok(BinaryArchitecture::Armv7s),
            "armv7k" => Ok(BinaryArchitecture::Armv7k),
            "arm64_32" => Ok(BinaryArchitecture::Arm6432),
            other => Err(format!("unknown architecture '{}'", other)),
        }
    }
}

// ============================================================================
// Node Identity
// ============================================================================

/// Identity of a node within a graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKey {
    Target { path: PathBuf, name: String },
    Framework { path: PathBuf },
    XCFramework { path: PathBuf },
    Library { path: PathBuf },
    Sdk { path: PathBuf, status: LinkingStatus },
    Bundle { path: PathBuf },
    PackageProduct { path: PathBuf, product: String },
}

impl NodeKey {
    pub fn target(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        NodeKey::Target {
            path: path.into(),
            name: name.into(),
        }
    }

    /// The path component of the identity.
    pub fn path(&self) -> &Path {
        match self {
            NodeKey::Target { path, .. }
            | NodeKey::Framework { path }
            | NodeKey::XCFramework { path }
            | NodeKey::Library { path }
            | NodeKey::Sdk { path, .. }
            | NodeKey::Bundle { path }
            | NodeKey::PackageProduct { path, .. } => path,
        }
    }

    /// The target this key addresses, if it is a target key.
    pub fn as_target(&self) -> Option<TargetReference> {
        match self {
            NodeKey::Target { path, name } => Some(TargetReference::new(path.clone(), name.clone())),
            _ => None,
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(self, NodeKey::Target { .. })
    }
}

impl From<&TargetReference> for NodeKey {
    fn from(reference: &TargetReference) -> Self {
        NodeKey::target(reference.project_path.clone(), reference.name.clone())
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Target { path, name } => write!(f, "target '{}' ({})", name, path.display()),
            NodeKey::Framework { path } => write!(f, "framework {}", path.display()),
            NodeKey::XCFramework { path } => write!(f, "xcframework {}", path.display()),
            NodeKey::Library { path } => write!(f, "library {}", path.display()),
            NodeKey::Sdk { path, .. } => write!(f, "sdk {}", path.display()),
            NodeKey::Bundle { path } => write!(f, "bundle {}", path.display()),
            NodeKey::PackageProduct { path, product } => {
                write!(f, "package product '{}' ({})", product, path.display())
            }
        }
    }
}

// ============================================================================
// Node Variants
// ============================================================================

/// A source target. Its data lives in the owning project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNode {
    pub path: PathBuf,
    pub name: String,
}

/// A precompiled `.framework` bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkNode {
    pub path: PathBuf,
    pub binary_path: PathBuf,
    pub dsym_path: Option<PathBuf>,
    pub linking: BinaryLinking,
    pub architectures: Vec<BinaryArchitecture>,
    pub status: LinkingStatus,
    pub is_carthage: bool,
}

/// One platform slice of an `.xcframework`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XCFrameworkLibrary {
    pub identifier: String,
    /// Slice-relative path of the framework or library (`Foo.framework`).
    pub library_path: PathBuf,
    pub platform: Platform,
    pub architectures: Vec<BinaryArchitecture>,
    /// `simulator` or `maccatalyst` for non-device slices.
    pub variant: Option<String>,
}

/// A precompiled `.xcframework`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XCFrameworkNode {
    pub path: PathBuf,
    pub libraries: Vec<XCFrameworkLibrary>,
    pub linking: BinaryLinking,
    pub status: LinkingStatus,
}

impl XCFrameworkNode {
    /// Platforms covered by at least one slice.
    pub fn platforms(&self) -> std::collections::BTreeSet<Platform> {
        self.libraries.iter().map(|l| l.platform).collect()
    }
}

/// A precompiled static or dynamic library with its headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryNode {
    pub path: PathBuf,
    pub public_headers: PathBuf,
    pub architectures: Vec<BinaryArchitecture>,
    pub linking: BinaryLinking,
    pub swift_module_map: Option<PathBuf>,
}

/// A system framework or library provided by the platform SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkNode {
    pub name: String,
    pub path: PathBuf,
    pub status: LinkingStatus,
}

impl SdkNode {
    /// Resolve a system SDK by name.
    ///
    /// `.framework` SDKs live under `/System/Library/Frameworks`, `.tbd` libraries
    /// under `/usr/lib`.
    pub fn resolve(name: &str, status: LinkingStatus) -> Result<Self, SdkError> {
        let root = if name.ends_with(".framework") {
            "/System/Library/Frameworks"
        } else if name.ends_with(".tbd") {
            "/usr/lib"
        } else {
            return Err(SdkError::Unsupported(name.to_string()));
        };
        Ok(Self {
            name: name.to_string(),
            path: Path::new(root).join(name),
            status,
        })
    }
}

/// A resource bundle, used when a bundle target is replaced by its cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleNode {
    pub path: PathBuf,
}

/// A product of an external package, identified by the project that declares it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageProductNode {
    pub path: PathBuf,
    pub product: String,
}

// ============================================================================
// GraphNode
// ============================================================================

/// A vertex of the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphNode {
    Target(TargetNode),
    Framework(FrameworkNode),
    XCFramework(XCFrameworkNode),
    Library(LibraryNode),
    Sdk(SdkNode),
    Bundle(BundleNode),
    PackageProduct(PackageProductNode),
}

impl GraphNode {
    pub fn target(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        GraphNode::Target(TargetNode {
            path: path.into(),
            name: name.into(),
        })
    }

    /// The identity of this node.
    pub fn key(&self) -> NodeKey {
        match self {
            GraphNode::Target(node) => NodeKey::target(node.path.clone(), node.name.clone()),
            GraphNode::Framework(node) => NodeKey::Framework {
                path: node.path.clone(),
            },
            GraphNode::XCFramework(node) => NodeKey::XCFramework {
                path: node.path.clone(),
            },
            GraphNode::Library(node) => NodeKey::Library {
                path: node.path.clone(),
            },
            GraphNode::Sdk(node) => NodeKey::Sdk {
                path: node.path.clone(),
                status: node.status,
            },
            GraphNode::Bundle(node) => NodeKey::Bundle {
                path: node.path.clone(),
            },
            GraphNode::PackageProduct(node) => NodeKey::PackageProduct {
                path: node.path.clone(),
                product: node.product.clone(),
            },
        }
    }

    /// The stable path used as the node's cache and graph key.
    pub fn path(&self) -> &Path {
        match self {
            GraphNode::Target(node) => &node.path,
            GraphNode::Framework(node) => &node.path,
            GraphNode::XCFramework(node) => &node.path,
            GraphNode::Library(node) => &node.path,
            GraphNode::Sdk(node) => &node.path,
            GraphNode::Bundle(node) => &node.path,
            GraphNode::PackageProduct(node) => &node.path,
        }
    }

    pub fn as_target(&self) -> Option<&TargetNode> {
        match self {
            GraphNode::Target(node) => Some(node),
            _ => None,
        }
    }

    /// Whether the node is a precompiled binary (framework, xcframework or library).
    pub fn is_precompiled(&self) -> bool {
        matches!(
            self,
            GraphNode::Framework(_) | GraphNode::XCFramework(_) | GraphNode::Library(_)
        )
    }

    /// Linking of a precompiled binary.
    pub fn linking(&self) -> Option<BinaryLinking> {
        match self {
            GraphNode::Framework(node) => Some(node.linking),
            GraphNode::XCFramework(node) => Some(node.linking),
            GraphNode::Library(node) => Some(node.linking),
            _ => None,
        }
    }

    pub fn is_precompiled_dynamic(&self) -> bool {
        self.linking() == Some(BinaryLinking::Dynamic)
    }

    pub fn is_precompiled_static(&self) -> bool {
        self.linking() == Some(BinaryLinking::Static)
    }
}

impl PartialEq for GraphNode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for GraphNode {}

impl Hash for GraphNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

impl PartialOrd for GraphNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GraphNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key().fmt(f)
    }
}
