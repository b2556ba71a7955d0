//! Read-only queries over a resolved [`Graph`].
//!
//! The traverser answers the questions project generation and build orchestration
//! ask of a graph: which products a target links, which frameworks it embeds, which
//! resource bundles it copies, and on which platforms an external target is
//! actually needed. Every query is a pure function of the graph; results are
//! ordered sets so that repeated calls produce identical output.
//!
//! Platform conditions are combined along every path between two nodes. The
//! combination is memoized per traverser, which is why the traverser borrows the
//! graph instead of owning it: build one per query session.

use serde::Serialize;
use std::cell::{OnceCell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::graph::{self, Graph};
use crate::model::{
    CombinationResult, LinkingStatus, Platform, PlatformCondition, Product, Project, Target,
    TargetReference,
};
use crate::node::{BinaryArchitecture, BinaryLinking, GraphNode, NodeKey};

/// Errors computing link sets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkingError {
    #[error("Target '{name}' not found in project {}", path.display())]
    TargetNotFound { path: PathBuf, name: String },

    #[error("Target {target} links {} both statically and dynamically", path.display())]
    InconsistentLinking {
        target: TargetReference,
        path: PathBuf,
    },
}

/// Result type for link-set queries
pub type Result<T> = std::result::Result<T, LinkingError>;

// ============================================================================
// Query Results
// ============================================================================

/// A target together with the project that declares it.
#[derive(Debug, Clone, Copy)]
pub struct GraphTarget<'g> {
    pub path: &'g Path,
    pub target: &'g Target,
    pub project: &'g Project,
}

impl<'g> GraphTarget<'g> {
    pub fn reference(&self) -> TargetReference {
        TargetReference::new(self.path, self.target.name.clone())
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::target(self.path, self.target.name.clone())
    }

    fn identity(&self) -> (&Path, &str) {
        (self.path, &self.target.name)
    }
}

impl PartialEq for GraphTarget<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for GraphTarget<'_> {}

impl Hash for GraphTarget<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state)
    }
}

impl PartialOrd for GraphTarget<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GraphTarget<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

/// A direct target dependency and the condition declared on its edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphTargetReference<'g> {
    pub target: GraphTarget<'g>,
    pub condition: Option<PlatformCondition>,
}

/// Something a target links, embeds or copies, as seen from that target.
///
/// The condition is the combined platform condition of every path from the
/// consuming target to the dependency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyReference {
    Framework {
        path: PathBuf,
        binary_path: PathBuf,
        linking: BinaryLinking,
        architectures: Vec<BinaryArchitecture>,
        product: Product,
        status: LinkingStatus,
        condition: Option<PlatformCondition>,
    },
    Library {
        path: PathBuf,
        linking: BinaryLinking,
        architectures: Vec<BinaryArchitecture>,
        product: Product,
        condition: Option<PlatformCondition>,
    },
    #[serde(rename = "xcframework")]
    XCFramework {
        path: PathBuf,
        linking: BinaryLinking,
        status: LinkingStatus,
        condition: Option<PlatformCondition>,
    },
    Bundle {
        path: PathBuf,
        condition: Option<PlatformCondition>,
    },
    Product {
        target: String,
        product_name: String,
        condition: Option<PlatformCondition>,
    },
    Sdk {
        path: PathBuf,
        status: LinkingStatus,
        condition: Option<PlatformCondition>,
    },
    PackageProduct {
        product: String,
        condition: Option<PlatformCondition>,
    },
}

impl DependencyReference {
    /// On-disk location of a precompiled or system dependency.
    pub fn path(&self) -> Option<&Path> {
        match self {
            DependencyReference::Framework { path, .. }
            | DependencyReference::Library { path, .. }
            | DependencyReference::XCFramework { path, .. }
            | DependencyReference::Bundle { path, .. }
            | DependencyReference::Sdk { path, .. } => Some(path),
            DependencyReference::Product { .. } | DependencyReference::PackageProduct { .. } => {
                None
            }
        }
    }

    /// Linking of a precompiled binary.
    pub fn linking(&self) -> Option<BinaryLinking> {
        match self {
            DependencyReference::Framework { linking, .. }
            | DependencyReference::Library { linking, .. }
            | DependencyReference::XCFramework { linking, .. } => Some(*linking),
            _ => None,
        }
    }

    pub fn condition(&self) -> Option<&PlatformCondition> {
        match self {
            DependencyReference::Framework { condition, .. }
            | DependencyReference::Library { condition, .. }
            | DependencyReference::XCFramework { condition, .. }
            | DependencyReference::Bundle { condition, .. }
            | DependencyReference::Product { condition, .. }
            | DependencyReference::Sdk { condition, .. }
            | DependencyReference::PackageProduct { condition, .. } => condition.as_ref(),
        }
    }
}

impl fmt::Display for DependencyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyReference::Framework { path, .. } => {
                write!(f, "framework {}", path.display())?
            }
            DependencyReference::Library { path, .. } => write!(f, "library {}", path.display())?,
            DependencyReference::XCFramework { path, .. } => {
                write!(f, "xcframework {}", path.display())?
            }
            DependencyReference::Bundle { path, .. } => write!(f, "bundle {}", path.display())?,
            DependencyReference::Product { product_name, .. } => {
                write!(f, "product {}", product_name)?
            }
            DependencyReference::Sdk { path, .. } => write!(f, "sdk {}", path.display())?,
            DependencyReference::PackageProduct { product, .. } => {
                write!(f, "package {}", product)?
            }
        }
        if let Some(condition) = self.condition() {
            let platforms: Vec<&str> = condition.platforms().iter().map(Platform::as_str).collect();
            write!(f, " [{}]", platforms.join(", "))?;
        }
        Ok(())
    }
}

/// Platforms on which each target reachable from an internal target is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalPlatforms {
    pub platforms: BTreeMap<TargetReference, BTreeSet<Platform>>,
    /// Edges whose condition shares no platform with the platforms flowing into them.
    pub incompatible: BTreeSet<(TargetReference, TargetReference)>,
}

// ============================================================================
// Traverser
// ============================================================================

/// Query façade over a graph.
pub struct GraphTraverser<'g> {
    graph: &'g Graph,
    condition_cache: RefCell<HashMap<(NodeKey, NodeKey), CombinationResult>>,
    conditional_nodes: OnceCell<HashSet<NodeKey>>,
}

impl<'g> GraphTraverser<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            condition_cache: RefCell::new(HashMap::new()),
            conditional_nodes: OnceCell::new(),
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    pub fn target(&self, path: &Path, name: &str) -> Option<GraphTarget<'g>> {
        let graph: &'g Graph = self.graph;
        let project: &'g Project = graph.projects.get(path)?.as_ref();
        let target = project.target(name)?;
        Some(GraphTarget {
            path: &project.path,
            target,
            project,
        })
    }

    /// Every target of the project at `path`.
    pub fn targets_at(&self, path: &Path) -> BTreeSet<GraphTarget<'g>> {
        let graph: &'g Graph = self.graph;
        let Some(project) = graph.projects.get(path) else {
            return BTreeSet::new();
        };
        Self::project_targets(project)
    }

    pub fn all_targets(&self) -> BTreeSet<GraphTarget<'g>> {
        self.collect_targets(|_| true)
    }

    /// Targets of first-party projects.
    pub fn all_internal_targets(&self) -> BTreeSet<GraphTarget<'g>> {
        self.collect_targets(|project| !project.is_external())
    }

    /// Targets of projects fetched from external packages.
    pub fn all_external_targets(&self) -> BTreeSet<GraphTarget<'g>> {
        self.collect_targets(Project::is_external)
    }

    /// Internal targets no internal target depends on.
    pub fn root_targets(&self) -> BTreeSet<GraphTarget<'g>> {
        let internal = self.all_internal_targets();
        let depended_upon: HashSet<NodeKey> = internal
            .iter()
            .flat_map(|target| self.graph.dependencies(&target.key()))
            .map(|(node, _)| node.key())
            .collect();
        internal
            .into_iter()
            .filter(|target| !depended_upon.contains(&target.key()))
            .collect()
    }

    /// Internal application targets.
    pub fn apps(&self) -> BTreeSet<GraphTarget<'g>> {
        self.all_internal_targets()
            .into_iter()
            .filter(|target| {
                matches!(
                    target.target.product,
                    Product::App | Product::AppClip | Product::Watch2App
                )
            })
            .collect()
    }

    pub fn targets_with_product(&self, product: Product) -> BTreeSet<GraphTarget<'g>> {
        self.all_targets()
            .into_iter()
            .filter(|target| target.target.product == product)
            .collect()
    }

    /// Every target, dependencies before their dependents.
    pub fn all_targets_topological_sorted(&self) -> graph::Result<Vec<GraphTarget<'g>>> {
        Ok(self
            .graph
            .topological_order()?
            .iter()
            .filter_map(|key| self.node_target(key))
            .collect())
    }

    /// Paths of every precompiled framework in the graph.
    pub fn precompiled_frameworks_paths(&self) -> BTreeSet<PathBuf> {
        self.graph
            .iter_nodes()
            .filter_map(|node| match node {
                GraphNode::Framework(framework) => Some(framework.path.clone()),
                _ => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Target Dependencies
    // ------------------------------------------------------------------------

    /// One-hop target dependencies.
    ///
    /// Edges whose condition excludes every platform of the target are skipped.
    pub fn direct_target_dependencies(
        &self,
        path: &Path,
        name: &str,
    ) -> BTreeSet<GraphTargetReference<'g>> {
        let Some(source) = self.target(path, name) else {
            return BTreeSet::new();
        };
        self.graph
            .dependencies(&source.key())
            .into_iter()
            .filter_map(|(node, edge)| {
                let dependency = self.node_target(&node.key())?;
                if let Some(condition) = edge.condition() {
                    if !source.target.platforms.iter().any(|p| condition.allows(*p)) {
                        return None;
                    }
                }
                Some(GraphTargetReference {
                    target: dependency,
                    condition: edge.condition.clone(),
                })
            })
            .collect()
    }

    /// Direct dependencies on targets of the same project.
    pub fn direct_local_target_dependencies(
        &self,
        path: &Path,
        name: &str,
    ) -> BTreeSet<GraphTargetReference<'g>> {
        self.direct_target_dependencies(path, name)
            .into_iter()
            .filter(|reference| reference.target.path == path)
            .collect()
    }

    /// Direct dependencies on targets of external projects.
    pub fn direct_target_external_dependencies(
        &self,
        path: &Path,
        name: &str,
    ) -> BTreeSet<GraphTargetReference<'g>> {
        self.direct_target_dependencies(path, name)
            .into_iter()
            .filter(|reference| reference.target.project.is_external())
            .collect()
    }

    /// Internal targets with at least one edge to an external target, whatever its condition.
    pub fn targets_with_external_dependencies(&self) -> BTreeSet<GraphTarget<'g>> {
        self.all_internal_targets()
            .into_iter()
            .filter(|target| {
                self.direct_dependency_keys(&target.key())
                    .any(|key| self.is_external_target(&key))
            })
            .collect()
    }

    /// Transitive closure of target dependencies.
    pub fn all_target_dependencies(&self, path: &Path, name: &str) -> BTreeSet<GraphTarget<'g>> {
        if self.target(path, name).is_none() {
            return BTreeSet::new();
        }
        self.filter_dependencies(
            &[NodeKey::target(path, name)],
            NodeKey::is_target,
            |key| !key.is_target(),
        )
        .iter()
        .filter_map(|key| self.node_target(key))
        .collect()
    }

    /// The first direct dependency able to host the target's tests, in declaration order.
    pub fn unit_test_host(&self, path: &Path, name: &str) -> Option<GraphTarget<'g>> {
        self.graph
            .dependencies(&NodeKey::target(path, name))
            .into_iter()
            .filter_map(|(node, _)| self.node_target(&node.key()))
            .find(|target| target.target.product.can_host_tests())
    }

    /// Precompiled binaries reachable from `key`.
    pub fn prebuilt_dependencies(&self, key: &NodeKey) -> BTreeSet<NodeKey> {
        self.filter_dependencies(
            std::slice::from_ref(key),
            |dependency| self.is_precompiled(dependency),
            |_| false,
        )
    }

    // ------------------------------------------------------------------------
    // Build Phases
    // ------------------------------------------------------------------------

    /// Direct dependencies on static targets.
    pub fn direct_static_dependencies(&self, path: &Path, name: &str) -> BTreeSet<DependencyReference> {
        let from = NodeKey::target(path, name);
        self.graph
            .dependencies(&from)
            .into_iter()
            .map(|(node, _)| node.key())
            .filter(|key| self.test_target(key, |target| target.product.is_static()))
            .filter_map(|key| self.dependency_reference(&key, &from))
            .collect()
    }

    /// Everything that must appear on the target's link line.
    ///
    /// Static dependencies are linked into the first consumer able to link static
    /// products; the dependencies of a dynamic framework are linked by the framework
    /// and never repeated in its consumers. Unit test bundles skip the static
    /// products their host application already links.
    pub fn linkable_dependencies(&self, path: &Path, name: &str) -> Result<BTreeSet<DependencyReference>> {
        self.linkable(path, name, true)
    }

    /// Link set used for search paths: like [`Self::linkable_dependencies`] but
    /// without subtracting the host application's products.
    pub fn search_path_dependencies(&self, path: &Path, name: &str) -> Result<BTreeSet<DependencyReference>> {
        self.linkable(path, name, false)
    }

    fn linkable(
        &self,
        path: &Path,
        name: &str,
        exclude_host_dependencies: bool,
    ) -> Result<BTreeSet<DependencyReference>> {
        let target = self
            .target(path, name)
            .ok_or_else(|| LinkingError::TargetNotFound {
                path: path.to_path_buf(),
                name: name.to_string(),
            })?;
        let from = target.key();
        let mut references = BTreeSet::new();
        let can_link_static = target.target.product.can_link_static_products();

        // System libraries and frameworks of static dependencies
        if can_link_static {
            for dependency in self.transitive_static_dependencies(&from) {
                references.extend(
                    self.sdk_dependencies(&dependency)
                        .filter_map(|sdk| self.dependency_reference(&sdk, &from)),
                );
            }
        }

        references.extend(
            self.sdk_dependencies(&from)
                .filter_map(|sdk| self.dependency_reference(&sdk, &from)),
        );

        // Precompiled dynamic binaries and whatever they pull in
        let precompiled: Vec<NodeKey> = self
            .direct_dependency_keys(&from)
            .filter(|key| self.is_precompiled(key))
            .collect();
        let mut precompiled_closure: BTreeSet<NodeKey> = precompiled.iter().cloned().collect();
        for dependency in &precompiled {
            precompiled_closure.extend(self.filter_dependencies(
                std::slice::from_ref(dependency),
                |_| true,
                |_| false,
            ));
        }
        references.extend(
            precompiled_closure
                .iter()
                .filter(|key| self.is_precompiled_dynamic(key))
                .filter_map(|key| self.dependency_reference(key, &from)),
        );

        // Static libraries and frameworks, and what static dependencies embed
        if can_link_static {
            let transitive_static = self.transitive_static_dependencies(&from);

            let host_static = match self.unit_test_host(path, name) {
                Some(host) if target.target.product == Product::UnitTests && exclude_host_dependencies => {
                    self.transitive_static_dependencies(&host.key())
                }
                _ => BTreeSet::new(),
            };

            let mut linked: BTreeSet<NodeKey> = transitive_static.clone();
            for dependency in &transitive_static {
                linked.extend(self.direct_dependency_keys(dependency).filter(|key| {
                    self.is_embeddable_target(key)
                        || (self.is_precompiled(key) && !matches!(key, NodeKey::Bundle { .. }))
                }));
            }

            let host_references: BTreeSet<DependencyReference> = host_static
                .iter()
                .filter_map(|key| self.dependency_reference(key, &from))
                .collect();
            references.extend(
                linked
                    .iter()
                    .filter_map(|key| self.dependency_reference(key, &from))
                    .filter(|reference| !host_references.contains(reference)),
            );
        }

        // Direct dynamic libraries and frameworks
        references.extend(
            self.direct_dependency_keys(&from)
                .filter(|key| {
                    self.test_target(key, |target| {
                        matches!(target.product, Product::DynamicLibrary | Product::Framework)
                    })
                })
                .filter_map(|key| self.dependency_reference(&key, &from)),
        );

        self.check_linking_consistency(&target, &references)?;
        Ok(references)
    }

    fn check_linking_consistency(
        &self,
        target: &GraphTarget<'_>,
        references: &BTreeSet<DependencyReference>,
    ) -> Result<()> {
        let mut linking_by_path: HashMap<&Path, BinaryLinking> = HashMap::new();
        for reference in references {
            let (Some(path), Some(linking)) = (reference.path(), reference.linking()) else {
                continue;
            };
            match linking_by_path.insert(path, linking) {
                Some(previous) if previous != linking => {
                    return Err(LinkingError::InconsistentLinking {
                        target: target.reference(),
                        path: path.to_path_buf(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Dynamic frameworks and libraries the target copies into its bundle.
    pub fn embeddable_frameworks(&self, path: &Path, name: &str) -> BTreeSet<DependencyReference> {
        let Some(target) = self.target(path, name) else {
            return BTreeSet::new();
        };
        if !can_embed_frameworks(target.target) {
            return BTreeSet::new();
        }
        let from = target.key();
        let roots = std::slice::from_ref(&from);

        let precompiled = self.filter_dependencies(
            roots,
            |key| self.is_precompiled_dynamic(key),
            |key| self.test_target(key, |t| can_embed_frameworks(t) || t.product == Product::Macro),
        );
        let other_targets = self.filter_dependencies(
            roots,
            |key| self.is_embeddable_target(key),
            |key| self.test_target(key, |t| can_embed_frameworks(t) || t.product == Product::Macro),
        );

        let mut references: BTreeSet<DependencyReference> = precompiled
            .iter()
            .chain(other_targets.iter())
            .filter_map(|key| self.dependency_reference(key, &from))
            .collect();

        if target.target.product == Product::UnitTests {
            match self.unit_test_host(path, name) {
                Some(host) => {
                    let host_references = self.embeddable_frameworks(host.path, &host.target.name);
                    references.retain(|reference| !host_references.contains(reference));
                }
                None => references.clear(),
            }
        }

        references
    }

    /// Products copied into the target: static dependencies of static targets,
    /// applications and extensions from other projects, and resource bundles.
    pub fn copy_product_dependencies(&self, path: &Path, name: &str) -> BTreeSet<DependencyReference> {
        let Some(target) = self.target(path, name) else {
            return BTreeSet::new();
        };
        let from = target.key();
        let mut references = BTreeSet::new();

        if target.target.product.is_static() {
            references.extend(self.direct_static_dependencies(path, name));
            references.extend(
                self.direct_dependency_keys(&from)
                    .filter(|key| matches!(key, NodeKey::XCFramework { .. }) && self.is_precompiled_static(key))
                    .filter_map(|key| self.dependency_reference(&key, &from)),
            );
        }

        references.extend(
            self.direct_target_dependencies(path, name)
                .into_iter()
                .filter(|reference| reference.target.path != path)
                .filter(|reference| {
                    matches!(
                        reference.target.target.product,
                        Product::App | Product::AppExtension
                    )
                })
                .map(|reference| DependencyReference::Product {
                    target: reference.target.target.name.clone(),
                    product_name: reference.target.target.product_name_with_extension(),
                    condition: None,
                }),
        );

        references.extend(self.resource_bundle_dependencies(path, name));
        references
    }

    /// Resource bundles the target copies into its own product.
    ///
    /// Traversal stops at dependencies that host their own resources. Bundles of
    /// external targets are only copied by targets able to embed bundles.
    pub fn resource_bundle_dependencies(&self, path: &Path, name: &str) -> BTreeSet<DependencyReference> {
        let Some(target) = self.target(path, name) else {
            return BTreeSet::new();
        };
        if !can_host_resources(target.target) {
            return BTreeSet::new();
        }
        let from = target.key();
        let roots = std::slice::from_ref(&from);

        let mut bundles = self.filter_dependencies(
            roots,
            |key| self.is_resource_bundle(key) && !self.is_external_target(key),
            |key| self.test_target(key, can_host_resources),
        );
        if can_embed_bundles(target.target) {
            bundles.extend(self.filter_dependencies(
                roots,
                |key| self.is_resource_bundle(key) && self.is_external_target(key),
                |key| self.test_target(key, can_embed_bundles),
            ));
        }

        bundles
            .iter()
            .filter_map(|key| self.dependency_reference(key, &from))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Platform Conditions
    // ------------------------------------------------------------------------

    /// Combined platform condition of every path from `from` to `to`.
    ///
    /// Conditions intersect along a path and union across paths. A path that
    /// never reaches `to` contributes nothing.
    pub fn combined_condition(&self, to: &NodeKey, from: &NodeKey) -> CombinationResult {
        let conditional = self.conditional_nodes.get_or_init(|| {
            let endpoints: Vec<NodeKey> = self
                .graph
                .iter_edges()
                .filter(|(_, _, edge)| edge.condition.is_some())
                .flat_map(|(source, target, _)| [source.key(), target.key()])
                .collect();
            let mut nodes: HashSet<NodeKey> = self
                .filter_dependencies(&endpoints, |_| true, |_| false)
                .into_iter()
                .collect();
            nodes.extend(endpoints);
            nodes
        });
        if !conditional.contains(from) && !conditional.contains(to) {
            return CombinationResult::Condition(None);
        }

        let cache_key = (from.clone(), to.clone());
        if let Some(cached) = self.condition_cache.borrow().get(&cache_key) {
            return cached.clone();
        }

        let dependencies = self.graph.dependencies(from);
        let result = if dependencies.is_empty() {
            CombinationResult::Incompatible
        } else if let Some(edge) = self.graph.edge(from, to) {
            CombinationResult::Condition(edge.condition.clone())
        } else {
            dependencies
                .into_iter()
                .map(|(node, edge)| {
                    match self.combined_condition(to, &node.key()) {
                        CombinationResult::Incompatible => CombinationResult::Incompatible,
                        CombinationResult::Condition(Some(condition)) => {
                            condition.intersection(edge.condition())
                        }
                        CombinationResult::Condition(None) => {
                            CombinationResult::Condition(edge.condition.clone())
                        }
                    }
                })
                .fold(CombinationResult::Incompatible, CombinationResult::combine_with)
        };

        self.condition_cache
            .borrow_mut()
            .insert(cache_key, result.clone());
        result
    }

    /// How `from` refers to `to`, or `None` when no platform allows the dependency.
    pub fn dependency_reference(&self, to: &NodeKey, from: &NodeKey) -> Option<DependencyReference> {
        let CombinationResult::Condition(condition) = self.combined_condition(to, from) else {
            return None;
        };
        let reference = match self.graph.node(to)? {
            GraphNode::Framework(framework) => DependencyReference::Framework {
                path: framework.path.clone(),
                binary_path: framework.binary_path.clone(),
                linking: framework.linking,
                architectures: framework.architectures.clone(),
                product: match framework.linking {
                    BinaryLinking::Static => Product::StaticFramework,
                    BinaryLinking::Dynamic => Product::Framework,
                },
                status: framework.status,
                condition,
            },
            GraphNode::Library(library) => DependencyReference::Library {
                path: library.path.clone(),
                linking: library.linking,
                architectures: library.architectures.clone(),
                product: match library.linking {
                    BinaryLinking::Static => Product::StaticLibrary,
                    BinaryLinking::Dynamic => Product::DynamicLibrary,
                },
                condition,
            },
            GraphNode::XCFramework(xcframework) => DependencyReference::XCFramework {
                path: xcframework.path.clone(),
                linking: xcframework.linking,
                status: xcframework.status,
                condition,
            },
            GraphNode::Bundle(bundle) => DependencyReference::Bundle {
                path: bundle.path.clone(),
                condition,
            },
            GraphNode::Sdk(sdk) => DependencyReference::Sdk {
                path: sdk.path.clone(),
                status: sdk.status,
                condition,
            },
            GraphNode::PackageProduct(package) => DependencyReference::PackageProduct {
                product: package.product.clone(),
                condition,
            },
            GraphNode::Target(node) => {
                let target = self.target(&node.path, &node.name)?;
                DependencyReference::Product {
                    target: target.target.name.clone(),
                    product_name: target.target.product_name_with_extension(),
                    condition,
                }
            }
        };
        Some(reference)
    }

    /// Platforms each target is needed on, walking down from every internal
    /// target with external dependencies.
    pub fn external_target_supported_platforms(&self) -> BTreeMap<TargetReference, BTreeSet<Platform>> {
        self.resolve_external_platforms().platforms
    }

    /// Same walk as [`Self::external_target_supported_platforms`], also reporting
    /// the edges whose condition excluded every incoming platform.
    pub fn resolve_external_platforms(&self) -> ExternalPlatforms {
        let mut resolved = ExternalPlatforms::default();
        let sources = self.targets_with_external_dependencies();
        for source in &sources {
            self.narrow_platforms(*source, &source.target.platforms, &mut resolved);
        }
        resolved.incompatible = self.incompatible_edges(&sources, &resolved.platforms);
        resolved
    }

    /// Conditional edges whose condition shares no platform with the final
    /// platforms of the depending target.
    ///
    /// A path that misses a condition only contributes nothing. The edge is
    /// incompatible when no path at all can use it.
    fn incompatible_edges(
        &self,
        sources: &BTreeSet<GraphTarget<'g>>,
        platforms: &BTreeMap<TargetReference, BTreeSet<Platform>>,
    ) -> BTreeSet<(TargetReference, TargetReference)> {
        let mut incompatible = BTreeSet::new();
        for target in self.all_targets() {
            let reference = target.reference();
            let mut from_platforms = platforms.get(&reference).cloned().unwrap_or_default();
            if sources.contains(&target) {
                from_platforms.extend(target.target.platforms.iter().copied());
            }
            if from_platforms.is_empty() {
                continue;
            }

            for (node, edge) in self.graph.dependencies(&target.key()) {
                let Some(condition) = edge.condition() else {
                    continue;
                };
                let Some(dependency) = self.node_target(&node.key()) else {
                    continue;
                };
                if from_platforms.is_disjoint(condition.platforms()) {
                    incompatible.insert((reference.clone(), dependency.reference()));
                }
            }
        }
        incompatible
    }

    fn narrow_platforms(
        &self,
        source: GraphTarget<'g>,
        parent_platforms: &BTreeSet<Platform>,
        resolved: &mut ExternalPlatforms,
    ) {
        for (node, edge) in self.graph.dependencies(&source.key()) {
            let Some(dependency) = self.node_target(&node.key()) else {
                continue;
            };
            let inherited: BTreeSet<Platform> = if dependency.target.product == Product::Macro {
                BTreeSet::from([Platform::MacOS])
            } else {
                parent_platforms.clone()
            };

            let allowed: BTreeSet<Platform> = match edge.condition() {
                Some(condition) => {
                    if parent_platforms.is_disjoint(condition.platforms()) {
                        continue;
                    }
                    condition.platforms().intersection(&inherited).copied().collect()
                }
                None => inherited,
            };
            let to_insert: BTreeSet<Platform> = allowed
                .intersection(&dependency.target.platforms)
                .copied()
                .collect();

            let existing = resolved.platforms.entry(dependency.reference()).or_default();
            let grew = !to_insert.is_subset(existing);
            existing.extend(to_insert);
            if grew {
                let next = existing.clone();
                self.narrow_platforms(dependency, &next, resolved);
            }
        }
    }

    /// External targets no internal target needs on any platform.
    pub fn all_orphan_external_targets(&self) -> BTreeSet<GraphTarget<'g>> {
        let roots: Vec<NodeKey> = self
            .targets_with_external_dependencies()
            .iter()
            .map(GraphTarget::key)
            .collect();
        let platforms = self.external_target_supported_platforms();
        let needed: HashSet<TargetReference> = self
            .filter_dependencies(&roots, NodeKey::is_target, |_| false)
            .iter()
            .filter_map(NodeKey::as_target)
            .filter(|reference| platforms.get(reference).is_some_and(|p| !p.is_empty()))
            .collect();

        self.all_external_targets()
            .into_iter()
            .filter(|target| !needed.contains(&target.reference()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn project_targets(project: &'g Project) -> BTreeSet<GraphTarget<'g>> {
        project
            .targets
            .iter()
            .map(|target| GraphTarget {
                path: &project.path,
                target,
                project,
            })
            .collect()
    }

    fn collect_targets(&self, include: impl Fn(&Project) -> bool) -> BTreeSet<GraphTarget<'g>> {
        let graph: &'g Graph = self.graph;
        graph
            .projects
            .values()
            .filter(|project| include(project))
            .flat_map(|project| Self::project_targets(project))
            .collect()
    }

    fn node_target(&self, key: &NodeKey) -> Option<GraphTarget<'g>> {
        match key {
            NodeKey::Target { path, name } => self.target(path, name),
            _ => None,
        }
    }

    fn test_target(&self, key: &NodeKey, test: impl Fn(&Target) -> bool) -> bool {
        self.node_target(key).is_some_and(|target| test(target.target))
    }

    fn direct_dependency_keys(&self, key: &NodeKey) -> impl Iterator<Item = NodeKey> + 'g {
        let graph: &'g Graph = self.graph;
        graph
            .dependencies(key)
            .into_iter()
            .map(|(node, _)| node.key())
    }

    fn sdk_dependencies(&self, key: &NodeKey) -> impl Iterator<Item = NodeKey> + 'g {
        self.direct_dependency_keys(key)
            .filter(|key| matches!(key, NodeKey::Sdk { .. }))
    }

    fn is_precompiled(&self, key: &NodeKey) -> bool {
        self.graph.node(key).is_some_and(GraphNode::is_precompiled)
    }

    fn is_precompiled_dynamic(&self, key: &NodeKey) -> bool {
        self.graph
            .node(key)
            .is_some_and(GraphNode::is_precompiled_dynamic)
    }

    fn is_precompiled_static(&self, key: &NodeKey) -> bool {
        self.graph
            .node(key)
            .is_some_and(GraphNode::is_precompiled_static)
    }

    fn is_static(&self, key: &NodeKey) -> bool {
        match self.graph.node(key) {
            Some(GraphNode::Target(_)) => self.test_target(key, |t| t.product.is_static()),
            Some(node) => node.is_precompiled_static(),
            None => false,
        }
    }

    fn can_link_static_products(&self, key: &NodeKey) -> bool {
        match self.graph.node(key) {
            Some(GraphNode::Target(_)) => {
                self.test_target(key, |t| t.product.can_link_static_products())
            }
            Some(node) => node.is_precompiled_dynamic(),
            None => false,
        }
    }

    /// Dynamic targets, and static frameworks carrying resources.
    fn is_embeddable_target(&self, key: &NodeKey) -> bool {
        self.test_target(key, |target| {
            target.product.is_dynamic()
                || (target.product == Product::StaticFramework && target.contains_resources())
        })
    }

    fn is_resource_bundle(&self, key: &NodeKey) -> bool {
        matches!(key, NodeKey::Bundle { .. }) || self.test_target(key, |t| t.product == Product::Bundle)
    }

    fn is_external_target(&self, key: &NodeKey) -> bool {
        self.node_target(key)
            .is_some_and(|target| target.project.is_external())
    }

    /// Static dependencies reachable without crossing a node that links them itself.
    fn transitive_static_dependencies(&self, key: &NodeKey) -> BTreeSet<NodeKey> {
        self.filter_dependencies(
            std::slice::from_ref(key),
            |dependency| self.is_static(dependency),
            |dependency| {
                self.can_link_static_products(dependency)
                    || self.test_target(dependency, |t| t.product == Product::Macro)
            },
        )
    }

    /// Depth-first walk from `roots` collecting the nodes accepted by `test`.
    ///
    /// The roots themselves are never collected. Nodes accepted by `skip` are
    /// collected (when `test` holds) but not walked through.
    fn filter_dependencies(
        &self,
        roots: &[NodeKey],
        test: impl Fn(&NodeKey) -> bool,
        skip: impl Fn(&NodeKey) -> bool,
    ) -> BTreeSet<NodeKey> {
        let root_set: HashSet<&NodeKey> = roots.iter().collect();
        let mut stack: Vec<NodeKey> = roots.to_vec();
        let mut visited: HashSet<NodeKey> = HashSet::new();
        let mut found = BTreeSet::new();

        while let Some(key) = stack.pop() {
            if !visited.insert(key.clone()) {
                continue;
            }
            let is_root = root_set.contains(&key);
            if !is_root && test(&key) {
                found.insert(key.clone());
            }
            if !is_root && skip(&key) {
                continue;
            }
            for (node, _) in self.graph.dependencies(&key) {
                let dependency = node.key();
                if !visited.contains(&dependency) {
                    stack.push(dependency);
                }
            }
        }
        found
    }
}

/// Products that copy dynamic frameworks into their bundle.
fn can_embed_frameworks(target: &Target) -> bool {
    match target.product {
        Product::App
        | Product::Watch2App
        | Product::AppClip
        | Product::UnitTests
        | Product::UiTests
        | Product::Watch2Extension
        | Product::SystemExtension
        | Product::Xpc => true,
        Product::Bundle => target.platforms == BTreeSet::from([Platform::MacOS]),
        _ => false,
    }
}

fn can_embed_bundles(target: &Target) -> bool {
    matches!(
        target.product,
        Product::App
            | Product::AppExtension
            | Product::Watch2App
            | Product::AppClip
            | Product::UnitTests
            | Product::UiTests
            | Product::Watch2Extension
            | Product::SystemExtension
            | Product::Xpc
    )
}

fn can_host_resources(target: &Target) -> bool {
    target.supports_resources()
        && (target.product != Product::StaticFramework || target.contains_resources())
}
