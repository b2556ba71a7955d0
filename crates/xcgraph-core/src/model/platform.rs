//! Platforms, platform conditions on dependency edges, and deployment targets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Platform
// ============================================================================

/// An Apple platform a target can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "ios")]
    IOS,
    #[serde(rename = "macos")]
    MacOS,
    #[serde(rename = "tvos")]
    TvOS,
    #[serde(rename = "watchos")]
    WatchOS,
    #[serde(rename = "visionos")]
    VisionOS,
}

impl Platform {
    /// All platforms, in declaration order.
    pub const ALL: [Platform; 5] = [
        Platform::IOS,
        Platform::MacOS,
        Platform::TvOS,
        Platform::WatchOS,
        Platform::VisionOS,
    ];

    /// Get the string representation used in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::IOS => "ios",
            Platform::MacOS => "macos",
            Platform::TvOS => "tvos",
            Platform::WatchOS => "watchos",
            Platform::VisionOS => "visionos",
        }
    }

    /// Name of the SDK root used when resolving system frameworks.
    pub fn sdk_name(&self) -> &'static str {
        match self {
            Platform::IOS => "iphoneos",
            Platform::MacOS => "macosx",
            Platform::TvOS => "appletvos",
            Platform::WatchOS => "watchos",
            Platform::VisionOS => "xros",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ios" => Ok(Platform::IOS),
            "macos" | "osx" => Ok(Platform::MacOS),
            "tvos" => Ok(Platform::TvOS),
            "watchos" => Ok(Platform::WatchOS),
            "visionos" | "xros" => Ok(Platform::VisionOS),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// Render a platform set as `ios, macos`.
pub fn format_platforms(platforms: &BTreeSet<Platform>) -> String {
    platforms
        .iter()
        .map(Platform::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Platform Conditions
// ============================================================================

/// Restricts a dependency edge to a non-empty subset of platforms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "BTreeSet<Platform>", into = "BTreeSet<Platform>")]
pub struct PlatformCondition {
    platforms: BTreeSet<Platform>,
}

impl TryFrom<BTreeSet<Platform>> for PlatformCondition {
    type Error = String;

    fn try_from(platforms: BTreeSet<Platform>) -> Result<Self, Self::Error> {
        PlatformCondition::when(platforms)
            .ok_or_else(|| "a platform condition needs at least one platform".to_string())
    }
}

impl From<PlatformCondition> for BTreeSet<Platform> {
    fn from(condition: PlatformCondition) -> Self {
        condition.platforms
    }
}

/// Outcome of combining platform conditions along and across dependency paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombinationResult {
    /// No platform satisfies every condition on the path.
    Incompatible,
    /// The path applies under the given condition; `None` means unconditionally.
    Condition(Option<PlatformCondition>),
}

impl PlatformCondition {
    /// Build a condition, returning `None` for an empty platform set.
    pub fn when(platforms: impl IntoIterator<Item = Platform>) -> Option<Self> {
        let platforms: BTreeSet<Platform> = platforms.into_iter().collect();
        if platforms.is_empty() {
            None
        } else {
            Some(Self { platforms })
        }
    }

    /// Platforms this condition allows.
    pub fn platforms(&self) -> &BTreeSet<Platform> {
        &self.platforms
    }

    /// Whether the condition allows the given platform.
    pub fn allows(&self, platform: Platform) -> bool {
        self.platforms.contains(&platform)
    }

    /// Intersect with another (optional) condition.
    ///
    /// An absent condition is unconditional and leaves `self` untouched.
    pub fn intersection(&self, other: Option<&PlatformCondition>) -> CombinationResult {
        let Some(other) = other else {
            return CombinationResult::Condition(Some(self.clone()));
        };
        match PlatformCondition::when(self.platforms.intersection(&other.platforms).copied()) {
            Some(condition) => CombinationResult::Condition(Some(condition)),
            None => CombinationResult::Incompatible,
        }
    }
}

impl CombinationResult {
    /// Union two path results.
    ///
    /// `Incompatible` is the identity and an unconditional path absorbs any condition.
    pub fn combine_with(self, other: CombinationResult) -> CombinationResult {
        match (self, other) {
            (CombinationResult::Incompatible, other) => other,
            (this, CombinationResult::Incompatible) => this,
            (CombinationResult::Condition(None), _) | (_, CombinationResult::Condition(None)) => {
                CombinationResult::Condition(None)
            }
            (CombinationResult::Condition(Some(lhs)), CombinationResult::Condition(Some(rhs))) => {
                CombinationResult::Condition(PlatformCondition::when(
                    lhs.platforms.union(&rhs.platforms).copied(),
                ))
            }
        }
    }
}

// ============================================================================
// Deployment Targets
// ============================================================================

/// Minimum OS versions per platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentTargets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ios: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visionos: Option<String>,
}

impl DeploymentTargets {
    /// Deployment target for one platform.
    pub fn get(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::IOS => self.ios.as_deref(),
            Platform::MacOS => self.macos.as_deref(),
            Platform::TvOS => self.tvos.as_deref(),
            Platform::WatchOS => self.watchos.as_deref(),
            Platform::VisionOS => self.visionos.as_deref(),
        }
    }

    /// Keep only the versions of platforms in `platforms`.
    pub fn filtered(&self, platforms: &BTreeSet<Platform>) -> Self {
        let keep = |platform: Platform, value: &Option<String>| {
            if platforms.contains(&platform) {
                value.clone()
            } else {
                None
            }
        };
        Self {
            ios: keep(Platform::IOS, &self.ios),
            macos: keep(Platform::MacOS, &self.macos),
            tvos: keep(Platform::TvOS, &self.tvos),
            watchos: keep(Platform::WatchOS, &self.watchos),
            visionos: keep(Platform::VisionOS, &self.visionos),
        }
    }
}
