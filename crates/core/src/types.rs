//! Domain types shared by every crate.
//!
//! [`Package`] identity is `(package_manager, name, version)` and nothing
//! else; the optional vendor/group/architecture fields are descriptive only.
//! [`Vulnerability`] carries two evaluation fields that the vulnerability
//! evaluator writes once per run.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Query results keyed by the installed package they were produced for.
pub type PackageMap<T> = HashMap<Package, Vec<T>>;

/// An installed package as reported by a package enumerator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    /// Package manager id (`npm`, `cargo`, `dpkg`, ...)
    pub package_manager: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

impl Package {
    pub fn new(
        package_manager: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            package_manager: package_manager.into(),
            name: name.into(),
            version: version.into(),
            vendor: None,
            group: None,
            architecture: None,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = Some(architecture.into());
        self
    }

    /// Returns `true` when both packages share manager and name, ignoring version.
    pub fn same_package(&self, package_manager: &str, name: &str) -> bool {
        self.package_manager == package_manager && self.name == name
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.package_manager == other.package_manager
            && self.name == other.name
            && self.version == other.version
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.package_manager.hash(state);
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.package_manager, self.name, self.version)
    }
}

/// A catalog entry returned by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    /// Identifier of the package in the data source's own catalog.
    pub package_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub versions: Vec<ArtifactVersion>,
    /// Installed package this artifact was matched to by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_package: Option<Package>,
}

impl Artifact {
    pub fn new(artifact_id: impl Into<String>, package_id: impl Into<String>) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            package_id: package_id.into(),
            description: String::new(),
            versions: Vec::new(),
            matched_package: None,
        }
    }

    /// Most recently published version, if any version carries a date.
    pub fn latest_version(&self) -> Option<&ArtifactVersion> {
        self.versions
            .iter()
            .filter(|v| v.published.is_some())
            .max_by_key(|v| v.published)
    }
}

/// One published version of an [`Artifact`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub version: String,
    #[serde(default)]
    pub published: Option<NaiveDate>,
}

/// Severity of a vulnerability.
///
/// Ordered so that `Info < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive parse accepting common abbreviations.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" | "none" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "Info",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        };
        f.write_str(s)
    }
}

/// A known security issue returned by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Package manager of the affected package.
    pub package_manager: String,
    /// Name of the affected package.
    pub package_name: String,
    /// Affected version specifiers in the ecosystem's own range syntax.
    #[serde(default)]
    pub affected_version_specs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    /// Set by the evaluator when an installed version lies in an affected range.
    #[serde(default)]
    pub package_version_is_in_range: bool,
    /// Installed package that matched, set together with the flag above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_package: Option<Package>,
}

impl Vulnerability {
    pub fn new(
        id: impl Into<String>,
        package_manager: impl Into<String>,
        package_name: impl Into<String>,
        affected_version_specs: Vec<String>,
    ) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            summary: String::new(),
            package_manager: package_manager.into(),
            package_name: package_name.into(),
            affected_version_specs,
            severity: None,
            cve: None,
            references: Vec::new(),
            package_version_is_in_range: false,
            resolved_package: None,
        }
    }

    /// Returns `true` if this vulnerability targets the package's manager and name.
    pub fn targets(&self, package: &Package) -> bool {
        package.same_package(&self.package_manager, &self.package_name)
    }
}

impl fmt::Display for Vulnerability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{})",
            self.id, self.package_manager, self.package_name
        )
    }
}

/// Kind of audit target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Installed packages only.
    #[default]
    Packages,
    /// An application server (modules, version, configuration).
    Server,
    /// An application (dependencies, version, configuration).
    Application,
}

impl TargetKind {
    /// Server and application targets have modules, a version and a configuration.
    pub fn has_configuration(self) -> bool {
        matches!(self, Self::Server | Self::Application)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Packages => "packages",
            Self::Server => "server",
            Self::Application => "application",
        };
        f.write_str(s)
    }
}

/// Operating system family, used to gate platform-specific rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    Other(String),
}

impl Platform {
    /// Platform of the host this process runs on.
    pub fn current() -> Self {
        Self::from(std::env::consts::OS)
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "windows" | "win" | "win32" => Self::Windows,
            "linux" => Self::Linux,
            "macos" | "darwin" | "osx" | "mac" => Self::MacOs,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Platform> for String {
    fn from(p: Platform) -> Self {
        p.to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => f.write_str("windows"),
            Self::Linux => f.write_str("linux"),
            Self::MacOs => f.write_str("macos"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// What is being audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    pub kind: TargetKind,
    /// Package manager id of the target's packages.
    pub package_manager: String,
    /// Display name (server or application name, or the manager id).
    pub name: String,
    /// Detected or configured version of the server/application.
    #[serde(default)]
    pub version: Option<String>,
    /// Application development mode; rules may opt out of it.
    #[serde(default)]
    pub app_development_mode: bool,
    pub host_platform: Platform,
}

impl AuditTarget {
    /// A packages-only target for the given package manager.
    pub fn packages(package_manager: impl Into<String>) -> Self {
        let package_manager = package_manager.into();
        Self {
            kind: TargetKind::Packages,
            name: package_manager.clone(),
            package_manager,
            version: None,
            app_development_mode: false,
            host_platform: Platform::current(),
        }
    }

    pub fn server(name: impl Into<String>, package_manager: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Server,
            name: name.into(),
            package_manager: package_manager.into(),
            version: None,
            app_development_mode: false,
            host_platform: Platform::current(),
        }
    }

    pub fn application(name: impl Into<String>, package_manager: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Application,
            name: name.into(),
            package_manager: package_manager.into(),
            version: None,
            app_development_mode: false,
            host_platform: Platform::current(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.host_platform = platform;
        self
    }

    pub fn with_app_development_mode(mut self, enabled: bool) -> Self {
        self.app_development_mode = enabled;
        self
    }
}

impl fmt::Display for AuditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}
