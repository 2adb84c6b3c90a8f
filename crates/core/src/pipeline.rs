//! Collaborator traits: the extension points an audit is assembled from.
//!
//! Every async method returns a [`BoxFuture`] so the traits stay
//! dyn-compatible and can be held as `Arc<dyn Trait>` inside the engine.
//! Implementations that are naturally synchronous wrap their result in
//! `Box::pin(async move { .. })`.
//!
//! | Trait | Failure tier |
//! |-------|--------------|
//! | [`PackageEnumerator`] | phase-fatal |
//! | [`DataSource`] | phase-fatal at the fan-in barrier |
//! | [`VersionRangeOracle`] | item-recoverable |
//! | [`ConfigurationTree`] | item-recoverable per query |
//! | [`ApplicationProbe`], [`RuleSource`], [`AnalyzerSource`], [`Analyzer`], [`Reporter`] | phase-fatal |

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{
    AnalyzerError, ConfigurationError, EnumerationError, ProbeError, ReportError, RuleError,
    SourceError, VersionRangeError,
};
use crate::rule::ConfigurationRule;
use crate::types::{Artifact, AuditTarget, Package, PackageMap, Vulnerability};

/// Boxed, `Send` future used by every dyn-compatible collaborator trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ─── Packages ────────────────────────────────────────────────────────

/// Lists the packages installed on a target.
pub trait PackageEnumerator: Send + Sync {
    /// Package manager id of every package this enumerator returns.
    fn package_manager(&self) -> &str;

    fn get_packages(&self) -> BoxFuture<'_, Result<Vec<Package>, EnumerationError>>;
}

// ─── Data sources ────────────────────────────────────────────────────

/// A pluggable provider of artifact and vulnerability lookups.
///
/// Sources are independently initialised; the engine only queries a source
/// for vulnerabilities when it is initialised and eligible for the target.
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    fn is_initialised(&self) -> bool;

    fn is_eligible_for_target(&self, target: &AuditTarget) -> bool;

    fn search_artifacts<'a>(
        &'a self,
        packages: &'a [Package],
    ) -> BoxFuture<'a, Result<PackageMap<Artifact>, SourceError>>;

    fn search_vulnerabilities<'a>(
        &'a self,
        packages: &'a [Package],
    ) -> BoxFuture<'a, Result<PackageMap<Vulnerability>, SourceError>>;
}

// ─── Version ranges ──────────────────────────────────────────────────

/// Ecosystem-specific predicate deciding whether a version lies in a range.
pub trait VersionRangeOracle: Send + Sync {
    fn is_in_range(&self, spec: &str, installed_version: &str) -> Result<bool, VersionRangeError>;
}

// ─── Configuration ───────────────────────────────────────────────────

/// Result of one configuration query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XPathOutcome {
    pub matched: bool,
    pub nodes: Vec<String>,
    pub message: String,
}

/// A parsed configuration that can be queried.
pub trait ConfigurationTree: Send + Sync {
    /// Runs a query. An error means the query itself could not be evaluated.
    fn xpath_evaluate(&self, query: &str) -> Result<XPathOutcome, ConfigurationError>;

    /// Human-readable dump of the whole tree.
    fn render(&self) -> String;
}

/// Module, version and configuration discovery for server/application targets.
pub trait ApplicationProbe: Send + Sync {
    fn scan_modules(&self) -> BoxFuture<'_, Result<Vec<Package>, ProbeError>>;

    fn scan_version(&self) -> BoxFuture<'_, Result<String, ProbeError>>;

    fn parse_configuration(
        &self,
    ) -> BoxFuture<'_, Result<Arc<dyn ConfigurationTree>, ConfigurationError>>;
}

/// Supplies the default configuration rules for a target, grouped by module.
pub trait RuleSource: Send + Sync {
    fn load_rules<'a>(
        &'a self,
        target: &'a AuditTarget,
    ) -> BoxFuture<'a, Result<BTreeMap<String, Vec<ConfigurationRule>>, RuleError>>;
}

// ─── Analyzers ───────────────────────────────────────────────────────

/// Output of one analyzer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerReport {
    pub analyzer: String,
    pub findings: Vec<String>,
}

/// A free-form check that runs after the rule evaluation.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    fn run<'a>(
        &'a self,
        target: &'a AuditTarget,
        configuration: Option<&'a dyn ConfigurationTree>,
    ) -> BoxFuture<'a, Result<AnalyzerReport, AnalyzerError>>;
}

/// Discovers the analyzers applicable to a target.
pub trait AnalyzerSource: Send + Sync {
    fn scan_analyzers<'a>(
        &'a self,
        target: &'a AuditTarget,
    ) -> BoxFuture<'a, Result<Vec<Arc<dyn Analyzer>>, AnalyzerError>>;
}

// ─── Reporting ───────────────────────────────────────────────────────

/// Condensed result of the vulnerability path, handed to a [`Reporter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub run_id: String,
    pub target: AuditTarget,
    pub package_count: usize,
    /// Vulnerabilities whose affected range contains an installed version.
    pub vulnerable: Vec<Vulnerability>,
}

/// Delivers an [`AuditSummary`] somewhere outside the process.
pub trait Reporter: Send + Sync {
    fn report<'a>(&'a self, summary: &'a AuditSummary) -> BoxFuture<'a, Result<(), ReportError>>;
}
