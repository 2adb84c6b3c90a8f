//! Shared building blocks of ironaudit: the package/vulnerability data
//! model, terminal [`AuditResult`] codes, collaborator traits, error types
//! and `ironaudit.toml` settings.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod result;
pub mod rule;
pub mod types;

// errors
pub use error::{
    AnalyzerError, ConfigError, ConfigurationError, EnumerationError, IronauditError, ProbeError,
    ReportError, RuleError, SourceError, VersionRangeError,
};

// settings
pub use config::IronauditConfig;

// collaborator traits
pub use pipeline::{
    Analyzer, AnalyzerReport, AnalyzerSource, ApplicationProbe, AuditSummary, BoxFuture,
    ConfigurationTree, DataSource, PackageEnumerator, Reporter, RuleSource, VersionRangeOracle,
    XPathOutcome,
};

// domain types
pub use result::AuditResult;
pub use rule::{AuditProfile, AuditProfileRule, ConfigurationRule, RuleOutcome};
pub use types::{
    Artifact, ArtifactVersion, AuditTarget, Package, PackageMap, Platform, Severity, TargetKind,
    Vulnerability,
};
