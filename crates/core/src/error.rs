//! Error types, one enum per collaborator boundary.
//!
//! Phase-fatal errors ([`EnumerationError`], [`SourceError`], [`ProbeError`],
//! [`RuleError`], [`AnalyzerError`], [`ReportError`]) bubble up to the
//! orchestrator, which classifies them into an `AuditResult`.
//! Item-recoverable errors ([`VersionRangeError`], [`ConfigurationError`]
//! from a single query) are caught by the component that sees them.

/// Top-level ironaudit error.
#[derive(Debug, thiserror::Error)]
pub enum IronauditError {
    /// Settings error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Package enumeration error
    #[error("enumeration error: {0}")]
    Enumeration(#[from] EnumerationError),

    /// Data source error
    #[error("data source error: {0}")]
    Source(#[from] SourceError),

    /// Version range error
    #[error("version range error: {0}")]
    VersionRange(#[from] VersionRangeError),

    /// Configuration parse or query error
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Rule or profile loading error
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// Probe error
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Analyzer error
    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    /// Reporter error
    #[error("report error: {0}")]
    Report(#[from] ReportError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file does not exist
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Settings file is not valid TOML
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A settings value failed validation
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Package enumeration failed. Always fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum EnumerationError {
    /// Package list could not be read
    #[error("failed to read package list from {path}: {reason}")]
    Read { path: String, reason: String },

    /// Package list could not be parsed
    #[error("failed to parse package list from {path}: {reason}")]
    Parse { path: String, reason: String },

    /// Enumerator-specific failure
    #[error("package enumeration failed: {0}")]
    Failed(String),
}

/// A data source query failed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Source queried before it finished loading
    #[error("data source '{source_name}' is not initialised")]
    NotInitialised { source_name: String },

    /// Query against the source failed
    #[error("data source '{source_name}' query failed: {reason}")]
    Query { source_name: String, reason: String },

    /// Query task panicked or was cancelled
    #[error("data source '{source_name}' task aborted: {reason}")]
    TaskAborted { source_name: String, reason: String },
}

/// The version range oracle could not decide a spec/version pair.
#[derive(Debug, thiserror::Error)]
pub enum VersionRangeError {
    /// Malformed affected-version spec
    #[error("invalid version range '{spec}': {reason}")]
    InvalidRange { spec: String, reason: String },

    /// Malformed installed version
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },
}

/// Configuration parsing or querying failed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// Configuration file could not be parsed
    #[error("failed to parse configuration {path}: {reason}")]
    Parse { path: String, reason: String },

    /// Query string is malformed
    #[error("invalid query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },

    /// No configuration tree to query
    #[error("configuration unavailable: {0}")]
    Unavailable(String),
}

/// Configuration rule or audit profile loading failed.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Rule file does not exist
    #[error("rule file not found: {path}")]
    NotFound { path: String },

    /// Rule file is not valid YAML
    #[error("failed to parse rules in {path}: {reason}")]
    Parse { path: String, reason: String },

    /// Rule is missing a required field
    #[error("invalid rule '{title}': {reason}")]
    Invalid { title: String, reason: String },

    /// Too many rule files
    #[error("rule limit exceeded: {count} (max: {max})")]
    LimitExceeded { count: usize, max: usize },

    /// Rule file could not be read
    #[error("io error reading {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Module or version detection on a server/application target failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Module scan failed
    #[error("failed to scan modules: {0}")]
    Modules(String),

    /// Version detection failed
    #[error("failed to detect version: {0}")]
    Version(String),
}

/// Analyzer discovery or execution failed.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// Analyzer discovery failed
    #[error("failed to scan analyzers: {0}")]
    Scan(String),

    /// One analyzer failed
    #[error("analyzer '{name}' failed: {reason}")]
    Run { name: String, reason: String },
}

/// Report delivery failed.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Report could not be written or sent
    #[error("report delivery failed: {0}")]
    Delivery(String),
}
