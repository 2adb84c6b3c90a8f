//! Terminal outcome of an audit run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of terminal results. Every failing phase maps to exactly one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditResult {
    Success,
    ErrorScanningPackages,
    ErrorSearchingArtifacts,
    ErrorSearchingVulnerabilities,
    ErrorEvaluatingVulnerabilities,
    ErrorScanningModules,
    ErrorScanningVersion,
    ErrorScanningConfiguration,
    ErrorScanningDefaultConfigurationRules,
    ErrorEvaluatingConfigurationRules,
    ErrorScanningAnalyzers,
    ErrorRunningAnalyzers,
    ErrorReporting,
    Cancelled,
}

impl AuditResult {
    /// Stable code used in logs and JSON output.
    pub fn code(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::ErrorScanningPackages => "ERROR_SCANNING_PACKAGES",
            Self::ErrorSearchingArtifacts => "ERROR_SEARCHING_ARTIFACTS",
            Self::ErrorSearchingVulnerabilities => "ERROR_SEARCHING_VULNERABILITIES",
            Self::ErrorEvaluatingVulnerabilities => "ERROR_EVALUATING_VULNERABILITIES",
            Self::ErrorScanningModules => "ERROR_SCANNING_MODULES",
            Self::ErrorScanningVersion => "ERROR_SCANNING_VERSION",
            Self::ErrorScanningConfiguration => "ERROR_SCANNING_CONFIGURATION",
            Self::ErrorScanningDefaultConfigurationRules => {
                "ERROR_SCANNING_DEFAULT_CONFIGURATION_RULES"
            }
            Self::ErrorEvaluatingConfigurationRules => "ERROR_EVALUATING_CONFIGURATION_RULES",
            Self::ErrorScanningAnalyzers => "ERROR_SCANNING_ANALYZERS",
            Self::ErrorRunningAnalyzers => "ERROR_RUNNING_ANALYZERS",
            Self::ErrorReporting => "ERROR_REPORTING",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Process exit status for the CLI.
    ///
    /// | Code | Meaning |
    /// |------|---------|
    /// | 0    | Success |
    /// | 20   | package path failed (packages, artifacts, vulnerabilities, evaluation) |
    /// | 21   | server path failed (modules, version, configuration, rules) |
    /// | 22   | analyzers failed |
    /// | 23   | reporting failed |
    /// | 130  | cancelled |
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ErrorScanningPackages
            | Self::ErrorSearchingArtifacts
            | Self::ErrorSearchingVulnerabilities
            | Self::ErrorEvaluatingVulnerabilities => 20,
            Self::ErrorScanningModules
            | Self::ErrorScanningVersion
            | Self::ErrorScanningConfiguration
            | Self::ErrorScanningDefaultConfigurationRules
            | Self::ErrorEvaluatingConfigurationRules => 21,
            Self::ErrorScanningAnalyzers | Self::ErrorRunningAnalyzers => 22,
            Self::ErrorReporting => 23,
            Self::Cancelled => 130,
        }
    }
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
