//! Phase identifiers and tagged phase failures.
//!
//! Every phase returns `Result<T, PhaseError>`; the orchestrator maps the
//! failing phase's [`PhaseKind`] straight to an [`AuditResult`].

use std::fmt;

use serde::{Deserialize, Serialize};

use ironaudit_core::AuditResult;

/// One step of the audit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Modules,
    Version,
    Packages,
    ProfileFilter,
    Artifacts,
    Vulnerabilities,
    Evaluate,
    Report,
    Configuration,
    DefaultConfigurationRules,
    EvaluateConfigurationRules,
    Analyzers,
    AnalyzerResults,
}

impl PhaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Modules => "modules",
            Self::Version => "version",
            Self::Packages => "packages",
            Self::ProfileFilter => "profile_filter",
            Self::Artifacts => "artifacts",
            Self::Vulnerabilities => "vulnerabilities",
            Self::Evaluate => "evaluate",
            Self::Report => "report",
            Self::Configuration => "configuration",
            Self::DefaultConfigurationRules => "default_configuration_rules",
            Self::EvaluateConfigurationRules => "evaluate_configuration_rules",
            Self::Analyzers => "analyzers",
            Self::AnalyzerResults => "analyzer_results",
        }
    }

    /// Most specific result code for a failure in this phase.
    pub fn audit_result(self) -> AuditResult {
        match self {
            // the profile filter never fails on its own; it shares the packages barrier
            Self::Packages | Self::ProfileFilter => AuditResult::ErrorScanningPackages,
            Self::Artifacts => AuditResult::ErrorSearchingArtifacts,
            Self::Vulnerabilities => AuditResult::ErrorSearchingVulnerabilities,
            Self::Evaluate => AuditResult::ErrorEvaluatingVulnerabilities,
            Self::Report => AuditResult::ErrorReporting,
            Self::Modules => AuditResult::ErrorScanningModules,
            Self::Version => AuditResult::ErrorScanningVersion,
            Self::Configuration => AuditResult::ErrorScanningConfiguration,
            Self::DefaultConfigurationRules => AuditResult::ErrorScanningDefaultConfigurationRules,
            Self::EvaluateConfigurationRules => AuditResult::ErrorEvaluatingConfigurationRules,
            Self::Analyzers => AuditResult::ErrorScanningAnalyzers,
            Self::AnalyzerResults => AuditResult::ErrorRunningAnalyzers,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a phase did not complete.
#[derive(Debug, thiserror::Error)]
pub enum PhaseCause {
    /// A collaborator or the engine reported an error.
    #[error(transparent)]
    Failed(Box<dyn std::error::Error + Send + Sync>),

    /// The caller cancelled the run.
    #[error("cancelled")]
    Cancelled,

    /// A concurrent phase of the same run failed first.
    #[error("aborted after a concurrent phase failed")]
    Aborted,
}

/// A phase failure tagged with the phase that owned it.
#[derive(Debug, thiserror::Error)]
#[error("{kind} phase failed: {cause}")]
pub struct PhaseError {
    pub kind: PhaseKind,
    #[source]
    pub cause: PhaseCause,
}

impl PhaseError {
    pub fn failed(kind: PhaseKind, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            kind,
            cause: PhaseCause::Failed(cause.into()),
        }
    }

    pub fn cancelled(kind: PhaseKind) -> Self {
        Self {
            kind,
            cause: PhaseCause::Cancelled,
        }
    }

    pub fn aborted(kind: PhaseKind) -> Self {
        Self {
            kind,
            cause: PhaseCause::Aborted,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.cause, PhaseCause::Aborted)
    }

    pub fn audit_result(&self) -> AuditResult {
        match self.cause {
            PhaseCause::Cancelled => AuditResult::Cancelled,
            PhaseCause::Failed(_) | PhaseCause::Aborted => self.kind.audit_result(),
        }
    }
}
