//! CLI-specific error types and exit code mapping

use ironaudit_core::AuditResult;
use ironaudit_core::error::{IronauditError, RuleError};
use ironaudit_engine::EngineError;
use ironaudit_sources::SourcesError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to the process exit status.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Settings loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The audit ended with a non-success result.
    #[error("audit failed with {result}: {message}")]
    Audit { result: AuditResult, message: String },

    /// The audit succeeded and found vulnerable packages.
    #[error("found {0} vulnerable packages")]
    Vulnerable(usize),

    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Core(#[from] IronauditError),

    #[error("rule error: {0}")]
    Rule(String),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code  | Meaning |
    /// |-------|---------|
    /// | 1     | General / command error |
    /// | 2     | Configuration error |
    /// | 4     | Vulnerable packages found |
    /// | 10    | IO error |
    /// | 20-23, 130 | Audit result, see `AuditResult::exit_code` |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Vulnerable(_) => 4,
            Self::Io(_) => 10,
            Self::Audit { result, .. } => result.exit_code(),
            Self::Core(IronauditError::Config(_)) => 2,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Rule(_) => 1,
        }
    }
}

impl From<RuleError> for CliError {
    fn from(e: RuleError) -> Self {
        Self::Rule(e.to_string())
    }
}

impl From<SourcesError> for CliError {
    fn from(e: SourcesError) -> Self {
        Self::Command(e.to_string())
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Config { .. } => Self::Config(e.to_string()),
            other => Self::Command(other.to_string()),
        }
    }
}
