//! Engine error types.
//!
//! [`EngineError`] covers failures that originate inside the engine itself
//! (configuration, fan-out joins, evaluator task joins). Collaborator errors
//! keep their core types and are wrapped by [`PhaseError`](crate::phase::PhaseError)
//! at the phase boundary.

use ironaudit_core::error::{ConfigError, IronauditError, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid auditor configuration or missing collaborator.
    #[error("config error: {field}: {reason}")]
    Config { field: String, reason: String },

    /// One or more data sources failed during a fan-out.
    #[error("{failed} of {total} data sources failed: {details}")]
    Sources {
        failed: usize,
        total: usize,
        details: String,
    },

    /// A blocking evaluation task panicked or was cancelled.
    #[error("evaluation task failed: {0}")]
    Join(String),
}

impl EngineError {
    pub(crate) fn from_source_failures(failures: &[SourceError], total: usize) -> Self {
        let details = failures
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Self::Sources {
            failed: failures.len(),
            total,
            details,
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

impl From<EngineError> for IronauditError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config { field, reason } => {
                IronauditError::Config(ConfigError::InvalidValue { field, reason })
            }
            EngineError::Sources { details, .. } => IronauditError::Source(SourceError::Query {
                source_name: "fan-out".to_owned(),
                reason: details,
            }),
            EngineError::Join(msg) => IronauditError::Io(std::io::Error::other(msg)),
        }
    }
}
