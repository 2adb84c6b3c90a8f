//! Error type of the reference collaborators.
//!
//! [`SourcesError`] stays inside this crate; each collaborator converts it
//! into the core error of the trait it implements before returning.

use ironaudit_core::error::{
    ConfigurationError, EnumerationError, IronauditError, ProbeError, ReportError, SourceError,
};

#[derive(Debug, thiserror::Error)]
pub enum SourcesError {
    #[error("lockfile parse error: {path}: {reason}")]
    LockfileParse { path: String, reason: String },

    #[error("unsupported lockfile: {path}")]
    UnsupportedLockfile { path: String },

    #[error("vulnerability db load error: {path}: {reason}")]
    VulnDbLoad { path: String, reason: String },

    #[error("vulnerability db parse error: {0}")]
    VulnDbParse(String),

    #[error("configuration parse error: {path}: {reason}")]
    ConfigurationParse { path: String, reason: String },

    #[error("invalid module spec '{spec}': expected name@version")]
    ModuleSpec { spec: String },

    #[error("io error: {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("file too large: {path}: {size} bytes (max: {max})")]
    FileTooBig { path: String, size: u64, max: u64 },
}

impl From<SourcesError> for EnumerationError {
    fn from(err: SourcesError) -> Self {
        match err {
            SourcesError::LockfileParse { path, reason } => EnumerationError::Parse { path, reason },
            SourcesError::Io { path, source } => EnumerationError::Read {
                path,
                reason: source.to_string(),
            },
            SourcesError::FileTooBig { path, size, max } => EnumerationError::Read {
                path,
                reason: format!("{size} bytes exceeds maximum {max} bytes"),
            },
            other => EnumerationError::Failed(other.to_string()),
        }
    }
}

impl From<SourcesError> for ConfigurationError {
    fn from(err: SourcesError) -> Self {
        match err {
            SourcesError::ConfigurationParse { path, reason } => {
                ConfigurationError::Parse { path, reason }
            }
            SourcesError::Io { path, source } => ConfigurationError::Parse {
                path,
                reason: source.to_string(),
            },
            other => ConfigurationError::Unavailable(other.to_string()),
        }
    }
}

impl From<SourcesError> for ProbeError {
    fn from(err: SourcesError) -> Self {
        match err {
            SourcesError::ModuleSpec { .. } => ProbeError::Modules(err.to_string()),
            other => ProbeError::Version(other.to_string()),
        }
    }
}

impl SourcesError {
    /// Wraps this error as a query failure of the named data source.
    pub fn into_source_error(self, source_name: &str) -> SourceError {
        SourceError::Query {
            source_name: source_name.to_owned(),
            reason: self.to_string(),
        }
    }

    /// Wraps this error as a report delivery failure.
    pub fn into_report_error(self) -> ReportError {
        ReportError::Delivery(self.to_string())
    }
}

impl From<SourcesError> for IronauditError {
    fn from(err: SourcesError) -> Self {
        match err {
            SourcesError::LockfileParse { .. }
            | SourcesError::UnsupportedLockfile { .. }
            | SourcesError::FileTooBig { .. } => IronauditError::Enumeration(err.into()),
            SourcesError::VulnDbLoad { .. } | SourcesError::VulnDbParse(_) => {
                IronauditError::Source(err.into_source_error("local-db"))
            }
            SourcesError::ConfigurationParse { .. } => IronauditError::Configuration(err.into()),
            SourcesError::ModuleSpec { .. } => IronauditError::Probe(err.into()),
            SourcesError::Io { source, .. } => IronauditError::Io(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockfile_parse_becomes_enumeration_parse() {
        let err: EnumerationError = SourcesError::LockfileParse {
            path: "Cargo.lock".to_owned(),
            reason: "invalid TOML".to_owned(),
        }
        .into();
        assert!(matches!(err, EnumerationError::Parse { ref path, .. } if path == "Cargo.lock"));
    }

    #[test]
    fn file_too_big_display() {
        let err = SourcesError::FileTooBig {
            path: "/tmp/npm.json".to_owned(),
            size: 100,
            max: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("npm.json"));
        assert!(msg.contains("max: 10"));
    }

    #[test]
    fn module_spec_becomes_probe_modules_error() {
        let err: ProbeError = SourcesError::ModuleSpec {
            spec: "broken".to_owned(),
        }
        .into();
        assert!(matches!(err, ProbeError::Modules(_)));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn db_errors_name_the_source() {
        let err = SourcesError::VulnDbParse("line 3".to_owned()).into_source_error("local-db");
        let msg = err.to_string();
        assert!(msg.contains("local-db"));
        assert!(msg.contains("line 3"));
    }

    #[test]
    fn io_converts_to_top_level_io() {
        let err: IronauditError = SourcesError::Io {
            path: "/x".to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert!(matches!(err, IronauditError::Io(_)));
    }
}
