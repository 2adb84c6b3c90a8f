//! Reporter that writes the audit summary as a JSON file.

use std::path::{Path, PathBuf};

use tracing::info;

use ironaudit_core::error::ReportError;
use ironaudit_core::{AuditSummary, BoxFuture, Reporter};

use crate::error::SourcesError;

pub struct JsonFileReporter {
    path: PathBuf,
}

impl JsonFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, summary: &AuditSummary) -> Result<(), SourcesError> {
        let path_str = self.path.display().to_string();
        let json = serde_json::to_string_pretty(summary).map_err(|e| SourcesError::Io {
            path: path_str.clone(),
            source: e.into(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SourcesError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| SourcesError::Io {
                path: path_str,
                source,
            })
    }
}

impl Reporter for JsonFileReporter {
    fn report<'a>(&'a self, summary: &'a AuditSummary) -> BoxFuture<'a, Result<(), ReportError>> {
        Box::pin(async move {
            self.write(summary)
                .await
                .map_err(SourcesError::into_report_error)?;
            info!(
                path = %self.path.display(),
                vulnerable = summary.vulnerable.len(),
                "audit report written"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironaudit_core::AuditTarget;

    fn summary() -> AuditSummary {
        AuditSummary {
            run_id: "run-1".to_owned(),
            target: AuditTarget::packages("npm"),
            package_count: 3,
            vulnerable: Vec::new(),
        }
    }

    #[tokio::test]
    async fn writes_summary_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/nested/audit.json");
        JsonFileReporter::new(&path).report(&summary()).await.unwrap();

        let written: AuditSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, summary());
    }

    #[tokio::test]
    async fn unwritable_path_is_a_delivery_error() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be overwritten with a file
        let err = JsonFileReporter::new(dir.path())
            .report(&summary())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Delivery(_)));
    }
}
