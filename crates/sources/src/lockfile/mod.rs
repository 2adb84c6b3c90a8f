//! Lockfile package enumerators.
//!
//! [`LockfileParser`] turns the text of one lockfile format into packages;
//! [`LockfileEnumerator`] reads the file from disk and implements the core
//! [`PackageEnumerator`] trait on top of a parser.
//!
//! # Supported formats
//!
//! - `Cargo.lock` (TOML): [`CargoLockParser`]
//! - `package-lock.json` v2/v3 (JSON): [`NpmLockParser`]

pub mod cargo;
pub mod npm;

use std::path::{Path, PathBuf};

use ironaudit_core::error::EnumerationError;
use ironaudit_core::{BoxFuture, Package, PackageEnumerator};
use tracing::{debug, info};

use crate::error::SourcesError;

pub use cargo::CargoLockParser;
pub use npm::NpmLockParser;

/// Maximum lockfile size (50 MB).
const MAX_LOCKFILE_SIZE: u64 = 50 * 1024 * 1024;

/// Parser for one lockfile format.
pub trait LockfileParser: Send + Sync {
    /// Package manager id stamped on every parsed package.
    fn package_manager(&self) -> &str;

    /// Whether the file name belongs to this format.
    fn can_parse(&self, path: &Path) -> bool;

    /// Parses lockfile content. `source_path` is only used in errors.
    fn parse(&self, content: &str, source_path: &str) -> Result<Vec<Package>, SourcesError>;
}

/// Picks a parser by file name.
pub fn detect_parser(path: &Path) -> Option<Box<dyn LockfileParser>> {
    let parsers: [Box<dyn LockfileParser>; 2] = [Box::new(CargoLockParser), Box::new(NpmLockParser)];
    parsers.into_iter().find(|p| p.can_parse(path))
}

/// Reads a lockfile and lists its packages.
pub struct LockfileEnumerator {
    path: PathBuf,
    parser: Box<dyn LockfileParser>,
}

impl LockfileEnumerator {
    pub fn new(path: impl Into<PathBuf>, parser: Box<dyn LockfileParser>) -> Self {
        Self {
            path: path.into(),
            parser,
        }
    }

    /// Builds an enumerator whose parser is chosen from the file name.
    pub fn detect(path: impl Into<PathBuf>) -> Result<Self, SourcesError> {
        let path = path.into();
        let parser = detect_parser(&path).ok_or_else(|| SourcesError::UnsupportedLockfile {
            path: path.display().to_string(),
        })?;
        Ok(Self { path, parser })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the lockfile.
    ///
    /// Packages are deduplicated by identity and sorted by name, then version.
    pub async fn read_packages(&self) -> Result<Vec<Package>, SourcesError> {
        let path_str = self.path.display().to_string();
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|source| SourcesError::Io {
                path: path_str.clone(),
                source,
            })?;
        if metadata.len() > MAX_LOCKFILE_SIZE {
            return Err(SourcesError::FileTooBig {
                path: path_str,
                size: metadata.len(),
                max: MAX_LOCKFILE_SIZE,
            });
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourcesError::Io {
                path: path_str.clone(),
                source,
            })?;

        let mut packages = self.parser.parse(&content, &path_str)?;
        let parsed = packages.len();
        packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        packages.dedup();
        if packages.len() != parsed {
            debug!(
                path = %path_str,
                duplicates = parsed - packages.len(),
                "dropped duplicate lockfile entries"
            );
        }

        info!(
            path = %path_str,
            package_manager = self.parser.package_manager(),
            packages = packages.len(),
            "parsed lockfile"
        );
        Ok(packages)
    }
}

impl PackageEnumerator for LockfileEnumerator {
    fn package_manager(&self) -> &str {
        self.parser.package_manager()
    }

    fn get_packages(&self) -> BoxFuture<'_, Result<Vec<Package>, EnumerationError>> {
        Box::pin(async move { self.read_packages().await.map_err(EnumerationError::from) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_parser_by_file_name() {
        let cargo = detect_parser(Path::new("/project/Cargo.lock")).unwrap();
        assert_eq!(cargo.package_manager(), "cargo");
        let npm = detect_parser(Path::new("package-lock.json")).unwrap();
        assert_eq!(npm.package_manager(), "npm");
        assert!(detect_parser(Path::new("yarn.lock")).is_none());
        assert!(detect_parser(Path::new("")).is_none());
    }

    #[test]
    fn detect_rejects_unknown_lockfile() {
        let err = LockfileEnumerator::detect("/project/poetry.lock").err().unwrap();
        assert!(matches!(err, SourcesError::UnsupportedLockfile { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let enumerator = LockfileEnumerator::detect("/nonexistent/Cargo.lock").unwrap();
        let err = enumerator.get_packages().await.unwrap_err();
        assert!(matches!(err, EnumerationError::Read { .. }));
    }

    #[tokio::test]
    async fn duplicate_entries_are_dropped_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cargo.lock");
        std::fs::write(
            &path,
            r#"
[[package]]
name = "serde"
version = "1.0.0"
source = "registry+https://github.com/rust-lang/crates.io-index"

[[package]]
name = "anyhow"
version = "1.0.0"
source = "registry+https://github.com/rust-lang/crates.io-index"

[[package]]
name = "serde"
version = "1.0.0"
source = "registry+https://github.com/rust-lang/crates.io-index"
"#,
        )
        .unwrap();

        let packages = LockfileEnumerator::detect(&path)
            .unwrap()
            .read_packages()
            .await
            .unwrap();
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["anyhow", "serde"]);
    }
}
