//! `Cargo.lock` parser.
//!
//! ```toml
//! version = 3
//!
//! [[package]]
//! name = "serde"
//! version = "1.0.200"
//! source = "registry+https://github.com/rust-lang/crates.io-index"
//! ```
//!
//! Only packages with a `source` are reported; path dependencies and the
//! workspace's own crates have none.

use std::path::Path;

use ironaudit_core::Package;
use serde::Deserialize;

use crate::error::SourcesError;
use crate::lockfile::LockfileParser;

pub struct CargoLockParser;

#[derive(Deserialize)]
struct CargoLockFile {
    #[serde(default, rename = "package")]
    packages: Vec<CargoPackageEntry>,
}

#[derive(Deserialize)]
struct CargoPackageEntry {
    name: String,
    version: String,
    #[serde(default)]
    source: Option<String>,
}

impl LockfileParser for CargoLockParser {
    fn package_manager(&self) -> &str {
        "cargo"
    }

    fn can_parse(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name == "Cargo.lock")
    }

    fn parse(&self, content: &str, source_path: &str) -> Result<Vec<Package>, SourcesError> {
        let lock: CargoLockFile = toml::from_str(content).map_err(|e| SourcesError::LockfileParse {
            path: source_path.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(lock
            .packages
            .into_iter()
            .filter(|p| p.source.is_some())
            .map(|p| {
                let package = Package::new("cargo", p.name, p.version);
                match p.source.as_deref().and_then(|s| s.split_once('+')) {
                    Some((kind, _)) => package.with_group(kind),
                    None => package,
                }
            })
            .collect())
    }
}
