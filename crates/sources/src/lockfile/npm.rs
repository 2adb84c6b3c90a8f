//! `package-lock.json` parser (lockfile v2/v3).
//!
//! ```json
//! {
//!   "name": "my-app",
//!   "lockfileVersion": 3,
//!   "packages": {
//!     "": { "name": "my-app", "version": "1.0.0" },
//!     "node_modules/lodash": { "version": "4.17.21" }
//!   }
//! }
//! ```
//!
//! The root entry (empty key) is the project itself and is skipped, as are
//! linked workspace entries without a version.

use std::collections::HashMap;
use std::path::Path;

use ironaudit_core::Package;
use serde::Deserialize;

use crate::error::SourcesError;
use crate::lockfile::LockfileParser;

pub struct NpmLockParser;

#[derive(Deserialize)]
struct NpmLockFile {
    #[serde(default)]
    packages: HashMap<String, NpmPackageEntry>,
}

#[derive(Deserialize)]
struct NpmPackageEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    link: bool,
}

impl LockfileParser for NpmLockParser {
    fn package_manager(&self) -> &str {
        "npm"
    }

    fn can_parse(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name == "package-lock.json")
    }

    fn parse(&self, content: &str, source_path: &str) -> Result<Vec<Package>, SourcesError> {
        let lock: NpmLockFile =
            serde_json::from_str(content).map_err(|e| SourcesError::LockfileParse {
                path: source_path.to_owned(),
                reason: e.to_string(),
            })?;

        let packages = lock
            .packages
            .into_iter()
            .filter(|(key, entry)| !key.is_empty() && !entry.link)
            .filter_map(|(key, entry)| {
                let version = entry.version?;
                let name = entry.name.unwrap_or_else(|| package_name(&key).to_owned());
                Some(Package::new("npm", name, version))
            })
            .collect();
        Ok(packages)
    }
}

/// `node_modules/a/node_modules/@scope/b` → `@scope/b`
fn package_name(key: &str) -> &str {
    match key.rfind("node_modules/") {
        Some(pos) => &key[pos + "node_modules/".len()..],
        None => key,
    }
}
