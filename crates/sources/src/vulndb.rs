//! Local vulnerability database backed by JSON files.
//!
//! # Directory layout
//!
//! ```text
//! /var/lib/ironaudit/vuln-db/
//!   cargo.json     # advisories for package manager "cargo"
//!   npm.json       # advisories for package manager "npm"
//! ```
//!
//! The file stem is the package manager id. Each file holds an array of
//! [`VulnDbEntry`]:
//!
//! ```json
//! [
//!   {
//!     "id": "GHSA-jf85-cpcp-j695",
//!     "package": "lodash",
//!     "affected": ["<4.17.12"],
//!     "severity": "High",
//!     "summary": "Prototype pollution",
//!     "cve": "CVE-2019-10744"
//!   }
//! ]
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ironaudit_core::error::SourceError;
use ironaudit_core::{
    Artifact, AuditTarget, BoxFuture, DataSource, Package, PackageMap, Severity, Vulnerability,
};

use crate::error::SourcesError;

/// Maximum size of one DB file (50 MB).
const MAX_VULN_DB_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum number of entries across all files.
const MAX_VULN_DB_ENTRIES: usize = 1_000_000;

/// Data source name reported in logs and errors.
pub const LOCAL_DB_NAME: &str = "local-db";

/// One advisory as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnDbEntry {
    pub id: String,
    pub package: String,
    /// Affected version ranges, in the range syntax of the configured oracle.
    #[serde(default)]
    pub affected: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub cve: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl VulnDbEntry {
    fn to_vulnerability(&self, package_manager: &str) -> Vulnerability {
        let mut v = Vulnerability::new(
            self.id.clone(),
            package_manager,
            self.package.clone(),
            self.affected.clone(),
        );
        if let Some(title) = &self.title {
            v.title = title.clone();
        }
        v.summary = self.summary.clone();
        v.severity = self.severity.as_deref().and_then(Severity::from_str_loose);
        v.cve = self.cve.clone();
        v.references = self.references.clone();
        v
    }
}

/// Vulnerability database loaded from a directory of `{package_manager}.json` files.
///
/// Lookups go through an index keyed by `(package_manager, name)`.
pub struct LocalVulnDb {
    dir: PathBuf,
    entries: Vec<(String, VulnDbEntry)>,
    index: HashMap<(String, String), Vec<usize>>,
    package_managers: BTreeSet<String>,
    initialised: bool,
}

impl LocalVulnDb {
    /// A database that has not been loaded. It reports itself uninitialised.
    pub fn unloaded(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: Vec::new(),
            index: HashMap::new(),
            package_managers: BTreeSet::new(),
            initialised: false,
        }
    }

    /// Builds an initialised database from in-memory entries.
    pub fn from_entries(package_manager: &str, entries: Vec<VulnDbEntry>) -> Self {
        let mut db = Self::unloaded(PathBuf::new());
        db.insert(package_manager, entries);
        db.initialised = true;
        db
    }

    /// Loads every `*.json` file under `dir` on the blocking pool.
    ///
    /// A missing directory yields an uninitialised database and a warning,
    /// so the engine skips this source instead of failing the run.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SourcesError> {
        let dir = dir.into();
        let task_dir = dir.clone();
        tokio::task::spawn_blocking(move || Self::load_from_dir(&task_dir))
            .await
            .map_err(|e| SourcesError::VulnDbLoad {
                path: dir.display().to_string(),
                reason: format!("load task failed: {e}"),
            })?
    }

    /// Synchronous loader; call through [`LocalVulnDb::open`] from async code.
    pub fn load_from_dir(dir: &Path) -> Result<Self, SourcesError> {
        let mut db = Self::unloaded(dir);

        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %dir.display(), "vulnerability db directory not found");
                return Ok(db);
            }
            Err(e) => {
                return Err(SourcesError::VulnDbLoad {
                    path: dir.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let mut files: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for path in files {
            let Some(package_manager) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let package_manager = package_manager.to_owned();
            let entries = read_db_file(&path)?;

            if db.entries.len() + entries.len() > MAX_VULN_DB_ENTRIES {
                warn!(
                    current = db.entries.len(),
                    new = entries.len(),
                    max = MAX_VULN_DB_ENTRIES,
                    "vulnerability database entry limit reached, truncating"
                );
                let remaining = MAX_VULN_DB_ENTRIES.saturating_sub(db.entries.len());
                db.insert(&package_manager, entries.into_iter().take(remaining).collect());
                break;
            }

            info!(path = %path.display(), entries = entries.len(), "loaded vuln db file");
            db.insert(&package_manager, entries);
        }

        db.initialised = true;
        Ok(db)
    }

    fn insert(&mut self, package_manager: &str, entries: Vec<VulnDbEntry>) {
        self.package_managers.insert(package_manager.to_owned());
        for entry in entries {
            let key = (package_manager.to_owned(), entry.package.clone());
            self.index.entry(key).or_default().push(self.entries.len());
            self.entries.push((package_manager.to_owned(), entry));
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Package managers with a loaded DB file.
    pub fn package_managers(&self) -> impl Iterator<Item = &str> {
        self.package_managers.iter().map(String::as_str)
    }

    /// Entries for a package, regardless of version.
    pub fn lookup(&self, package_manager: &str, name: &str) -> Vec<&VulnDbEntry> {
        let key = (package_manager.to_owned(), name.to_owned());
        self.index
            .get(&key)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&i| self.entries.get(i).map(|(_, e)| e))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn ensure_initialised(&self) -> Result<(), SourceError> {
        if self.initialised {
            Ok(())
        } else {
            Err(SourceError::NotInitialised {
                source_name: LOCAL_DB_NAME.to_owned(),
            })
        }
    }

    fn vulnerabilities_for(&self, packages: &[Package]) -> PackageMap<Vulnerability> {
        let mut map = PackageMap::new();
        for package in packages {
            let found: Vec<Vulnerability> = self
                .lookup(&package.package_manager, &package.name)
                .into_iter()
                .map(|e| e.to_vulnerability(&package.package_manager))
                .collect();
            if !found.is_empty() {
                map.insert(package.clone(), found);
            }
        }
        debug!(
            packages = packages.len(),
            matched = map.len(),
            "local vuln db lookup"
        );
        map
    }

    fn artifacts_for(&self, packages: &[Package]) -> PackageMap<Artifact> {
        let mut map = PackageMap::new();
        for package in packages {
            let entries = self.lookup(&package.package_manager, &package.name);
            if entries.is_empty() {
                continue;
            }
            let mut artifact = Artifact::new(
                format!("{}/{}", package.package_manager, package.name),
                package.name.clone(),
            );
            artifact.description = format!("{} known advisories", entries.len());
            artifact.matched_package = Some(package.clone());
            map.insert(package.clone(), vec![artifact]);
        }
        map
    }
}

fn read_db_file(path: &Path) -> Result<Vec<VulnDbEntry>, SourcesError> {
    let path_str = path.display().to_string();
    let metadata = std::fs::metadata(path).map_err(|e| SourcesError::VulnDbLoad {
        path: path_str.clone(),
        reason: e.to_string(),
    })?;
    if metadata.len() > MAX_VULN_DB_FILE_SIZE {
        return Err(SourcesError::FileTooBig {
            path: path_str,
            size: metadata.len(),
            max: MAX_VULN_DB_FILE_SIZE,
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| SourcesError::VulnDbLoad {
        path: path_str.clone(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content)
        .map_err(|e| SourcesError::VulnDbParse(format!("failed to parse {path_str}: {e}")))
}

impl DataSource for LocalVulnDb {
    fn name(&self) -> &str {
        LOCAL_DB_NAME
    }

    fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Eligible when a DB file exists for the target's package manager.
    fn is_eligible_for_target(&self, target: &AuditTarget) -> bool {
        self.package_managers.contains(&target.package_manager)
    }

    fn search_artifacts<'a>(
        &'a self,
        packages: &'a [Package],
    ) -> BoxFuture<'a, Result<PackageMap<Artifact>, SourceError>> {
        // artifact fan-out queries every source, so an absent db answers empty
        Box::pin(async move {
            if !self.initialised {
                warn!(path = %self.dir.display(), "vulnerability db not loaded, no artifacts");
                return Ok(PackageMap::new());
            }
            Ok(self.artifacts_for(packages))
        })
    }

    fn search_vulnerabilities<'a>(
        &'a self,
        packages: &'a [Package],
    ) -> BoxFuture<'a, Result<PackageMap<Vulnerability>, SourceError>> {
        Box::pin(async move {
            self.ensure_initialised()?;
            Ok(self.vulnerabilities_for(packages))
        })
    }
}
