//! # ironaudit-sources
//!
//! Reference collaborators that let the audit engine run against local
//! files:
//!
//! - [`lockfile`]: `Cargo.lock` / `package-lock.json` package enumerators
//! - [`vulndb`]: local JSON vulnerability database ([`LocalVulnDb`])
//! - [`oracle`]: `semver`-backed version range oracle ([`SemverRangeOracle`])
//! - [`json_tree`]: JSON configuration tree with pointer queries
//! - [`probe`]: settings-driven application probe ([`StaticProbe`])
//! - [`report`]: JSON file reporter ([`JsonFileReporter`])

pub mod error;
pub mod json_tree;
pub mod lockfile;
pub mod oracle;
pub mod probe;
pub mod report;
pub mod vulndb;

pub use error::SourcesError;
pub use json_tree::JsonConfigTree;
pub use lockfile::{CargoLockParser, LockfileEnumerator, LockfileParser, NpmLockParser};
pub use oracle::SemverRangeOracle;
pub use probe::{StaticProbe, parse_module_specs};
pub use report::JsonFileReporter;
pub use vulndb::{LocalVulnDb, VulnDbEntry};
