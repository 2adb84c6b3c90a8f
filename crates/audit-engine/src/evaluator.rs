//! Vulnerability evaluator.
//!
//! Decides, for every merged vulnerability, whether an installed version
//! lies in one of its affected ranges. Work is split into chunks that each
//! own a disjoint set of vulnerabilities and run on the blocking pool, so no
//! lock is needed. Oracle errors are per pair: logged, counted as no match.

use std::sync::Arc;

use tracing::{debug, warn};

use ironaudit_core::metrics as m;
use ironaudit_core::{Package, PackageMap, Vulnerability, VersionRangeOracle};

use crate::error::EngineError;

/// Applies a [`VersionRangeOracle`] to merged vulnerability results.
#[derive(Clone)]
pub struct VulnerabilityEvaluator {
    oracle: Arc<dyn VersionRangeOracle>,
    parallelism: usize,
}

impl VulnerabilityEvaluator {
    pub fn new(oracle: Arc<dyn VersionRangeOracle>, parallelism: usize) -> Self {
        Self {
            oracle,
            parallelism: parallelism.max(1),
        }
    }

    /// Evaluates every vulnerability in `vulnerabilities` against `packages`.
    ///
    /// Returns the number of vulnerabilities found in range. An empty map is
    /// left untouched.
    pub async fn evaluate(
        &self,
        packages: &[Package],
        vulnerabilities: &mut PackageMap<Vulnerability>,
    ) -> Result<usize, EngineError> {
        if vulnerabilities.is_empty() {
            debug!("no vulnerabilities to evaluate");
            return Ok(0);
        }

        let packages: Arc<[Package]> = Arc::from(packages);
        let entries: Vec<(Package, Vec<Vulnerability>)> = vulnerabilities.drain().collect();
        let chunk_size = entries.len().div_ceil(self.parallelism);

        let mut handles = Vec::new();
        let mut entries = entries.into_iter();
        loop {
            let chunk: Vec<_> = entries.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let oracle = Arc::clone(&self.oracle);
            let packages = Arc::clone(&packages);
            handles.push(tokio::task::spawn_blocking(move || {
                evaluate_chunk(chunk, &packages, oracle.as_ref())
            }));
        }

        let mut in_range = 0;
        let mut join_error = None;
        for handle in handles {
            match handle.await {
                Ok((chunk, hits)) => {
                    in_range += hits;
                    vulnerabilities.extend(chunk);
                }
                Err(e) => {
                    join_error.get_or_insert(EngineError::from(e));
                }
            }
        }
        if let Some(e) = join_error {
            return Err(e);
        }

        metrics::counter!(m::VULNERABILITIES_IN_RANGE_TOTAL).increment(in_range as u64);
        Ok(in_range)
    }
}

fn evaluate_chunk(
    mut chunk: Vec<(Package, Vec<Vulnerability>)>,
    packages: &[Package],
    oracle: &dyn VersionRangeOracle,
) -> (Vec<(Package, Vec<Vulnerability>)>, usize) {
    let mut hits = 0;
    for (_, vulns) in &mut chunk {
        for vuln in vulns.iter_mut() {
            evaluate_vulnerability(vuln, packages, oracle);
            if vuln.package_version_is_in_range {
                hits += 1;
            }
        }
    }
    (chunk, hits)
}

/// Evaluates one vulnerability and writes its two evaluation fields once.
///
/// Every installed package targeted by the vulnerability is tested in list
/// order; when several match, the last one wins.
pub fn evaluate_vulnerability(
    vulnerability: &mut Vulnerability,
    packages: &[Package],
    oracle: &dyn VersionRangeOracle,
) {
    let mut resolved: Option<&Package> = None;

    for package in packages.iter().filter(|p| vulnerability.targets(p)) {
        for spec in &vulnerability.affected_version_specs {
            match oracle.is_in_range(spec, &package.version) {
                Ok(true) => {
                    resolved = Some(package);
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        vulnerability = %vulnerability.id,
                        package = %package,
                        spec = %spec,
                        error = %e,
                        "version range check failed, treating as no match"
                    );
                    metrics::counter!(m::ITEM_ERRORS_TOTAL, m::LABEL_PHASE => "evaluate")
                        .increment(1);
                    break;
                }
            }
        }
    }

    vulnerability.package_version_is_in_range = resolved.is_some();
    vulnerability.resolved_package = resolved.cloned();
}
