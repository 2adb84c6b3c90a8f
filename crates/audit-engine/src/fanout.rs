//! Data source fan-out.
//!
//! One task per source, one channel of per-source batches, one aggregator.
//! The aggregator is the only place results are merged, so no lock guards
//! the merged map and merging never spans a source's I/O.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ironaudit_core::metrics as m;
use ironaudit_core::{
    Artifact, AuditTarget, BoxFuture, DataSource, Package, PackageMap, SourceError, Vulnerability,
};

use crate::error::EngineError;

/// Query run against each source.
pub type QueryFn<T> = for<'a> fn(
    &'a dyn DataSource,
    &'a [Package],
) -> BoxFuture<'a, Result<PackageMap<T>, SourceError>>;

pub fn artifacts_query<'a>(
    source: &'a dyn DataSource,
    packages: &'a [Package],
) -> BoxFuture<'a, Result<PackageMap<Artifact>, SourceError>> {
    source.search_artifacts(packages)
}

pub fn vulnerabilities_query<'a>(
    source: &'a dyn DataSource,
    packages: &'a [Package],
) -> BoxFuture<'a, Result<PackageMap<Vulnerability>, SourceError>> {
    source.search_vulnerabilities(packages)
}

/// One source's completed query.
struct SourceBatch<T> {
    source: String,
    result: Result<PackageMap<T>, SourceError>,
}

/// Merged results plus every source failure of one fan-out.
#[derive(Debug)]
pub struct FanOutOutcome<T> {
    /// Union of every successful batch, kept even when other sources failed.
    pub merged: PackageMap<T>,
    pub failures: Vec<SourceError>,
    /// Number of sources queried.
    pub queried: usize,
}

impl<T> FanOutOutcome<T> {
    fn empty() -> Self {
        Self {
            merged: PackageMap::new(),
            failures: Vec::new(),
            queried: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Phase error for this fan-out, if any source failed.
    pub fn error(&self) -> Option<EngineError> {
        (!self.failures.is_empty())
            .then(|| EngineError::from_source_failures(&self.failures, self.queried))
    }
}

fn merge<T>(into: &mut PackageMap<T>, batch: PackageMap<T>) {
    for (package, items) in batch {
        into.entry(package).or_default().extend(items);
    }
}

/// Runs `query` against every source concurrently and merges the batches.
pub async fn fan_out<T: Send + 'static>(
    sources: &[Arc<dyn DataSource>],
    packages: Arc<[Package]>,
    query: QueryFn<T>,
    channel_capacity: usize,
) -> FanOutOutcome<T> {
    let mut outcome = FanOutOutcome::empty();
    if sources.is_empty() {
        return outcome;
    }
    outcome.queried = sources.len();

    let (tx, mut rx) = mpsc::channel::<SourceBatch<T>>(channel_capacity.max(1));
    let mut handles = Vec::with_capacity(sources.len());

    for source in sources {
        let source = Arc::clone(source);
        let packages = Arc::clone(&packages);
        let tx = tx.clone();
        let name = source.name().to_owned();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = query(&*source, &packages).await;
            debug!(
                source = %source.name(),
                ok = result.is_ok(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "data source query finished"
            );
            let batch = SourceBatch {
                source: source.name().to_owned(),
                result,
            };
            // receiver lives until every handle is joined
            let _ = tx.send(batch).await;
        });
        handles.push((name, handle));
    }
    drop(tx);

    while let Some(batch) = rx.recv().await {
        match batch.result {
            Ok(map) => {
                metrics::counter!(m::SOURCE_QUERIES_TOTAL,
                    m::LABEL_SOURCE => batch.source.clone(),
                    m::LABEL_RESULT => "ok")
                .increment(1);
                debug!(source = %batch.source, packages = map.len(), "merging batch");
                merge(&mut outcome.merged, map);
            }
            Err(e) => {
                metrics::counter!(m::SOURCE_QUERIES_TOTAL,
                    m::LABEL_SOURCE => batch.source.clone(),
                    m::LABEL_RESULT => "error")
                .increment(1);
                warn!(source = %batch.source, error = %e, "data source query failed");
                outcome.failures.push(e);
            }
        }
    }

    for (name, handle) in handles {
        if let Err(e) = handle.await {
            warn!(source = %name, error = %e, "data source task aborted");
            outcome.failures.push(SourceError::TaskAborted {
                source_name: name,
                reason: e.to_string(),
            });
        }
    }

    outcome
}

/// Artifact acquisition: every attached source is queried.
pub async fn search_artifacts(
    sources: &[Arc<dyn DataSource>],
    packages: Arc<[Package]>,
    channel_capacity: usize,
) -> FanOutOutcome<Artifact> {
    let outcome = fan_out(sources, packages, artifacts_query, channel_capacity).await;
    info!(
        sources = outcome.queried,
        failed = outcome.failures.len(),
        packages = outcome.merged.len(),
        "artifact search finished"
    );
    outcome
}

/// Vulnerability acquisition over initialised sources eligible for `target`.
///
/// No eligible source is not an error: a warning is logged and the
/// outcome is empty.
pub async fn search_vulnerabilities(
    sources: &[Arc<dyn DataSource>],
    target: &AuditTarget,
    packages: Arc<[Package]>,
    channel_capacity: usize,
) -> FanOutOutcome<Vulnerability> {
    let eligible: Vec<Arc<dyn DataSource>> = sources
        .iter()
        .filter(|s| s.is_initialised() && s.is_eligible_for_target(target))
        .cloned()
        .collect();

    if eligible.is_empty() {
        warn!(
            target = %target,
            attached = sources.len(),
            "no eligible vulnerability data sources, skipping vulnerability search"
        );
        return FanOutOutcome::empty();
    }

    let outcome = fan_out(&eligible, packages, vulnerabilities_query, channel_capacity).await;
    info!(
        sources = outcome.queried,
        failed = outcome.failures.len(),
        packages = outcome.merged.len(),
        vulnerabilities = outcome.merged.values().map(Vec::len).sum::<usize>(),
        "vulnerability search finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        name: &'static str,
        vulns: Vec<(Package, Vulnerability)>,
        fail: bool,
        eligible: bool,
    }

    impl DataSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn is_initialised(&self) -> bool {
            true
        }

        fn is_eligible_for_target(&self, _target: &AuditTarget) -> bool {
            self.eligible
        }

        fn search_artifacts<'a>(
            &'a self,
            _packages: &'a [Package],
        ) -> BoxFuture<'a, Result<PackageMap<Artifact>, SourceError>> {
            Box::pin(async { Ok(PackageMap::new()) })
        }

        fn search_vulnerabilities<'a>(
            &'a self,
            _packages: &'a [Package],
        ) -> BoxFuture<'a, Result<PackageMap<Vulnerability>, SourceError>> {
            Box::pin(async move {
                if self.fail {
                    return Err(SourceError::Query {
                        source_name: self.name.to_owned(),
                        reason: "unreachable".to_owned(),
                    });
                }
                let mut map = PackageMap::new();
                for (p, v) in &self.vulns {
                    map.entry(p.clone()).or_insert_with(Vec::new).push(v.clone());
                }
                Ok(map)
            })
        }
    }

    fn pkg(name: &str) -> Package {
        Package::new("npm", name, "1.0.0")
    }

    fn vuln(id: &str, name: &str) -> Vulnerability {
        Vulnerability::new(id, "npm", name, vec!["<2.0.0".to_owned()])
    }

    fn source(name: &'static str, vulns: Vec<(Package, Vulnerability)>) -> Arc<dyn DataSource> {
        Arc::new(FixedSource {
            name,
            vulns,
            fail: false,
            eligible: true,
        })
    }

    #[tokio::test]
    async fn merges_overlapping_keys_by_extending() {
        let a = source("a", vec![(pkg("x"), vuln("V-1", "x"))]);
        let b = source("b", vec![(pkg("x"), vuln("V-2", "x"))]);
        let target = AuditTarget::packages("npm");
        let outcome =
            search_vulnerabilities(&[a, b], &target, Arc::from(vec![pkg("x")]), 4).await;
        assert!(outcome.is_success());
        let mut ids: Vec<_> = outcome.merged[&pkg("x")].iter().map(|v| v.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["V-1", "V-2"]);
    }

    #[tokio::test]
    async fn failure_keeps_other_batches() {
        let good = source("good", vec![(pkg("x"), vuln("V-1", "x"))]);
        let bad: Arc<dyn DataSource> = Arc::new(FixedSource {
            name: "bad",
            vulns: Vec::new(),
            fail: true,
            eligible: true,
        });
        let target = AuditTarget::packages("npm");
        let outcome =
            search_vulnerabilities(&[good, bad], &target, Arc::from(vec![pkg("x")]), 1).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.merged.len(), 1);
        let err = outcome.error().unwrap();
        assert!(err.to_string().contains("1 of 2"));
    }

    #[tokio::test]
    async fn no_eligible_source_is_empty_success() {
        let ineligible: Arc<dyn DataSource> = Arc::new(FixedSource {
            name: "other",
            vulns: vec![(pkg("x"), vuln("V-1", "x"))],
            fail: false,
            eligible: false,
        });
        let target = AuditTarget::packages("npm");
        let outcome =
            search_vulnerabilities(&[ineligible], &target, Arc::from(vec![pkg("x")]), 4).await;
        assert!(outcome.is_success());
        assert!(outcome.merged.is_empty());
        assert_eq!(outcome.queried, 0);
    }
}
