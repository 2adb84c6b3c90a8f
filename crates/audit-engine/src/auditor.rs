//! Phase orchestrator.
//!
//! [`Auditor`] runs one audit target through its phases:
//!
//! ```text
//! Modules -> Version
//!     |
//!     +-- Packages -> ProfileFilter -> Artifacts -> Vulnerabilities -> Evaluate -> Report
//!     |
//!     +-- Configuration -> DefaultConfigurationRules -> EvaluateConfigurationRules
//!     |
//! Analyzers -> AnalyzerResults
//! ```
//!
//! The two middle paths run concurrently. A phase failure cancels a
//! run-scoped token so the sibling path stops at its next phase boundary;
//! the failing phase's [`PhaseKind`] decides the [`AuditResult`].

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use ironaudit_core::metrics as m;
use ironaudit_core::{
    AnalyzerReport, AnalyzerSource, ApplicationProbe, Artifact, AuditProfile, AuditResult,
    AuditSummary, AuditTarget, ConfigurationRule, ConfigurationTree, DataSource, Package,
    PackageEnumerator, PackageMap, Reporter, RuleOutcome, RuleSource, VersionRangeOracle,
    Vulnerability,
};

use crate::config::AuditorConfig;
use crate::config_rules::ConfigurationRuleEvaluator;
use crate::error::EngineError;
use crate::evaluator::VulnerabilityEvaluator;
use crate::fanout;
use crate::phase::{PhaseError, PhaseKind};
use crate::plan::{Attachments, ExecutionPlan};
use crate::profile::filter_packages;

// ─── Run state ───────────────────────────────────────────────────────

/// Everything one run produced. Replaced wholesale at the start of a run.
#[derive(Default)]
struct RunState {
    run_id: String,
    plan: ExecutionPlan,
    target: Option<AuditTarget>,
    modules: Vec<Package>,
    detected_version: Option<String>,
    packages: Vec<Package>,
    artifacts: PackageMap<Artifact>,
    vulnerabilities: PackageMap<Vulnerability>,
    summary: Option<AuditSummary>,
    configuration: Option<Arc<dyn ConfigurationTree>>,
    configuration_rules: BTreeMap<String, Vec<ConfigurationRule>>,
    rule_outcomes: HashMap<ConfigurationRule, RuleOutcome>,
    disabled_rules: Vec<ConfigurationRule>,
    analyzer_reports: Vec<AnalyzerReport>,
    last_error: Option<PhaseError>,
    result: Option<AuditResult>,
}

#[derive(Default)]
struct PackagePath {
    packages: Vec<Package>,
    artifacts: PackageMap<Artifact>,
    vulnerabilities: PackageMap<Vulnerability>,
    summary: Option<AuditSummary>,
    error: Option<PhaseError>,
}

#[derive(Default)]
struct ConfigurationPath {
    configuration: Option<Arc<dyn ConfigurationTree>>,
    rules: BTreeMap<String, Vec<ConfigurationRule>>,
    outcomes: HashMap<ConfigurationRule, RuleOutcome>,
    disabled_rules: Vec<ConfigurationRule>,
    error: Option<PhaseError>,
}

/// Cancellation check at a phase boundary.
fn checkpoint(
    cancel: &CancellationToken,
    run: &CancellationToken,
    next: PhaseKind,
) -> Result<(), PhaseError> {
    if cancel.is_cancelled() {
        return Err(PhaseError::cancelled(next));
    }
    if run.is_cancelled() {
        return Err(PhaseError::aborted(next));
    }
    debug!(phase = %next, "phase started");
    Ok(())
}

async fn timed<F: Future>(kind: PhaseKind, fut: F) -> F::Output {
    let started = Instant::now();
    let output = fut.await;
    metrics::histogram!(m::PHASE_DURATION_SECONDS, m::LABEL_PHASE => kind.as_str())
        .record(started.elapsed().as_secs_f64());
    output
}

fn missing(kind: PhaseKind, collaborator: &str) -> PhaseError {
    PhaseError::failed(
        kind,
        EngineError::Config {
            field: collaborator.to_owned(),
            reason: "not attached".to_owned(),
        },
    )
}

/// First real failure in state order; an abort only counts when nothing else failed.
fn first_failure(errors: [Option<PhaseError>; 2]) -> Option<PhaseError> {
    let mut aborted = None;
    for err in errors.into_iter().flatten() {
        if err.is_aborted() {
            aborted.get_or_insert(err);
        } else {
            return Some(err);
        }
    }
    aborted
}

// ─── Auditor ─────────────────────────────────────────────────────────

/// Audits one target. Build with [`AuditorBuilder`].
pub struct Auditor {
    config: AuditorConfig,
    target: AuditTarget,
    enumerator: Option<Arc<dyn PackageEnumerator>>,
    sources: Vec<Arc<dyn DataSource>>,
    oracle: Arc<dyn VersionRangeOracle>,
    profile: Option<AuditProfile>,
    probe: Option<Arc<dyn ApplicationProbe>>,
    rule_source: Option<Arc<dyn RuleSource>>,
    analyzer_source: Option<Arc<dyn AnalyzerSource>>,
    reporter: Option<Arc<dyn Reporter>>,
    state: RunState,
}

impl Auditor {
    fn attachments(&self) -> Attachments {
        Attachments {
            enumerator: self.enumerator.is_some(),
            reporter: self.reporter.is_some(),
            analyzers: self.analyzer_source.is_some(),
        }
    }

    /// Runs every planned phase and returns the terminal result.
    ///
    /// `cancel` is checked at each phase boundary; in-flight collaborator
    /// calls are not interrupted.
    pub async fn audit(&mut self, cancel: CancellationToken) -> AuditResult {
        self.state = RunState {
            run_id: Uuid::new_v4().to_string(),
            plan: ExecutionPlan::new(&self.config.flags, self.target.kind, self.attachments()),
            ..RunState::default()
        };

        let span = info_span!("audit", run_id = %self.state.run_id, target = %self.target);
        let result = self.run(cancel).instrument(span).await;

        metrics::counter!(m::AUDIT_RUNS_TOTAL, m::LABEL_RESULT => result.code()).increment(1);
        self.state.result = Some(result);
        result
    }

    async fn run(&mut self, cancel: CancellationToken) -> AuditResult {
        info!(phases = ?self.state.plan.phases(), "audit started");

        match self.run_phases(&cancel).await {
            Ok(()) => {
                info!(
                    packages = self.state.packages.len(),
                    in_range = self.in_range_count(),
                    rules = self.state.rule_outcomes.len(),
                    disabled = self.state.disabled_rules.len(),
                    "audit completed"
                );
                AuditResult::Success
            }
            Err(e) => {
                let result = e.audit_result();
                if result == AuditResult::Cancelled {
                    warn!(phase = %e.kind, "audit cancelled");
                } else {
                    error!(phase = %e.kind, error = %e, result = %result, "audit failed");
                    metrics::counter!(m::PHASE_FAILURES_TOTAL, m::LABEL_PHASE => e.kind.as_str())
                        .increment(1);
                }
                self.state.last_error = Some(e);
                result
            }
        }
    }

    async fn run_phases(&mut self, cancel: &CancellationToken) -> Result<(), PhaseError> {
        let plan = self.state.plan;
        let never = CancellationToken::new();
        let mut target = self.target.clone();

        if plan.scan_modules {
            checkpoint(cancel, &never, PhaseKind::Modules)?;
            let probe = self.probe_for(PhaseKind::Modules)?;
            let modules = timed(PhaseKind::Modules, probe.scan_modules())
                .await
                .map_err(|e| PhaseError::failed(PhaseKind::Modules, e))?;
            info!(count = modules.len(), "modules scanned");
            self.state.modules = modules;
        }

        if plan.scan_version {
            checkpoint(cancel, &never, PhaseKind::Version)?;
            let probe = self.probe_for(PhaseKind::Version)?;
            let version = timed(PhaseKind::Version, probe.scan_version())
                .await
                .map_err(|e| PhaseError::failed(PhaseKind::Version, e))?;
            if version.is_empty() {
                warn!("target version could not be detected");
            } else {
                info!(version = %version, "target version detected");
                if target.version.is_none() {
                    target.version = Some(version.clone());
                }
                self.state.detected_version = Some(version);
            }
        }
        self.state.target = Some(target.clone());

        let run = cancel.child_token();
        let (packages, configuration) = {
            let this = &*self;
            tokio::join!(
                this.package_path(&target, cancel, &run),
                this.configuration_path(&target, cancel, &run),
            )
        };

        self.state.packages = packages.packages;
        self.state.artifacts = packages.artifacts;
        self.state.vulnerabilities = packages.vulnerabilities;
        self.state.summary = packages.summary;
        self.state.configuration = configuration.configuration;
        self.state.configuration_rules = configuration.rules;
        self.state.rule_outcomes = configuration.outcomes;
        self.state.disabled_rules = configuration.disabled_rules;

        if let Some(err) = first_failure([packages.error, configuration.error]) {
            return Err(err);
        }

        if plan.run_analyzers {
            self.run_analyzers(&target, cancel).await?;
        }
        Ok(())
    }

    fn probe_for(&self, kind: PhaseKind) -> Result<Arc<dyn ApplicationProbe>, PhaseError> {
        self.probe.clone().ok_or_else(|| missing(kind, "probe"))
    }

    // ─── Package path ────────────────────────────────────────────────

    async fn package_path(
        &self,
        target: &AuditTarget,
        cancel: &CancellationToken,
        run: &CancellationToken,
    ) -> PackagePath {
        let mut out = PackagePath::default();
        if let Err(e) = self.package_phases(target, cancel, run, &mut out).await {
            run.cancel();
            out.error = Some(e);
        }
        out
    }

    async fn package_phases(
        &self,
        target: &AuditTarget,
        cancel: &CancellationToken,
        run: &CancellationToken,
        out: &mut PackagePath,
    ) -> Result<(), PhaseError> {
        let plan = self.state.plan;
        if !plan.scan_packages {
            return Ok(());
        }

        checkpoint(cancel, run, PhaseKind::Packages)?;
        let enumerator = self
            .enumerator
            .as_ref()
            .ok_or_else(|| missing(PhaseKind::Packages, "enumerator"))?;
        let packages = timed(PhaseKind::Packages, enumerator.get_packages())
            .await
            .map_err(|e| PhaseError::failed(PhaseKind::Packages, e))?;
        info!(count = packages.len(), manager = %enumerator.package_manager(), "packages enumerated");

        checkpoint(cancel, run, PhaseKind::ProfileFilter)?;
        let before = packages.len();
        out.packages = filter_packages(packages, self.profile.as_ref(), self.oracle.as_ref());
        if out.packages.len() != before {
            info!(excluded = before - out.packages.len(), "packages excluded by profile");
        }

        let shared: Arc<[Package]> = Arc::from(out.packages.as_slice());
        let capacity = self.config.fanout_channel_capacity;

        if plan.search_artifacts {
            if shared.is_empty() {
                info!("no packages, skipping artifact search");
            } else {
                checkpoint(cancel, run, PhaseKind::Artifacts)?;
                let outcome = timed(
                    PhaseKind::Artifacts,
                    fanout::search_artifacts(&self.sources, Arc::clone(&shared), capacity),
                )
                .await;
                let err = outcome.error();
                out.artifacts = outcome.merged;
                if let Some(e) = err {
                    return Err(PhaseError::failed(PhaseKind::Artifacts, e));
                }
            }
        }

        if plan.search_vulnerabilities {
            if shared.is_empty() {
                info!("no packages, skipping vulnerability search");
            } else {
                checkpoint(cancel, run, PhaseKind::Vulnerabilities)?;
                let outcome = timed(
                    PhaseKind::Vulnerabilities,
                    fanout::search_vulnerabilities(
                        &self.sources,
                        target,
                        Arc::clone(&shared),
                        capacity,
                    ),
                )
                .await;
                let err = outcome.error();
                out.vulnerabilities = outcome.merged;
                if let Some(e) = err {
                    return Err(PhaseError::failed(PhaseKind::Vulnerabilities, e));
                }
            }
        }

        if plan.evaluate_vulnerabilities {
            checkpoint(cancel, run, PhaseKind::Evaluate)?;
            let evaluator = VulnerabilityEvaluator::new(
                Arc::clone(&self.oracle),
                self.config.evaluation_parallelism,
            );
            let in_range = timed(
                PhaseKind::Evaluate,
                evaluator.evaluate(&out.packages, &mut out.vulnerabilities),
            )
            .await
            .map_err(|e| PhaseError::failed(PhaseKind::Evaluate, e))?;
            info!(in_range, "vulnerabilities evaluated");

            let mut vulnerable: Vec<Vulnerability> = out
                .vulnerabilities
                .values()
                .flatten()
                .filter(|v| v.package_version_is_in_range)
                .cloned()
                .collect();
            vulnerable.sort_by(|a, b| {
                (&a.package_name, &a.id, &a.package_manager).cmp(&(
                    &b.package_name,
                    &b.id,
                    &b.package_manager,
                ))
            });
            // one advisory per package, however many installed versions carried it
            vulnerable.dedup_by(|a, b| {
                a.id == b.id
                    && a.package_manager == b.package_manager
                    && a.package_name == b.package_name
            });
            out.summary = Some(AuditSummary {
                run_id: self.state.run_id.clone(),
                target: target.clone(),
                package_count: out.packages.len(),
                vulnerable,
            });
        }

        if plan.report {
            checkpoint(cancel, run, PhaseKind::Report)?;
            let reporter = self
                .reporter
                .as_ref()
                .ok_or_else(|| missing(PhaseKind::Report, "reporter"))?;
            if let Some(summary) = &out.summary {
                timed(PhaseKind::Report, reporter.report(summary))
                    .await
                    .map_err(|e| PhaseError::failed(PhaseKind::Report, e))?;
                info!(vulnerable = summary.vulnerable.len(), "audit summary reported");
            }
        }

        Ok(())
    }

    // ─── Configuration path ──────────────────────────────────────────

    async fn configuration_path(
        &self,
        target: &AuditTarget,
        cancel: &CancellationToken,
        run: &CancellationToken,
    ) -> ConfigurationPath {
        let mut out = ConfigurationPath::default();
        if let Err(e) = self.configuration_phases(target, cancel, run, &mut out).await {
            run.cancel();
            out.error = Some(e);
        }
        out
    }

    async fn configuration_phases(
        &self,
        target: &AuditTarget,
        cancel: &CancellationToken,
        run: &CancellationToken,
        out: &mut ConfigurationPath,
    ) -> Result<(), PhaseError> {
        let plan = self.state.plan;
        if !plan.scan_configuration {
            return Ok(());
        }

        checkpoint(cancel, run, PhaseKind::Configuration)?;
        let probe = self.probe_for(PhaseKind::Configuration)?;
        let tree = timed(PhaseKind::Configuration, probe.parse_configuration())
            .await
            .map_err(|e| PhaseError::failed(PhaseKind::Configuration, e))?;
        info!("configuration parsed");
        out.configuration = Some(Arc::clone(&tree));

        if !plan.scan_default_rules {
            return Ok(());
        }
        checkpoint(cancel, run, PhaseKind::DefaultConfigurationRules)?;
        let rule_source = self
            .rule_source
            .as_ref()
            .ok_or_else(|| missing(PhaseKind::DefaultConfigurationRules, "rule_source"))?;
        out.rules = timed(
            PhaseKind::DefaultConfigurationRules,
            rule_source.load_rules(target),
        )
        .await
        .map_err(|e| PhaseError::failed(PhaseKind::DefaultConfigurationRules, e))?;
        info!(
            modules = out.rules.len(),
            rules = out.rules.values().map(Vec::len).sum::<usize>(),
            "default configuration rules loaded"
        );

        if !plan.evaluate_rules {
            return Ok(());
        }
        checkpoint(cancel, run, PhaseKind::EvaluateConfigurationRules)?;
        let evaluator = ConfigurationRuleEvaluator::new(Arc::clone(&self.oracle));
        let evaluation = timed(
            PhaseKind::EvaluateConfigurationRules,
            evaluator.evaluate(&out.rules, tree, target),
        )
        .await
        .map_err(|e| PhaseError::failed(PhaseKind::EvaluateConfigurationRules, e))?;
        info!(
            evaluated = evaluation.outcomes.len(),
            disabled = evaluation.disabled_rules.len(),
            "configuration rules evaluated"
        );
        out.outcomes = evaluation.outcomes;
        out.disabled_rules = evaluation.disabled_rules;
        Ok(())
    }

    // ─── Analyzers ───────────────────────────────────────────────────

    async fn run_analyzers(
        &mut self,
        target: &AuditTarget,
        cancel: &CancellationToken,
    ) -> Result<(), PhaseError> {
        let never = CancellationToken::new();

        checkpoint(cancel, &never, PhaseKind::Analyzers)?;
        let source = self
            .analyzer_source
            .clone()
            .ok_or_else(|| missing(PhaseKind::Analyzers, "analyzer_source"))?;
        let analyzers = timed(PhaseKind::Analyzers, source.scan_analyzers(target))
            .await
            .map_err(|e| PhaseError::failed(PhaseKind::Analyzers, e))?;
        info!(count = analyzers.len(), "analyzers found");

        checkpoint(cancel, &never, PhaseKind::AnalyzerResults)?;
        let started = Instant::now();
        let mut handles = Vec::with_capacity(analyzers.len());
        for analyzer in analyzers {
            let target = target.clone();
            let configuration = self.state.configuration.clone();
            handles.push(tokio::spawn(async move {
                analyzer.run(&target, configuration.as_deref()).await
            }));
        }

        let mut failure = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(report)) => {
                    debug!(analyzer = %report.analyzer, findings = report.findings.len(), "analyzer finished");
                    self.state.analyzer_reports.push(report);
                }
                Ok(Err(e)) => {
                    failure.get_or_insert(PhaseError::failed(PhaseKind::AnalyzerResults, e));
                }
                Err(e) => {
                    failure.get_or_insert(PhaseError::failed(
                        PhaseKind::AnalyzerResults,
                        EngineError::from(e),
                    ));
                }
            }
        }
        metrics::histogram!(m::PHASE_DURATION_SECONDS,
            m::LABEL_PHASE => PhaseKind::AnalyzerResults.as_str())
        .record(started.elapsed().as_secs_f64());

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ─── Snapshots ───────────────────────────────────────────────────

    fn in_range_count(&self) -> usize {
        self.state
            .vulnerabilities
            .values()
            .flatten()
            .filter(|v| v.package_version_is_in_range)
            .count()
    }

    /// The target as configured.
    pub fn target(&self) -> &AuditTarget {
        &self.target
    }

    /// The target of the last run, including a detected version.
    pub fn effective_target(&self) -> Option<&AuditTarget> {
        self.state.target.as_ref()
    }

    pub fn run_id(&self) -> &str {
        &self.state.run_id
    }

    /// Plan of the last run, or the plan the next run would use.
    pub fn plan(&self) -> ExecutionPlan {
        if self.state.run_id.is_empty() {
            ExecutionPlan::new(&self.config.flags, self.target.kind, self.attachments())
        } else {
            self.state.plan
        }
    }

    pub fn result(&self) -> Option<AuditResult> {
        self.state.result
    }

    pub fn last_error(&self) -> Option<&PhaseError> {
        self.state.last_error.as_ref()
    }

    pub fn modules(&self) -> &[Package] {
        &self.state.modules
    }

    pub fn detected_version(&self) -> Option<&str> {
        self.state.detected_version.as_deref()
    }

    /// Packages left after the profile filter.
    pub fn packages(&self) -> &[Package] {
        &self.state.packages
    }

    pub fn artifacts(&self) -> &PackageMap<Artifact> {
        &self.state.artifacts
    }

    pub fn vulnerabilities(&self) -> &PackageMap<Vulnerability> {
        &self.state.vulnerabilities
    }

    pub fn summary(&self) -> Option<&AuditSummary> {
        self.state.summary.as_ref()
    }

    pub fn configuration(&self) -> Option<&dyn ConfigurationTree> {
        self.state.configuration.as_deref()
    }

    pub fn configuration_rules(&self) -> &BTreeMap<String, Vec<ConfigurationRule>> {
        &self.state.configuration_rules
    }

    pub fn configuration_rule_outcomes(&self) -> &HashMap<ConfigurationRule, RuleOutcome> {
        &self.state.rule_outcomes
    }

    pub fn disabled_rules(&self) -> &[ConfigurationRule] {
        &self.state.disabled_rules
    }

    pub fn analyzer_reports(&self) -> &[AnalyzerReport] {
        &self.state.analyzer_reports
    }
}

// ─── Builder ─────────────────────────────────────────────────────────

/// Builder for [`Auditor`].
///
/// A version range oracle is always required. Server and application
/// targets also need a probe, and a rule source whenever the plan loads
/// default rules.
pub struct AuditorBuilder {
    target: AuditTarget,
    config: AuditorConfig,
    enumerator: Option<Arc<dyn PackageEnumerator>>,
    sources: Vec<Arc<dyn DataSource>>,
    oracle: Option<Arc<dyn VersionRangeOracle>>,
    profile: Option<AuditProfile>,
    probe: Option<Arc<dyn ApplicationProbe>>,
    rule_source: Option<Arc<dyn RuleSource>>,
    analyzer_source: Option<Arc<dyn AnalyzerSource>>,
    reporter: Option<Arc<dyn Reporter>>,
}

impl AuditorBuilder {
    pub fn new(target: AuditTarget) -> Self {
        Self {
            target,
            config: AuditorConfig::default(),
            enumerator: None,
            sources: Vec::new(),
            oracle: None,
            profile: None,
            probe: None,
            rule_source: None,
            analyzer_source: None,
            reporter: None,
        }
    }

    pub fn config(mut self, config: AuditorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn enumerator(mut self, enumerator: Arc<dyn PackageEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    pub fn data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn data_sources(mut self, sources: impl IntoIterator<Item = Arc<dyn DataSource>>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn VersionRangeOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn profile(mut self, profile: AuditProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ApplicationProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn rule_source(mut self, source: Arc<dyn RuleSource>) -> Self {
        self.rule_source = Some(source);
        self
    }

    pub fn analyzer_source(mut self, source: Arc<dyn AnalyzerSource>) -> Self {
        self.analyzer_source = Some(source);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> Result<Auditor, EngineError> {
        self.config.validate()?;

        let oracle = self.oracle.ok_or_else(|| EngineError::Config {
            field: "oracle".to_owned(),
            reason: "a version range oracle is required".to_owned(),
        })?;

        let plan = ExecutionPlan::new(
            &self.config.flags,
            self.target.kind,
            Attachments {
                enumerator: self.enumerator.is_some(),
                reporter: self.reporter.is_some(),
                analyzers: self.analyzer_source.is_some(),
            },
        );
        if (plan.scan_modules || plan.scan_configuration) && self.probe.is_none() {
            return Err(EngineError::Config {
                field: "probe".to_owned(),
                reason: format!("{} targets need an application probe", self.target.kind),
            });
        }
        if plan.scan_default_rules && self.rule_source.is_none() {
            return Err(EngineError::Config {
                field: "rule_source".to_owned(),
                reason: "default configuration rules are planned but no rule source is attached"
                    .to_owned(),
            });
        }

        Ok(Auditor {
            config: self.config,
            target: self.target,
            enumerator: self.enumerator,
            sources: self.sources,
            oracle,
            profile: self.profile,
            probe: self.probe,
            rule_source: self.rule_source,
            analyzer_source: self.analyzer_source,
            reporter: self.reporter,
            state: RunState::default(),
        })
    }
}
