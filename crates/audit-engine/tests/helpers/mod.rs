//! Mock collaborators shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ironaudit_core::{
    Analyzer, AnalyzerError, AnalyzerReport, AnalyzerSource, ApplicationProbe, Artifact,
    AuditSummary, AuditTarget, BoxFuture, ConfigurationError, ConfigurationRule,
    ConfigurationTree, DataSource, EnumerationError, Package, PackageEnumerator, PackageMap,
    ProbeError, ReportError, Reporter, RuleError, RuleSource, SourceError, VersionRangeError,
    VersionRangeOracle, Vulnerability, XPathOutcome,
};

pub fn npm(name: &str, version: &str) -> Package {
    Package::new("npm", name, version)
}

pub fn vuln(id: &str, name: &str, specs: &[&str]) -> Vulnerability {
    Vulnerability::new(id, "npm", name, specs.iter().map(|s| s.to_string()).collect())
}

// ─── Data source ─────────────────────────────────────────────────────

pub struct MockSource {
    name: String,
    initialised: bool,
    eligible: bool,
    fail: bool,
    delay: Option<Duration>,
    artifacts: PackageMap<Artifact>,
    vulnerabilities: PackageMap<Vulnerability>,
    pub queried: Arc<AtomicBool>,
}

impl MockSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            initialised: true,
            eligible: true,
            fail: false,
            delay: None,
            artifacts: PackageMap::new(),
            vulnerabilities: PackageMap::new(),
            queried: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_vulnerability(mut self, package: Package, vulnerability: Vulnerability) -> Self {
        self.vulnerabilities
            .entry(package)
            .or_default()
            .push(vulnerability);
        self
    }

    pub fn with_artifact(mut self, package: Package, artifact_id: &str) -> Self {
        let mut artifact = Artifact::new(artifact_id, &package.name);
        artifact.matched_package = Some(package.clone());
        self.artifacts.entry(package).or_default().push(artifact);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn ineligible(mut self) -> Self {
        self.eligible = false;
        self
    }

    pub fn uninitialised(mut self) -> Self {
        self.initialised = false;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn into_arc(self) -> (Arc<dyn DataSource>, Arc<AtomicBool>) {
        let queried = Arc::clone(&self.queried);
        (Arc::new(self), queried)
    }

    async fn respond<T: Clone>(&self, map: &PackageMap<T>) -> Result<PackageMap<T>, SourceError> {
        self.queried.store(true, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(SourceError::Query {
                source_name: self.name.clone(),
                reason: "connection refused".to_owned(),
            });
        }
        Ok(map.clone())
    }
}

impl DataSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_initialised(&self) -> bool {
        self.initialised
    }

    fn is_eligible_for_target(&self, _target: &AuditTarget) -> bool {
        self.eligible
    }

    fn search_artifacts<'a>(
        &'a self,
        _packages: &'a [Package],
    ) -> BoxFuture<'a, Result<PackageMap<Artifact>, SourceError>> {
        Box::pin(self.respond(&self.artifacts))
    }

    fn search_vulnerabilities<'a>(
        &'a self,
        _packages: &'a [Package],
    ) -> BoxFuture<'a, Result<PackageMap<Vulnerability>, SourceError>> {
        Box::pin(self.respond(&self.vulnerabilities))
    }
}

// ─── Oracles ─────────────────────────────────────────────────────────

type OracleFn = dyn Fn(&str, &str) -> Result<bool, VersionRangeError> + Send + Sync;

/// Oracle backed by a closure.
pub struct FnOracle(Box<OracleFn>);

impl FnOracle {
    pub fn new(
        f: impl Fn(&str, &str) -> Result<bool, VersionRangeError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self(Box::new(f)))
    }

    pub fn always(answer: bool) -> Arc<Self> {
        Self::new(move |_, _| Ok(answer))
    }
}

impl VersionRangeOracle for FnOracle {
    fn is_in_range(&self, spec: &str, installed: &str) -> Result<bool, VersionRangeError> {
        (self.0)(spec, installed)
    }
}

fn parse_dotted(s: &str) -> Option<Vec<u64>> {
    s.split('.').map(|part| part.parse().ok()).collect()
}

/// Understands `<X`, `<=X`, `>=X`, `=X` over dotted numeric versions.
pub struct ComparatorOracle;

impl VersionRangeOracle for ComparatorOracle {
    fn is_in_range(&self, spec: &str, installed: &str) -> Result<bool, VersionRangeError> {
        let invalid_range = || VersionRangeError::InvalidRange {
            spec: spec.to_owned(),
            reason: "unsupported comparator".to_owned(),
        };
        let (op, bound) = ["<=", ">=", "<", "="]
            .iter()
            .find_map(|op| spec.strip_prefix(op).map(|rest| (*op, rest)))
            .ok_or_else(invalid_range)?;
        let bound = parse_dotted(bound.trim()).ok_or_else(invalid_range)?;
        let installed =
            parse_dotted(installed).ok_or_else(|| VersionRangeError::InvalidVersion {
                version: installed.to_owned(),
                reason: "not dotted numeric".to_owned(),
            })?;
        Ok(match op {
            "<=" => installed <= bound,
            ">=" => installed >= bound,
            "<" => installed < bound,
            _ => installed == bound,
        })
    }
}

// ─── Enumerator ──────────────────────────────────────────────────────

pub struct MockEnumerator {
    packages: Vec<Package>,
    fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl MockEnumerator {
    pub fn new(packages: Vec<Package>) -> Self {
        Self {
            packages,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            packages: Vec::new(),
            fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PackageEnumerator for MockEnumerator {
    fn package_manager(&self) -> &str {
        "npm"
    }

    fn get_packages(&self) -> BoxFuture<'_, Result<Vec<Package>, EnumerationError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EnumerationError::Failed("npm ls exited with 1".to_owned()));
            }
            Ok(self.packages.clone())
        })
    }
}

// ─── Configuration ───────────────────────────────────────────────────

/// Answers queries from a fixed table; queries starting with `!` error.
#[derive(Default)]
pub struct MockTree {
    answers: HashMap<String, XPathOutcome>,
}

impl MockTree {
    pub fn with(mut self, query: &str, matched: bool, nodes: &[&str]) -> Self {
        self.answers.insert(
            query.to_owned(),
            XPathOutcome {
                matched,
                nodes: nodes.iter().map(|s| s.to_string()).collect(),
                message: format!("{query} evaluated"),
            },
        );
        self
    }
}

impl ConfigurationTree for MockTree {
    fn xpath_evaluate(&self, query: &str) -> Result<XPathOutcome, ConfigurationError> {
        if query.starts_with('!') {
            return Err(ConfigurationError::InvalidQuery {
                query: query.to_owned(),
                reason: "malformed expression".to_owned(),
            });
        }
        Ok(self.answers.get(query).cloned().unwrap_or_default())
    }

    fn render(&self) -> String {
        format!("{} known queries", self.answers.len())
    }
}

pub struct MockProbe {
    pub modules: Vec<Package>,
    pub version: String,
    pub tree: Arc<dyn ConfigurationTree>,
    pub fail_modules: bool,
    pub fail_configuration: bool,
}

impl MockProbe {
    pub fn new(version: &str, tree: MockTree) -> Self {
        Self {
            modules: vec![Package::new("module", "http_ssl", "1.0")],
            version: version.to_owned(),
            tree: Arc::new(tree),
            fail_modules: false,
            fail_configuration: false,
        }
    }
}

impl ApplicationProbe for MockProbe {
    fn scan_modules(&self) -> BoxFuture<'_, Result<Vec<Package>, ProbeError>> {
        Box::pin(async move {
            if self.fail_modules {
                return Err(ProbeError::Modules("module listing failed".to_owned()));
            }
            Ok(self.modules.clone())
        })
    }

    fn scan_version(&self) -> BoxFuture<'_, Result<String, ProbeError>> {
        Box::pin(async move { Ok(self.version.clone()) })
    }

    fn parse_configuration(
        &self,
    ) -> BoxFuture<'_, Result<Arc<dyn ConfigurationTree>, ConfigurationError>> {
        Box::pin(async move {
            if self.fail_configuration {
                return Err(ConfigurationError::Parse {
                    path: "/etc/app/app.json".to_owned(),
                    reason: "unexpected token".to_owned(),
                });
            }
            Ok(Arc::clone(&self.tree))
        })
    }
}

pub struct MockRuleSource {
    rules: BTreeMap<String, Vec<ConfigurationRule>>,
    fail: bool,
}

impl MockRuleSource {
    pub fn new(rules: Vec<ConfigurationRule>) -> Self {
        let mut grouped: BTreeMap<String, Vec<ConfigurationRule>> = BTreeMap::new();
        for rule in rules {
            grouped.entry(rule.module_name.clone()).or_default().push(rule);
        }
        Self {
            rules: grouped,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            rules: BTreeMap::new(),
            fail: true,
        }
    }
}

impl RuleSource for MockRuleSource {
    fn load_rules<'a>(
        &'a self,
        _target: &'a AuditTarget,
    ) -> BoxFuture<'a, Result<BTreeMap<String, Vec<ConfigurationRule>>, RuleError>> {
        Box::pin(async move {
            if self.fail {
                return Err(RuleError::NotFound {
                    path: "/etc/ironaudit/rules".to_owned(),
                });
            }
            Ok(self.rules.clone())
        })
    }
}

// ─── Analyzers ───────────────────────────────────────────────────────

pub struct MockAnalyzer {
    pub name: String,
    pub fail: bool,
}

impl Analyzer for MockAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        target: &'a AuditTarget,
        configuration: Option<&'a dyn ConfigurationTree>,
    ) -> BoxFuture<'a, Result<AnalyzerReport, AnalyzerError>> {
        Box::pin(async move {
            if self.fail {
                return Err(AnalyzerError::Run {
                    name: self.name.clone(),
                    reason: "script crashed".to_owned(),
                });
            }
            let mut findings = vec![format!("checked {}", target.name)];
            if let Some(tree) = configuration {
                findings.push(tree.render());
            }
            Ok(AnalyzerReport {
                analyzer: self.name.clone(),
                findings,
            })
        })
    }
}

pub struct MockAnalyzerSource {
    pub analyzers: Vec<Arc<dyn Analyzer>>,
    pub fail: bool,
    pub scanned: Arc<AtomicBool>,
}

impl MockAnalyzerSource {
    pub fn new(names: &[(&str, bool)]) -> Self {
        Self {
            analyzers: names
                .iter()
                .map(|(name, fail)| {
                    Arc::new(MockAnalyzer {
                        name: name.to_string(),
                        fail: *fail,
                    }) as Arc<dyn Analyzer>
                })
                .collect(),
            fail: false,
            scanned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl AnalyzerSource for MockAnalyzerSource {
    fn scan_analyzers<'a>(
        &'a self,
        _target: &'a AuditTarget,
    ) -> BoxFuture<'a, Result<Vec<Arc<dyn Analyzer>>, AnalyzerError>> {
        Box::pin(async move {
            self.scanned.store(true, Ordering::SeqCst);
            if self.fail {
                return Err(AnalyzerError::Scan("analyzer directory unreadable".to_owned()));
            }
            Ok(self.analyzers.clone())
        })
    }
}

// ─── Reporter ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockReporter {
    pub reports: Arc<Mutex<Vec<AuditSummary>>>,
    pub fail: bool,
}

impl Reporter for MockReporter {
    fn report<'a>(&'a self, summary: &'a AuditSummary) -> BoxFuture<'a, Result<(), ReportError>> {
        Box::pin(async move {
            if self.fail {
                return Err(ReportError::Delivery("issue tracker returned 503".to_owned()));
            }
            self.reports
                .lock()
                .map_err(|e| ReportError::Delivery(e.to_string()))?
                .push(summary.clone());
            Ok(())
        })
    }
}
