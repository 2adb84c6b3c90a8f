//! `ironaudit audit` command handler

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ironaudit_core::{AuditResult, IronauditConfig, PackageEnumerator};
use ironaudit_engine::{
    Attachments, Auditor, AuditorBuilder, AuditorConfig, ExecutionPlan, ProfileLoader, RuleLoader,
};
use ironaudit_sources::{
    JsonFileReporter, LocalVulnDb, LockfileEnumerator, SemverRangeOracle, StaticProbe,
    parse_module_specs,
};

use crate::cli::AuditArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `audit` command.
///
/// The report is rendered even when the run fails, so partial results stay
/// visible. A failed run maps to the result's exit code; a successful run
/// with vulnerable packages exits with 4.
pub async fn execute(
    args: AuditArgs,
    mut config: IronauditConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    apply_overrides(&mut config, &args);
    let enumerator = open_enumerator(&mut config)?;
    config.validate()?;

    let mut auditor = build_auditor(&config, enumerator).await?;
    info!(target = %auditor.target(), "starting audit");

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling audit");
                cancel.cancel();
            }
        }
    });
    let result = auditor.audit(cancel).await;
    interrupt.abort();

    let report = AuditReport::from_auditor(&auditor, ReportView::from_config(&config), result);
    writer.render(&report)?;

    if !result.is_success() {
        return Err(CliError::Audit {
            result,
            message: report.error.unwrap_or_default(),
        });
    }
    if !report.vulnerabilities.is_empty() {
        return Err(CliError::Vulnerable(report.vulnerabilities.len()));
    }
    Ok(())
}

/// Layer command line options over the loaded settings.
///
/// Flags only switch modes on; a flag left off keeps the settings value.
pub fn apply_overrides(config: &mut IronauditConfig, args: &AuditArgs) {
    fn set_path(target: &mut String, value: &Option<PathBuf>) {
        if let Some(path) = value {
            *target = path.display().to_string();
        }
    }

    set_path(&mut config.audit.lockfile, &args.lockfile);
    set_path(&mut config.audit.vuln_db_dir, &args.vuln_db);
    set_path(&mut config.audit.profile, &args.profile);
    set_path(&mut config.audit.rules_dir, &args.rules_dir);
    set_path(&mut config.audit.report_file, &args.report);
    set_path(&mut config.target.config_file, &args.config_file);

    if let Some(manager) = &args.package_manager {
        config.audit.package_manager = manager.clone();
    }
    if let Some(kind) = args.kind {
        config.target.kind = kind.as_str().to_owned();
    }
    if let Some(name) = &args.name {
        config.target.name = name.clone();
    }
    if let Some(version) = &args.target_version {
        config.target.version = version.clone();
    }
    if !args.modules.is_empty() {
        config.target.modules = args.modules.clone();
    }

    config.target.app_development_mode |= args.app_development_mode;
    config.flags.list_packages |= args.list_packages;
    config.flags.list_artifacts |= args.list_artifacts;
    config.flags.skip_packages_audit |= args.skip_packages_audit;
    config.flags.print_configuration |= args.print_configuration;
    config.flags.only_local_rules |= args.only_local_rules;
    config.flags.list_configuration_rules |= args.list_configuration_rules;
}

/// Opens the configured lockfile. Its format decides the package manager.
fn open_enumerator(config: &mut IronauditConfig) -> Result<Option<LockfileEnumerator>, CliError> {
    if config.audit.lockfile.is_empty() {
        return Ok(None);
    }

    let enumerator = LockfileEnumerator::detect(&config.audit.lockfile)?;
    let detected = enumerator.package_manager();
    if detected != config.audit.package_manager {
        warn!(
            configured = %config.audit.package_manager,
            detected,
            lockfile = %config.audit.lockfile,
            "package manager does not match the lockfile, using the lockfile's"
        );
        config.audit.package_manager = detected.to_owned();
    }
    Ok(Some(enumerator))
}

async fn build_auditor(
    config: &IronauditConfig,
    enumerator: Option<LockfileEnumerator>,
) -> Result<Auditor, CliError> {
    let target = config.audit_target()?;
    let auditor_config = AuditorConfig::from_core(config);
    let reporting = !config.audit.report_file.is_empty();

    let plan = ExecutionPlan::new(
        &auditor_config.flags,
        target.kind,
        Attachments {
            enumerator: enumerator.is_some(),
            reporter: reporting,
            analyzers: false,
        },
    );

    let mut builder = AuditorBuilder::new(target.clone())
        .config(auditor_config)
        .oracle(Arc::new(SemverRangeOracle));

    if let Some(enumerator) = enumerator {
        builder = builder.enumerator(Arc::new(enumerator));
    }

    if (plan.search_artifacts || plan.search_vulnerabilities) && !config.audit.vuln_db_dir.is_empty()
    {
        let db = LocalVulnDb::open(&config.audit.vuln_db_dir)
            .await
            .map_err(|e| CliError::Command(format!("failed to load vulnerability database: {e}")))?;
        builder = builder.data_source(Arc::new(db));
    }

    if !config.audit.profile.is_empty() {
        builder = builder.profile(ProfileLoader::load(&config.audit.profile).await?);
    }

    if target.kind.has_configuration() {
        let modules = parse_module_specs(&target.name, &config.target.modules)?;
        let config_file =
            (!config.target.config_file.is_empty()).then(|| PathBuf::from(&config.target.config_file));
        builder = builder
            .probe(Arc::new(StaticProbe::new(config_file).with_modules(modules)))
            .rule_source(Arc::new(RuleLoader::new(
                &config.audit.rules_dir,
                config.audit.max_rule_files,
            )));
    }

    if reporting {
        builder = builder.reporter(Arc::new(JsonFileReporter::new(&config.audit.report_file)));
    }

    Ok(builder.build()?)
}

// ---- report ----

/// Which part of a run the report shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportView {
    Packages,
    Artifacts,
    Configuration,
    Rules,
    Full,
}

impl ReportView {
    pub fn from_config(config: &IronauditConfig) -> Self {
        let flags = &config.flags;
        if flags.list_packages {
            Self::Packages
        } else if flags.list_artifacts {
            Self::Artifacts
        } else if flags.print_configuration {
            Self::Configuration
        } else if flags.list_configuration_rules {
            Self::Rules
        } else {
            Self::Full
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub run_id: String,
    pub target: String,
    pub view: ReportView,
    pub result: AuditResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub modules: Vec<PackageEntry>,
    pub package_count: usize,
    /// Filled in the package and artifact listing views only.
    pub packages: Vec<PackageEntry>,
    pub artifacts: Vec<ArtifactEntry>,
    pub vulnerabilities: Vec<VulnerabilityEntry>,
    pub rules: Vec<RuleEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PackageEntry {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactEntry {
    pub artifact_id: String,
    pub package: String,
}

#[derive(Debug, Serialize)]
pub struct VulnerabilityEntry {
    pub id: String,
    pub package: String,
    pub installed_version: String,
    pub severity: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    pub affected: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RuleEntry {
    pub module: String,
    pub title: String,
    pub status: RuleStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Matched,
    NotMatched,
    Disabled,
    /// Loaded but not evaluated (listing mode, or no query).
    Listed,
}

impl RuleStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::NotMatched => "not matched",
            Self::Disabled => "disabled",
            Self::Listed => "listed",
        }
    }
}

impl AuditReport {
    /// Snapshot the state of a finished run.
    pub fn from_auditor(auditor: &Auditor, view: ReportView, result: AuditResult) -> Self {
        let target = auditor.effective_target().unwrap_or(auditor.target());

        let packages = if matches!(view, ReportView::Packages | ReportView::Artifacts) {
            auditor.packages().iter().map(PackageEntry::from).collect()
        } else {
            Vec::new()
        };

        let mut artifacts: Vec<ArtifactEntry> = auditor
            .artifacts()
            .iter()
            .flat_map(|(package, found)| {
                found.iter().map(move |artifact| ArtifactEntry {
                    artifact_id: artifact.artifact_id.clone(),
                    package: package.to_string(),
                })
            })
            .collect();
        artifacts.sort_by(|a, b| a.artifact_id.cmp(&b.artifact_id));

        let vulnerabilities = auditor
            .summary()
            .map(|summary| {
                summary
                    .vulnerable
                    .iter()
                    .map(|v| VulnerabilityEntry {
                        id: v.id.clone(),
                        package: v.package_name.clone(),
                        installed_version: v
                            .resolved_package
                            .as_ref()
                            .map(|p| p.version.clone())
                            .unwrap_or_default(),
                        severity: v.severity.map(|s| s.to_string()).unwrap_or_default(),
                        title: v.title.clone(),
                        cve: v.cve.clone(),
                        affected: v.affected_version_specs.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let outcomes = auditor.configuration_rule_outcomes();
        let disabled = auditor.disabled_rules();
        let rules = auditor
            .configuration_rules()
            .iter()
            .flat_map(|(module, rules)| rules.iter().map(move |rule| (module, rule)))
            .map(|(module, rule)| {
                let outcome = outcomes.get(rule);
                let status = if disabled.contains(rule) {
                    RuleStatus::Disabled
                } else {
                    match outcome {
                        Some(o) if o.matched => RuleStatus::Matched,
                        Some(_) => RuleStatus::NotMatched,
                        None => RuleStatus::Listed,
                    }
                };
                RuleEntry {
                    module: module.clone(),
                    title: rule.title.clone(),
                    status,
                    message: outcome.map(|o| o.message.clone()).unwrap_or_default(),
                }
            })
            .collect();

        Self {
            run_id: auditor.run_id().to_owned(),
            target: target.to_string(),
            view,
            result,
            error: auditor.last_error().map(|e| e.to_string()),
            version: target
                .version
                .clone()
                .or_else(|| auditor.detected_version().map(str::to_owned)),
            modules: auditor.modules().iter().map(PackageEntry::from).collect(),
            package_count: auditor.packages().len(),
            packages,
            artifacts,
            vulnerabilities,
            rules,
            configuration: auditor.configuration().map(|tree| tree.render()),
        }
    }
}

impl From<&ironaudit_core::Package> for PackageEntry {
    fn from(p: &ironaudit_core::Package) -> Self {
        Self {
            name: p.name.clone(),
            version: p.version.clone(),
            group: p.group.clone(),
        }
    }
}

impl Render for AuditReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Audit: {} (run {})", self.target.bold(), self.run_id)?;
        if self.result.is_success() {
            writeln!(w, "  Result: {}", self.result.code().green().bold())?;
        } else {
            writeln!(w, "  Result: {}", self.result.code().red().bold())?;
        }
        if let Some(ref error) = self.error {
            writeln!(w, "  Error: {}", error.red())?;
        }
        if let Some(ref version) = self.version {
            writeln!(w, "  Version: {version}")?;
        }
        if !self.modules.is_empty() {
            let modules: Vec<String> = self
                .modules
                .iter()
                .map(|m| format!("{}@{}", m.name, m.version))
                .collect();
            writeln!(w, "  Modules: {}", modules.join(", "))?;
        }
        writeln!(w)?;

        match self.view {
            ReportView::Packages => self.render_packages(w)?,
            ReportView::Artifacts => {
                self.render_packages(w)?;
                writeln!(w)?;
                self.render_artifacts(w)?;
            }
            ReportView::Configuration => match self.configuration {
                Some(ref tree) => writeln!(w, "{tree}")?,
                None => writeln!(w, "{}", "No configuration parsed.".yellow())?,
            },
            ReportView::Rules => self.render_rules(w)?,
            ReportView::Full => {
                writeln!(w, "Packages: {}", self.package_count)?;
                self.render_vulnerabilities(w)?;
                if !self.rules.is_empty() {
                    writeln!(w)?;
                    self.render_rules(w)?;
                }
            }
        }
        Ok(())
    }
}

impl AuditReport {
    fn render_packages(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Packages ({}):", self.packages.len())?;
        writeln!(w, "{:<40} {:<20} {}", "NAME", "VERSION", "GROUP")?;
        for p in &self.packages {
            writeln!(
                w,
                "{:<40} {:<20} {}",
                p.name,
                p.version,
                p.group.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }

    fn render_artifacts(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Artifacts ({}):", self.artifacts.len())?;
        for a in &self.artifacts {
            writeln!(w, "  {:<40} {}", a.artifact_id, a.package)?;
        }
        Ok(())
    }

    fn render_vulnerabilities(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let count = self.vulnerabilities.len().to_string();
        if self.vulnerabilities.is_empty() {
            writeln!(w, "Vulnerabilities: {}", count.green().bold())?;
            if self.result.is_success() {
                writeln!(w, "{}", "No vulnerabilities found.".green())?;
            }
            return Ok(());
        }

        writeln!(w, "Vulnerabilities: {}", count.red().bold())?;
        writeln!(
            w,
            "{:<10} {:<24} {:<30} {:<14} {}",
            "SEVERITY", "ID", "PACKAGE", "VERSION", "TITLE"
        )?;
        for v in &self.vulnerabilities {
            let severity = match v.severity.as_str() {
                "Critical" => v.severity.red().bold(),
                "High" => v.severity.red(),
                "Medium" => v.severity.yellow(),
                "" => "-".normal(),
                _ => v.severity.normal(),
            };
            writeln!(
                w,
                "{:<10} {:<24} {:<30} {:<14} {}",
                severity, v.id, v.package, v.installed_version, v.title
            )?;
        }
        Ok(())
    }

    fn render_rules(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Configuration rules ({}):", self.rules.len())?;
        for r in &self.rules {
            let label = r.status.as_str();
            let status = match r.status {
                RuleStatus::Matched => label.red().bold(),
                RuleStatus::NotMatched => label.green(),
                RuleStatus::Disabled => label.yellow(),
                RuleStatus::Listed => label.normal(),
            };
            writeln!(w, "  [{}] {:<48} {}", r.module, r.title, status)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::TargetKindArg;

    fn report(view: ReportView) -> AuditReport {
        AuditReport {
            run_id: "run-1".to_owned(),
            target: "packages 'npm'".to_owned(),
            view,
            result: AuditResult::Success,
            error: None,
            version: None,
            modules: Vec::new(),
            package_count: 2,
            packages: vec![
                PackageEntry {
                    name: "lodash".to_owned(),
                    version: "4.17.11".to_owned(),
                    group: None,
                },
                PackageEntry {
                    name: "serde".to_owned(),
                    version: "1.0.0".to_owned(),
                    group: Some("registry".to_owned()),
                },
            ],
            artifacts: Vec::new(),
            vulnerabilities: Vec::new(),
            rules: Vec::new(),
            configuration: None,
        }
    }

    fn render(report: &AuditReport) -> String {
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn overrides_replace_paths_and_switch_flags_on() {
        let mut config = IronauditConfig::default();
        config.flags.only_local_rules = true;
        let args = AuditArgs {
            lockfile: Some(PathBuf::from("app/Cargo.lock")),
            vuln_db: Some(PathBuf::from("/srv/db")),
            kind: Some(TargetKindArg::Server),
            name: Some("edge".to_owned()),
            target_version: Some("2.4.1".to_owned()),
            modules: vec!["auth@1.0.0".to_owned()],
            list_configuration_rules: true,
            ..AuditArgs::default()
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.audit.lockfile, "app/Cargo.lock");
        assert_eq!(config.audit.vuln_db_dir, "/srv/db");
        assert_eq!(config.target.kind, "server");
        assert_eq!(config.target.name, "edge");
        assert_eq!(config.target.version, "2.4.1");
        assert_eq!(config.target.modules, vec!["auth@1.0.0"]);
        assert!(config.flags.list_configuration_rules);
        // unset flags keep the settings value
        assert!(config.flags.only_local_rules);
        assert_eq!(config.audit.rules_dir, "/etc/ironaudit/rules");
    }

    #[test]
    fn lockfile_decides_package_manager() {
        let mut config = IronauditConfig::default();
        config.audit.package_manager = "npm".to_owned();
        config.audit.lockfile = "/project/Cargo.lock".to_owned();

        let enumerator = open_enumerator(&mut config).unwrap();
        assert!(enumerator.is_some());
        assert_eq!(config.audit.package_manager, "cargo");
    }

    #[test]
    fn unsupported_lockfile_is_rejected() {
        let mut config = IronauditConfig::default();
        config.audit.lockfile = "/project/yarn.lock".to_owned();
        assert!(matches!(open_enumerator(&mut config), Err(CliError::Command(_))));
    }

    #[test]
    fn view_follows_flags() {
        let mut config = IronauditConfig::default();
        assert_eq!(ReportView::from_config(&config), ReportView::Full);
        config.flags.list_artifacts = true;
        assert_eq!(ReportView::from_config(&config), ReportView::Artifacts);
        config.flags.list_artifacts = false;
        config.flags.print_configuration = true;
        assert_eq!(ReportView::from_config(&config), ReportView::Configuration);
    }

    #[test]
    fn packages_view_lists_packages() {
        let output = render(&report(ReportView::Packages));
        assert!(output.contains("Packages (2):"));
        assert!(output.contains("lodash"));
        assert!(output.contains("registry"));
        assert!(output.contains("SUCCESS"));
    }

    #[test]
    fn full_view_shows_vulnerabilities() {
        let mut report = report(ReportView::Full);
        report.vulnerabilities.push(VulnerabilityEntry {
            id: "GHSA-lodash-1".to_owned(),
            package: "lodash".to_owned(),
            installed_version: "4.17.11".to_owned(),
            severity: "High".to_owned(),
            title: "Prototype pollution".to_owned(),
            cve: None,
            affected: vec!["<4.17.12".to_owned()],
        });

        let output = render(&report);
        assert!(output.contains("Packages: 2"));
        assert!(output.contains("GHSA-lodash-1"));
        assert!(output.contains("Prototype pollution"));
        assert!(!output.contains("No vulnerabilities found."));
    }

    #[test]
    fn failed_run_shows_error() {
        let mut report = report(ReportView::Full);
        report.result = AuditResult::ErrorScanningPackages;
        report.error = Some("packages phase failed: unreadable lockfile".to_owned());

        let output = render(&report);
        assert!(output.contains("ERROR_SCANNING_PACKAGES"));
        assert!(output.contains("unreadable lockfile"));
        assert!(!output.contains("No vulnerabilities found."));
    }

    #[test]
    fn rules_view_shows_statuses() {
        let mut report = report(ReportView::Rules);
        report.rules = vec![
            RuleEntry {
                module: "core".to_owned(),
                title: "Debug mode enabled".to_owned(),
                status: RuleStatus::Matched,
                message: String::new(),
            },
            RuleEntry {
                module: "core".to_owned(),
                title: "Windows only".to_owned(),
                status: RuleStatus::Disabled,
                message: String::new(),
            },
        ];

        let output = render(&report);
        assert!(output.contains("Configuration rules (2):"));
        assert!(output.contains("[core] Debug mode enabled"));
        assert!(output.contains("disabled"));
    }

    #[test]
    fn json_skips_empty_optionals() {
        let json = serde_json::to_value(report(ReportView::Packages)).unwrap();
        assert_eq!(json["result"], "SUCCESS");
        assert_eq!(json["view"], "packages");
        assert!(json.get("error").is_none());
        assert!(json.get("configuration").is_none());
        assert_eq!(json["packages"][1]["group"], "registry");
        assert!(json["packages"][0].get("group").is_none());
    }
}
