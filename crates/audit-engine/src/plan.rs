//! Execution plan: run-mode flags resolved once per run.

use serde::{Deserialize, Serialize};

use ironaudit_core::TargetKind;

use crate::config::AuditFlags;
use crate::phase::PhaseKind;

/// Which optional collaborators an auditor has attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attachments {
    pub enumerator: bool,
    pub reporter: bool,
    pub analyzers: bool,
}

/// Phases that will run for one audit.
///
/// Computed from [`AuditFlags`] at run start; phases read it and never look
/// at the flags again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub scan_modules: bool,
    pub scan_version: bool,
    pub scan_packages: bool,
    pub search_artifacts: bool,
    pub search_vulnerabilities: bool,
    pub evaluate_vulnerabilities: bool,
    pub report: bool,
    pub scan_configuration: bool,
    pub scan_default_rules: bool,
    pub evaluate_rules: bool,
    pub run_analyzers: bool,
}

impl ExecutionPlan {
    pub fn new(flags: &AuditFlags, kind: TargetKind, attached: Attachments) -> Self {
        let has_configuration = kind.has_configuration();
        let is_application = kind == TargetKind::Application;

        let packages_dropped = if is_application {
            flags.skip_packages_audit && flags.only_local_rules
        } else {
            flags.skip_packages_audit
        };
        let scan_packages = attached.enumerator && !packages_dropped;

        let search_artifacts = scan_packages
            && flags.list_artifacts
            && !flags.list_packages
            && !flags.skip_packages_audit;

        let search_vulnerabilities = scan_packages
            && !flags.list_packages
            && !flags.list_artifacts
            && !flags.skip_packages_audit;

        let scan_configuration = has_configuration && !flags.list_packages && !flags.list_artifacts;
        let scan_default_rules = scan_configuration && !flags.print_configuration;
        let evaluate_rules = scan_default_rules && !flags.list_configuration_rules;

        Self {
            scan_modules: has_configuration,
            scan_version: has_configuration,
            scan_packages,
            search_artifacts,
            search_vulnerabilities,
            evaluate_vulnerabilities: search_vulnerabilities,
            report: search_vulnerabilities && attached.reporter,
            scan_configuration,
            scan_default_rules,
            evaluate_rules,
            run_analyzers: evaluate_rules && !flags.only_local_rules && attached.analyzers,
        }
    }

    /// Planned phases in state order.
    pub fn phases(&self) -> Vec<PhaseKind> {
        let steps = [
            (self.scan_modules, PhaseKind::Modules),
            (self.scan_version, PhaseKind::Version),
            (self.scan_packages, PhaseKind::Packages),
            (self.scan_packages, PhaseKind::ProfileFilter),
            (self.search_artifacts, PhaseKind::Artifacts),
            (self.search_vulnerabilities, PhaseKind::Vulnerabilities),
            (self.evaluate_vulnerabilities, PhaseKind::Evaluate),
            (self.report, PhaseKind::Report),
            (self.scan_configuration, PhaseKind::Configuration),
            (self.scan_default_rules, PhaseKind::DefaultConfigurationRules),
            (self.evaluate_rules, PhaseKind::EvaluateConfigurationRules),
            (self.run_analyzers, PhaseKind::Analyzers),
            (self.run_analyzers, PhaseKind::AnalyzerResults),
        ];
        steps
            .into_iter()
            .filter_map(|(on, kind)| on.then_some(kind))
            .collect()
    }

    pub fn runs(&self, kind: PhaseKind) -> bool {
        self.phases().contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: Attachments = Attachments {
        enumerator: true,
        reporter: true,
        analyzers: true,
    };

    #[test]
    fn default_packages_run_searches_and_evaluates() {
        let plan = ExecutionPlan::new(&AuditFlags::default(), TargetKind::Packages, ALL);
        assert_eq!(
            plan.phases(),
            vec![
                PhaseKind::Packages,
                PhaseKind::ProfileFilter,
                PhaseKind::Vulnerabilities,
                PhaseKind::Evaluate,
                PhaseKind::Report,
            ]
        );
    }

    #[test]
    fn list_artifacts_is_the_only_artifact_mode() {
        let flags = AuditFlags::default().list_artifacts(true);
        let plan = ExecutionPlan::new(&flags, TargetKind::Packages, ALL);
        assert!(plan.search_artifacts);
        assert!(!plan.search_vulnerabilities);
        assert!(!plan.report);

        let both = flags.list_packages(true);
        let plan = ExecutionPlan::new(&both, TargetKind::Packages, ALL);
        assert!(!plan.search_artifacts);
    }

    #[test]
    fn list_packages_stops_after_filter() {
        let flags = AuditFlags::default().list_packages(true);
        let plan = ExecutionPlan::new(&flags, TargetKind::Server, ALL);
        assert!(plan.scan_packages);
        assert!(!plan.search_vulnerabilities);
        assert!(!plan.scan_configuration);
        assert!(plan.scan_modules);
    }

    #[test]
    fn skip_audit_drops_package_path_for_non_applications() {
        let flags = AuditFlags::default().skip_packages_audit(true);
        let plan = ExecutionPlan::new(&flags, TargetKind::Server, ALL);
        assert!(!plan.scan_packages);
        assert!(plan.evaluate_rules);
        assert!(plan.run_analyzers);
    }

    #[test]
    fn application_keeps_package_listing_unless_local_rules_only() {
        let flags = AuditFlags::default().skip_packages_audit(true);
        let plan = ExecutionPlan::new(&flags, TargetKind::Application, ALL);
        assert!(plan.scan_packages);
        assert!(!plan.search_vulnerabilities);
        assert!(!plan.search_artifacts);

        let local = flags.only_local_rules(true);
        let plan = ExecutionPlan::new(&local, TargetKind::Application, ALL);
        assert!(!plan.scan_packages);
        assert!(plan.evaluate_rules);
        assert!(!plan.run_analyzers);
    }

    #[test]
    fn configuration_listing_modes_stop_the_rule_path() {
        let print = AuditFlags::default().print_configuration(true);
        let plan = ExecutionPlan::new(&print, TargetKind::Server, ALL);
        assert!(plan.scan_configuration);
        assert!(!plan.scan_default_rules);
        assert!(plan.search_vulnerabilities);

        let list = AuditFlags::default().list_configuration_rules(true);
        let plan = ExecutionPlan::new(&list, TargetKind::Server, ALL);
        assert!(plan.scan_default_rules);
        assert!(!plan.evaluate_rules);
        assert!(!plan.run_analyzers);
    }

    #[test]
    fn missing_collaborators_drop_their_phases() {
        let plan = ExecutionPlan::new(
            &AuditFlags::default(),
            TargetKind::Server,
            Attachments::default(),
        );
        assert!(!plan.scan_packages);
        assert!(!plan.report);
        assert!(!plan.run_analyzers);
        assert!(plan.evaluate_rules);
        assert!(!plan.runs(PhaseKind::Packages));
        assert!(plan.runs(PhaseKind::Configuration));
    }

    #[test]
    fn packages_target_never_touches_configuration() {
        for flags in [
            AuditFlags::default(),
            AuditFlags::default().print_configuration(true),
            AuditFlags::default().only_local_rules(true),
        ] {
            let plan = ExecutionPlan::new(&flags, TargetKind::Packages, ALL);
            assert!(!plan.scan_modules);
            assert!(!plan.scan_configuration);
            assert!(!plan.run_analyzers);
        }
    }
}
