//! Configuration rule evaluator.
//!
//! Each rule is gated on platform, target version and development mode,
//! then its query runs against the parsed configuration on the blocking
//! pool. A failing query disables that rule only.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use ironaudit_core::metrics as m;
use ironaudit_core::{
    AuditTarget, ConfigurationRule, ConfigurationTree, RuleOutcome, VersionRangeOracle,
};

use crate::error::EngineError;

/// Why a rule was not evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    PlatformMismatch,
    RuleVersionExcludesAppVersion,
    AppDevelopmentMode,
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PlatformMismatch => "platform mismatch",
            Self::RuleVersionExcludesAppVersion => "rule versions exclude target version",
            Self::AppDevelopmentMode => "disabled in application development mode",
        };
        f.write_str(s)
    }
}

/// Outcomes of one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluation {
    pub outcomes: HashMap<ConfigurationRule, RuleOutcome>,
    pub disabled_rules: Vec<ConfigurationRule>,
}

enum Verdict {
    Disabled(DisableReason),
    Evaluated(RuleOutcome),
    /// Query failed; rule is disabled and gets a skipped outcome.
    Failed,
    /// Rule carries no query.
    NotEvaluated,
}

#[derive(Clone)]
pub struct ConfigurationRuleEvaluator {
    oracle: Arc<dyn VersionRangeOracle>,
}

impl ConfigurationRuleEvaluator {
    pub fn new(oracle: Arc<dyn VersionRangeOracle>) -> Self {
        Self { oracle }
    }

    /// Returns why `rule` is disabled for `target`, if it is.
    pub fn disable_reason(
        &self,
        rule: &ConfigurationRule,
        target: &AuditTarget,
    ) -> Option<DisableReason> {
        gate(rule, target, self.oracle.as_ref())
    }

    /// Evaluates every rule of every module against `tree`.
    pub async fn evaluate(
        &self,
        rules: &BTreeMap<String, Vec<ConfigurationRule>>,
        tree: Arc<dyn ConfigurationTree>,
        target: &AuditTarget,
    ) -> Result<RuleEvaluation, EngineError> {
        let target = Arc::new(target.clone());
        let mut handles = Vec::new();

        for rule in rules.values().flatten() {
            let rule = rule.clone();
            let tree = Arc::clone(&tree);
            let oracle = Arc::clone(&self.oracle);
            let target = Arc::clone(&target);
            handles.push(tokio::task::spawn_blocking(move || {
                let verdict = evaluate_rule(&rule, tree.as_ref(), &target, oracle.as_ref());
                (rule, verdict)
            }));
        }

        let mut evaluation = RuleEvaluation::default();
        let mut join_error = None;
        for handle in handles {
            let (rule, verdict) = match handle.await {
                Ok(pair) => pair,
                Err(e) => {
                    join_error.get_or_insert(EngineError::from(e));
                    continue;
                }
            };
            match verdict {
                Verdict::Disabled(reason) => {
                    debug!(rule = %rule, reason = %reason, "configuration rule disabled");
                    evaluation.disabled_rules.push(rule);
                }
                Verdict::Evaluated(outcome) => {
                    evaluation.outcomes.insert(rule, outcome);
                }
                Verdict::Failed => {
                    evaluation.disabled_rules.push(rule.clone());
                    evaluation.outcomes.insert(rule, RuleOutcome::skipped());
                }
                Verdict::NotEvaluated => {
                    debug!(rule = %rule, "configuration rule has no query, not evaluated");
                }
            }
        }
        if let Some(e) = join_error {
            return Err(e);
        }

        metrics::counter!(m::RULES_EVALUATED_TOTAL).increment(evaluation.outcomes.len() as u64);
        metrics::counter!(m::RULES_DISABLED_TOTAL)
            .increment(evaluation.disabled_rules.len() as u64);
        Ok(evaluation)
    }
}

fn gate(
    rule: &ConfigurationRule,
    target: &AuditTarget,
    oracle: &dyn VersionRangeOracle,
) -> Option<DisableReason> {
    if let Some(platform) = &rule.platform {
        if *platform != target.host_platform {
            return Some(DisableReason::PlatformMismatch);
        }
    }

    if !rule.versions.is_empty() && !version_matches(rule, target, oracle) {
        return Some(DisableReason::RuleVersionExcludesAppVersion);
    }

    if target.app_development_mode && !rule.enable_for_app_development {
        return Some(DisableReason::AppDevelopmentMode);
    }

    None
}

fn version_matches(
    rule: &ConfigurationRule,
    target: &AuditTarget,
    oracle: &dyn VersionRangeOracle,
) -> bool {
    let Some(version) = target.version.as_deref() else {
        return false;
    };
    rule.versions
        .iter()
        .any(|spec| match oracle.is_in_range(spec, version) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(rule = %rule, spec = %spec, version, error = %e, "rule version check failed");
                metrics::counter!(m::ITEM_ERRORS_TOTAL,
                    m::LABEL_PHASE => "evaluate_configuration_rules")
                .increment(1);
                false
            }
        })
}

fn evaluate_rule(
    rule: &ConfigurationRule,
    tree: &dyn ConfigurationTree,
    target: &AuditTarget,
    oracle: &dyn VersionRangeOracle,
) -> Verdict {
    if let Some(reason) = gate(rule, target, oracle) {
        return Verdict::Disabled(reason);
    }

    let Some(query) = rule.xpath_test.as_deref() else {
        return Verdict::NotEvaluated;
    };

    match tree.xpath_evaluate(query) {
        Ok(result) => Verdict::Evaluated(RuleOutcome {
            matched: result.matched,
            result_nodes: result.nodes,
            message: result.message,
        }),
        Err(e) => {
            warn!(rule = %rule, query, error = %e, "configuration rule query failed, skipping");
            metrics::counter!(m::ITEM_ERRORS_TOTAL,
                m::LABEL_PHASE => "evaluate_configuration_rules")
            .increment(1);
            Verdict::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironaudit_core::{ConfigurationError, Platform, VersionRangeError, XPathOutcome};

    struct PrefixOracle;

    impl VersionRangeOracle for PrefixOracle {
        fn is_in_range(&self, spec: &str, installed: &str) -> Result<bool, VersionRangeError> {
            if spec == "!" {
                return Err(VersionRangeError::InvalidRange {
                    spec: spec.to_owned(),
                    reason: "bad".to_owned(),
                });
            }
            Ok(installed.starts_with(spec))
        }
    }

    /// Matches queries equal to "/on"; errors on anything not starting with '/'.
    struct FlagTree;

    impl ConfigurationTree for FlagTree {
        fn xpath_evaluate(&self, query: &str) -> Result<XPathOutcome, ConfigurationError> {
            if !query.starts_with('/') {
                return Err(ConfigurationError::InvalidQuery {
                    query: query.to_owned(),
                    reason: "not a path".to_owned(),
                });
            }
            let matched = query == "/on";
            Ok(XPathOutcome {
                matched,
                nodes: if matched { vec!["on".to_owned()] } else { Vec::new() },
                message: String::new(),
            })
        }

        fn render(&self) -> String {
            "{}".to_owned()
        }
    }

    fn rules(list: Vec<ConfigurationRule>) -> BTreeMap<String, Vec<ConfigurationRule>> {
        let mut map = BTreeMap::new();
        for rule in list {
            map.entry(rule.module_name.clone())
                .or_insert_with(Vec::new)
                .push(rule);
        }
        map
    }

    fn linux_server() -> AuditTarget {
        AuditTarget::server("nginx", "dpkg")
            .with_platform(Platform::Linux)
            .with_version("1.24.0")
    }

    async fn run(list: Vec<ConfigurationRule>, target: &AuditTarget) -> RuleEvaluation {
        ConfigurationRuleEvaluator::new(Arc::new(PrefixOracle))
            .evaluate(&rules(list), Arc::new(FlagTree), target)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn platform_mismatch_disables_rule() {
        let rule = ConfigurationRule::new("core", "win only")
            .with_platform(Platform::Windows)
            .with_xpath("/on");
        let eval = run(vec![rule.clone()], &linux_server()).await;
        assert_eq!(eval.disabled_rules, vec![rule.clone()]);
        assert!(!eval.outcomes.contains_key(&rule));
    }

    #[tokio::test]
    async fn version_gate_uses_oracle() {
        let matching = ConfigurationRule::new("core", "1.24")
            .with_versions(vec!["1.24".to_owned()])
            .with_xpath("/on");
        let other = ConfigurationRule::new("core", "1.20")
            .with_versions(vec!["1.20".to_owned()])
            .with_xpath("/on");
        let erroring = ConfigurationRule::new("core", "bad")
            .with_versions(vec!["!".to_owned()])
            .with_xpath("/on");
        let eval = run(vec![matching.clone(), other.clone(), erroring.clone()], &linux_server()).await;
        assert!(eval.outcomes[&matching].matched);
        assert!(eval.disabled_rules.contains(&other));
        assert!(eval.disabled_rules.contains(&erroring));
    }

    #[tokio::test]
    async fn unknown_version_disables_versioned_rule() {
        let rule = ConfigurationRule::new("core", "versioned")
            .with_versions(vec!["1".to_owned()])
            .with_xpath("/on");
        let target = AuditTarget::server("nginx", "dpkg").with_platform(Platform::Linux);
        let eval = run(vec![rule.clone()], &target).await;
        assert_eq!(eval.disabled_rules, vec![rule]);
    }

    #[tokio::test]
    async fn development_mode_respects_opt_out() {
        let opted_out = ConfigurationRule::new("core", "prod only")
            .with_app_development(false)
            .with_xpath("/on");
        let target = linux_server().with_app_development_mode(true);
        let eval = run(vec![opted_out.clone()], &target).await;
        assert_eq!(eval.disabled_rules, vec![opted_out.clone()]);

        let eval = run(vec![opted_out.clone()], &linux_server()).await;
        assert!(eval.disabled_rules.is_empty());
        assert!(eval.outcomes.contains_key(&opted_out));
    }

    #[tokio::test]
    async fn failing_query_is_skipped_and_disabled() {
        let broken = ConfigurationRule::new("core", "broken").with_xpath("???");
        let fine = ConfigurationRule::new("core", "fine").with_xpath("/on");
        let eval = run(vec![broken.clone(), fine.clone()], &linux_server()).await;

        assert_eq!(eval.outcomes[&broken], RuleOutcome::skipped());
        assert!(eval.disabled_rules.contains(&broken));
        assert!(eval.outcomes[&fine].matched);
        assert_eq!(eval.outcomes[&fine].result_nodes, vec!["on"]);
    }

    #[tokio::test]
    async fn rule_without_query_has_no_entry() {
        let rule = ConfigurationRule::new("core", "manual check");
        let eval = run(vec![rule.clone()], &linux_server()).await;
        assert!(eval.outcomes.is_empty());
        assert!(eval.disabled_rules.is_empty());
    }

    #[test]
    fn disable_reason_reports_platform_first() {
        let evaluator = ConfigurationRuleEvaluator::new(Arc::new(PrefixOracle));
        let rule = ConfigurationRule::new("core", "x")
            .with_platform(Platform::Windows)
            .with_app_development(false);
        let target = linux_server().with_app_development_mode(true);
        assert_eq!(
            evaluator.disable_reason(&rule, &target),
            Some(DisableReason::PlatformMismatch)
        );
    }
}
