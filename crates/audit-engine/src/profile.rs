//! Audit profile filter.
//!
//! Removes packages matching `exclude` rules before any data source is
//! queried. A broken rule only disables itself.

use regex::Regex;
use tracing::{debug, warn};

use ironaudit_core::metrics as m;
use ironaudit_core::{AuditProfile, AuditProfileRule, Package, VersionRangeOracle};

struct CompiledRule<'a> {
    rule: &'a AuditProfileRule,
    name: Regex,
}

impl CompiledRule<'_> {
    fn excludes(&self, package: &Package, oracle: &dyn VersionRangeOracle) -> bool {
        if self.rule.target != package.package_manager || !self.name.is_match(&package.name) {
            return false;
        }
        let Some(range) = self.rule.match_version.as_deref() else {
            return true;
        };
        match oracle.is_in_range(range, &package.version) {
            Ok(in_range) => in_range,
            Err(e) => {
                warn!(
                    rule = %self.rule.match_name,
                    package = %package,
                    error = %e,
                    "profile rule version check failed, rule not applied"
                );
                metrics::counter!(m::ITEM_ERRORS_TOTAL, m::LABEL_PHASE => "profile_filter")
                    .increment(1);
                false
            }
        }
    }
}

fn compile(profile: &AuditProfile) -> Vec<CompiledRule<'_>> {
    let mut compiled = Vec::with_capacity(profile.rules.len());
    for rule in &profile.rules {
        if !rule.is_exclude() {
            debug!(category = %rule.category, "ignoring non-exclude profile rule");
            continue;
        }
        match Regex::new(&rule.match_name) {
            Ok(name) => compiled.push(CompiledRule { rule, name }),
            Err(e) => {
                warn!(pattern = %rule.match_name, error = %e, "invalid profile rule pattern, skipping");
                metrics::counter!(m::ITEM_ERRORS_TOTAL, m::LABEL_PHASE => "profile_filter")
                    .increment(1);
            }
        }
    }
    compiled
}

/// Returns `packages` minus every package excluded by `profile`.
///
/// Order of the remaining packages is preserved.
pub fn filter_packages(
    packages: Vec<Package>,
    profile: Option<&AuditProfile>,
    oracle: &dyn VersionRangeOracle,
) -> Vec<Package> {
    let Some(profile) = profile else {
        return packages;
    };
    let rules = compile(profile);
    if rules.is_empty() {
        return packages;
    }

    let before = packages.len();
    let kept: Vec<Package> = packages
        .into_iter()
        .filter(|p| {
            let excluded = rules.iter().any(|r| r.excludes(p, oracle));
            if excluded {
                debug!(package = %p, "excluded by audit profile");
            }
            !excluded
        })
        .collect();

    let excluded = before - kept.len();
    if excluded > 0 {
        metrics::counter!(m::PACKAGES_EXCLUDED_TOTAL).increment(excluded as u64);
    }
    kept
}
