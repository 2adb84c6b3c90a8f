//! Audit profiles and configuration rules.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::types::Platform;

/// Message and result node recorded for a rule whose query could not run.
pub const SKIPPED: &str = "Skipped";

/// User-supplied audit profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditProfile {
    #[serde(default)]
    pub rules: Vec<AuditProfileRule>,
}

/// One profile rule. Only the `exclude` category affects an audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditProfileRule {
    #[serde(default = "default_category")]
    pub category: String,
    /// Package manager id this rule applies to.
    pub target: String,
    /// Regular expression matched against the package name.
    pub match_name: String,
    /// Optional version range; when set the package version must also lie in it.
    #[serde(default)]
    pub match_version: Option<String>,
}

fn default_category() -> String {
    "exclude".to_owned()
}

impl AuditProfileRule {
    pub fn exclude(target: impl Into<String>, match_name: impl Into<String>) -> Self {
        Self {
            category: default_category(),
            target: target.into(),
            match_name: match_name.into(),
            match_version: None,
        }
    }

    pub fn with_version(mut self, range: impl Into<String>) -> Self {
        self.match_version = Some(range.into());
        self
    }

    pub fn is_exclude(&self) -> bool {
        self.category.eq_ignore_ascii_case("exclude")
    }
}

/// A platform/version scoped configuration check.
///
/// Equality and hashing use `(module_name, title)` so a rule can key the
/// outcome map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationRule {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub platform: Option<Platform>,
    /// Target version specifiers; empty means every version.
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default = "default_true")]
    pub enable_for_app_development: bool,
    /// Query run against the configuration tree.
    #[serde(default)]
    pub xpath_test: Option<String>,
    /// Module this rule belongs to; filled in by the rule loader.
    #[serde(default)]
    pub module_name: String,
}

fn default_true() -> bool {
    true
}

impl ConfigurationRule {
    pub fn new(module_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: String::new(),
            resolution: String::new(),
            urls: Vec::new(),
            platform: None,
            versions: Vec::new(),
            enable_for_app_development: true,
            xpath_test: None,
            module_name: module_name.into(),
        }
    }

    pub fn with_xpath(mut self, query: impl Into<String>) -> Self {
        self.xpath_test = Some(query.into());
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_versions(mut self, versions: Vec<String>) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_app_development(mut self, enabled: bool) -> Self {
        self.enable_for_app_development = enabled;
        self
    }
}

impl PartialEq for ConfigurationRule {
    fn eq(&self, other: &Self) -> bool {
        self.module_name == other.module_name && self.title == other.title
    }
}

impl Eq for ConfigurationRule {}

impl Hash for ConfigurationRule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.module_name.hash(state);
        self.title.hash(state);
    }
}

impl fmt::Display for ConfigurationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.module_name, self.title)
    }
}

/// Result of evaluating one configuration rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub matched: bool,
    pub result_nodes: Vec<String>,
    pub message: String,
}

impl RuleOutcome {
    /// Outcome recorded when the rule's query failed.
    pub fn skipped() -> Self {
        Self {
            matched: false,
            result_nodes: vec![SKIPPED.to_owned()],
            message: SKIPPED.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_rule_defaults_to_exclude() {
        let rule: AuditProfileRule =
            serde_json::from_str(r#"{"target":"npm","match_name":"^lodash$"}"#).unwrap();
        assert!(rule.is_exclude());
        assert!(rule.match_version.is_none());
    }

    #[test]
    fn profile_rule_category_is_case_insensitive() {
        let mut rule = AuditProfileRule::exclude("npm", "^a$");
        rule.category = "EXCLUDE".to_owned();
        assert!(rule.is_exclude());
        rule.category = "include".to_owned();
        assert!(!rule.is_exclude());
    }

    #[test]
    fn rule_identity_is_module_and_title() {
        let a = ConfigurationRule::new("core", "TLS enabled").with_xpath("/tls");
        let b = ConfigurationRule::new("core", "TLS enabled").with_platform(Platform::Linux);
        let c = ConfigurationRule::new("http", "TLS enabled");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rule_deserialization_defaults() {
        let rule: ConfigurationRule =
            serde_json::from_str(r#"{"title":"Debug disabled"}"#).unwrap();
        assert!(rule.enable_for_app_development);
        assert!(rule.versions.is_empty());
        assert!(rule.platform.is_none());
        assert!(rule.xpath_test.is_none());
    }

    #[test]
    fn skipped_outcome_shape() {
        let o = RuleOutcome::skipped();
        assert!(!o.matched);
        assert_eq!(o.result_nodes, vec!["Skipped"]);
        assert_eq!(o.message, "Skipped");
    }
}
