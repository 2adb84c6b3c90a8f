//! Settings: `ironaudit.toml` parsing and environment overrides.
//!
//! [`IronauditConfig`] is the top-level structure; each crate reads only its
//! own section.
//!
//! # Precedence
//! 1. CLI arguments
//! 2. Environment variables (`IRONAUDIT_AUDIT_PACKAGE_MANAGER=npm`)
//! 3. Settings file (`ironaudit.toml`)
//! 4. `Default` values
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), ironaudit_core::error::IronauditError> {
//! use ironaudit_core::config::IronauditConfig;
//!
//! let config = IronauditConfig::load("ironaudit.toml").await?;
//! let config = IronauditConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronauditError};
use crate::types::{AuditTarget, Platform, TargetKind};

/// Upper bound for `audit.max_rule_files`.
pub const MAX_RULE_FILES_LIMIT: usize = 10_000;

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronauditConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub flags: FlagsConfig,
    #[serde(default)]
    pub target: TargetConfig,
}

impl IronauditConfig {
    /// Loads a settings file, applies environment overrides, then validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronauditError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads a settings file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronauditError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronauditError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronauditError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(toml_str: &str) -> Result<Self, IronauditError> {
        toml::from_str(toml_str).map_err(|e| {
            IronauditError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Applies `IRONAUDIT_{SECTION}_{FIELD}` environment variables.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONAUDIT_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONAUDIT_GENERAL_LOG_FORMAT");

        // Audit
        override_string(
            &mut self.audit.package_manager,
            "IRONAUDIT_AUDIT_PACKAGE_MANAGER",
        );
        override_string(&mut self.audit.lockfile, "IRONAUDIT_AUDIT_LOCKFILE");
        override_string(&mut self.audit.vuln_db_dir, "IRONAUDIT_AUDIT_VULN_DB_DIR");
        override_string(&mut self.audit.profile, "IRONAUDIT_AUDIT_PROFILE");
        override_string(&mut self.audit.rules_dir, "IRONAUDIT_AUDIT_RULES_DIR");
        override_usize(
            &mut self.audit.max_rule_files,
            "IRONAUDIT_AUDIT_MAX_RULE_FILES",
        );
        override_string(&mut self.audit.report_file, "IRONAUDIT_AUDIT_REPORT_FILE");

        // Flags
        override_bool(&mut self.flags.list_packages, "IRONAUDIT_FLAGS_LIST_PACKAGES");
        override_bool(
            &mut self.flags.list_artifacts,
            "IRONAUDIT_FLAGS_LIST_ARTIFACTS",
        );
        override_bool(
            &mut self.flags.skip_packages_audit,
            "IRONAUDIT_FLAGS_SKIP_PACKAGES_AUDIT",
        );
        override_bool(
            &mut self.flags.print_configuration,
            "IRONAUDIT_FLAGS_PRINT_CONFIGURATION",
        );
        override_bool(
            &mut self.flags.only_local_rules,
            "IRONAUDIT_FLAGS_ONLY_LOCAL_RULES",
        );
        override_bool(
            &mut self.flags.list_configuration_rules,
            "IRONAUDIT_FLAGS_LIST_CONFIGURATION_RULES",
        );

        // Target
        override_string(&mut self.target.kind, "IRONAUDIT_TARGET_KIND");
        override_string(&mut self.target.name, "IRONAUDIT_TARGET_NAME");
        override_string(&mut self.target.version, "IRONAUDIT_TARGET_VERSION");
        override_string(&mut self.target.platform, "IRONAUDIT_TARGET_PLATFORM");
        override_string(&mut self.target.config_file, "IRONAUDIT_TARGET_CONFIG_FILE");
        override_bool(
            &mut self.target.app_development_mode,
            "IRONAUDIT_TARGET_APP_DEVELOPMENT_MODE",
        );
        override_csv(&mut self.target.modules, "IRONAUDIT_TARGET_MODULES");
    }

    pub fn validate(&self) -> Result<(), IronauditError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.audit.package_manager.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "audit.package_manager".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.audit.max_rule_files == 0 || self.audit.max_rule_files > MAX_RULE_FILES_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "audit.max_rule_files".to_owned(),
                reason: format!("must be 1-{MAX_RULE_FILES_LIMIT}"),
            }
            .into());
        }

        self.target.kind()?;

        let listing_modes = [
            self.flags.list_packages,
            self.flags.list_artifacts,
            self.flags.print_configuration,
            self.flags.list_configuration_rules,
        ];
        if listing_modes.iter().filter(|on| **on).count() > 1 {
            return Err(ConfigError::InvalidValue {
                field: "flags".to_owned(),
                reason: "list_packages, list_artifacts, print_configuration and \
                         list_configuration_rules are mutually exclusive"
                    .to_owned(),
            }
            .into());
        }

        Ok(())
    }

    /// Builds the audit target described by the `[target]` and `[audit]` sections.
    pub fn audit_target(&self) -> Result<AuditTarget, IronauditError> {
        let kind = self.target.kind()?;
        let name = if self.target.name.is_empty() {
            self.audit.package_manager.clone()
        } else {
            self.target.name.clone()
        };
        let platform = if self.target.platform.is_empty() {
            Platform::current()
        } else {
            Platform::from(self.target.platform.as_str())
        };
        Ok(AuditTarget {
            kind,
            package_manager: self.audit.package_manager.clone(),
            name,
            version: (!self.target.version.is_empty()).then(|| self.target.version.clone()),
            app_development_mode: self.target.app_development_mode,
            host_platform: platform,
        })
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// json, pretty
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Inputs of the package path and the rule path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Package manager id (`npm`, `cargo`)
    pub package_manager: String,
    /// Lockfile the package list is read from; empty disables the package path.
    pub lockfile: String,
    /// Directory of `{ecosystem}.json` vulnerability files.
    pub vuln_db_dir: String,
    /// Audit profile (YAML); empty means no profile.
    pub profile: String,
    /// Directory of default configuration rules (YAML).
    pub rules_dir: String,
    pub max_rule_files: usize,
    /// JSON file the audit summary is written to; empty disables reporting.
    pub report_file: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            package_manager: "npm".to_owned(),
            lockfile: String::new(),
            vuln_db_dir: "/var/lib/ironaudit/vuln-db".to_owned(),
            profile: String::new(),
            rules_dir: "/etc/ironaudit/rules".to_owned(),
            max_rule_files: 1000,
            report_file: String::new(),
        }
    }
}

/// Run-mode flags. The engine turns these into an execution plan once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsConfig {
    pub list_packages: bool,
    pub list_artifacts: bool,
    pub skip_packages_audit: bool,
    pub print_configuration: bool,
    pub only_local_rules: bool,
    pub list_configuration_rules: bool,
}

/// Description of the audited server or application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// packages, server, application
    pub kind: String,
    pub name: String,
    /// Known version; empty means "detect".
    pub version: String,
    /// Host platform override; empty means the current OS.
    pub platform: String,
    pub app_development_mode: bool,
    /// Configuration file of the server/application.
    pub config_file: String,
    /// Installed modules as `name@version`.
    pub modules: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            kind: "packages".to_owned(),
            name: String::new(),
            version: String::new(),
            platform: String::new(),
            app_development_mode: false,
            config_file: String::new(),
            modules: Vec::new(),
        }
    }
}

impl TargetConfig {
    pub fn kind(&self) -> Result<TargetKind, IronauditError> {
        match self.kind.to_lowercase().as_str() {
            "packages" => Ok(TargetKind::Packages),
            "server" => Ok(TargetKind::Server),
            "application" | "app" => Ok(TargetKind::Application),
            _ => Err(ConfigError::InvalidValue {
                field: "target.kind".to_owned(),
                reason: "must be one of: packages, server, application".to_owned(),
            }
            .into()),
        }
    }
}

// --- environment override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = IronauditConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.audit.package_manager, "npm");
        assert_eq!(config.target.kind, "packages");
        assert_eq!(config.flags, FlagsConfig::default());
    }

    #[test]
    fn default_config_passes_validation() {
        IronauditConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = IronauditConfig::parse("").unwrap();
        assert_eq!(config.audit.max_rule_files, 1000);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[audit]
package_manager = "cargo"
lockfile = "Cargo.lock"

[flags]
list_packages = true
"#;
        let config = IronauditConfig::parse(toml).unwrap();
        assert_eq!(config.audit.package_manager, "cargo");
        assert_eq!(config.audit.lockfile, "Cargo.lock");
        assert!(config.flags.list_packages);
        assert!(!config.flags.list_artifacts);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn parse_invalid_toml_returns_parse_error() {
        let err = IronauditConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            IronauditError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = IronauditConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_unknown_target_kind() {
        let mut config = IronauditConfig::default();
        config.target.kind = "container".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("target.kind"));
    }

    #[test]
    fn validate_rejects_two_listing_modes() {
        let mut config = IronauditConfig::default();
        config.flags.list_packages = true;
        config.flags.print_configuration = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn validate_rejects_zero_rule_files() {
        let mut config = IronauditConfig::default();
        config.audit.max_rule_files = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn audit_target_from_sections() {
        let toml = r#"
[audit]
package_manager = "dpkg"

[target]
kind = "server"
name = "nginx"
version = "1.24.0"
platform = "linux"
"#;
        let config = IronauditConfig::parse(toml).unwrap();
        let target = config.audit_target().unwrap();
        assert_eq!(target.kind, TargetKind::Server);
        assert_eq!(target.name, "nginx");
        assert_eq!(target.package_manager, "dpkg");
        assert_eq!(target.version.as_deref(), Some("1.24.0"));
        assert_eq!(target.host_platform, Platform::Linux);
    }

    #[test]
    fn audit_target_defaults_name_to_package_manager() {
        let config = IronauditConfig::default();
        let target = config.audit_target().unwrap();
        assert_eq!(target.name, "npm");
        assert!(target.version.is_none());
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serialised with every other env-mutating test.
        unsafe { std::env::set_var("TEST_IRONAUDIT_STR", "overridden") };
        override_string(&mut val, "TEST_IRONAUDIT_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_IRONAUDIT_STR") };
    }

    #[test]
    #[serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: serialised with every other env-mutating test.
        unsafe { std::env::set_var("TEST_IRONAUDIT_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_IRONAUDIT_BOOL_BAD");
        assert!(!val);
        unsafe { std::env::remove_var("TEST_IRONAUDIT_BOOL_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_csv_drops_empty_items() {
        let mut val = vec!["a".to_owned()];
        // SAFETY: serialised with every other env-mutating test.
        unsafe { std::env::set_var("TEST_IRONAUDIT_CSV", "x, y,, z") };
        override_csv(&mut val, "TEST_IRONAUDIT_CSV");
        assert_eq!(val, vec!["x", "y", "z"]);
        unsafe { std::env::remove_var("TEST_IRONAUDIT_CSV") };
    }

    #[test]
    #[serial]
    fn env_override_missing_var_keeps_original() {
        let mut val = 7usize;
        unsafe { std::env::remove_var("TEST_IRONAUDIT_MISSING") };
        override_usize(&mut val, "TEST_IRONAUDIT_MISSING");
        assert_eq!(val, 7);
    }
}
