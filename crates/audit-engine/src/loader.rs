//! YAML loaders for default configuration rules and audit profiles.
//!
//! A rule directory holds `.yml`/`.yaml` files, one module per file:
//!
//! ```yaml
//! module: core
//! rules:
//!   - title: Debug endpoint disabled
//!     xpath_test: /debug == false
//!     platform: linux
//!     versions: [">=1.20"]
//! ```
//!
//! A file that fails to load is logged and skipped.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use ironaudit_core::{
    AuditProfile, AuditTarget, BoxFuture, ConfigurationRule, RuleError, RuleSource,
};

const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;

/// Contents of one rule file.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleFile {
    pub module: String,
    #[serde(default)]
    pub rules: Vec<ConfigurationRule>,
}

/// Loads default configuration rules from a directory.
///
/// When `<dir>/<target name>` exists it is used instead of `dir`, so one
/// rules root can serve several server kinds.
#[derive(Debug, Clone)]
pub struct RuleLoader {
    dir: PathBuf,
    max_files: usize,
}

impl RuleLoader {
    pub fn new(dir: impl Into<PathBuf>, max_files: usize) -> Self {
        Self {
            dir: dir.into(),
            max_files,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn resolve_dir(&self, target: &AuditTarget) -> PathBuf {
        let per_target = self.dir.join(&target.name);
        match tokio::fs::metadata(&per_target).await {
            Ok(meta) if meta.is_dir() => per_target,
            _ => self.dir.clone(),
        }
    }

    /// Loads every rule file in `dir`, grouped by module.
    ///
    /// # Errors
    /// - the directory cannot be read
    /// - more than `max_files` rule files, or more than 10 000 rules
    pub async fn load_directory(
        dir: impl AsRef<Path>,
        max_files: usize,
    ) -> Result<BTreeMap<String, Vec<ConfigurationRule>>, RuleError> {
        let dir = dir.as_ref();

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuleError::NotFound {
                    path: dir.display().to_string(),
                }
            } else {
                RuleError::Io {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory: {e}"),
                }
            }
        })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| RuleError::Io {
            path: dir.display().to_string(),
            reason: format!("failed to read directory entry: {e}"),
        })? {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml")
            {
                paths.push(path);
            }
        }
        if paths.len() > max_files {
            return Err(RuleError::LimitExceeded {
                count: paths.len(),
                max: max_files,
            });
        }
        paths.sort();

        let mut modules: BTreeMap<String, Vec<ConfigurationRule>> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut total = 0usize;

        for path in paths {
            let file = match Self::load_file(&path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file, skipping");
                    continue;
                }
            };

            for rule in file.rules {
                if !seen.insert((rule.module_name.clone(), rule.title.clone())) {
                    warn!(rule = %rule, path = %path.display(), "duplicate rule title, skipping");
                    continue;
                }
                total += 1;
                if total > MAX_RULES_COUNT {
                    return Err(RuleError::LimitExceeded {
                        count: total,
                        max: MAX_RULES_COUNT,
                    });
                }
                modules.entry(rule.module_name.clone()).or_default().push(rule);
            }
        }

        info!(
            dir = %dir.display(),
            modules = modules.len(),
            rules = total,
            "loaded configuration rules"
        );
        Ok(modules)
    }

    /// Loads a single rule file.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<RuleFile, RuleError> {
        let path = path.as_ref();
        let content = read_capped(path).await?;
        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// Parses a rule file and stamps each rule with its module name.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<RuleFile, RuleError> {
        let mut file: RuleFile = serde_yaml::from_str(yaml_str).map_err(|e| RuleError::Parse {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })?;

        if file.module.trim().is_empty() {
            return Err(RuleError::Invalid {
                title: source.to_owned(),
                reason: "module must not be empty".to_owned(),
            });
        }

        for rule in &mut file.rules {
            if rule.title.trim().is_empty() {
                return Err(RuleError::Invalid {
                    title: rule.title.clone(),
                    reason: format!("rule in module '{}' has an empty title", file.module),
                });
            }
            rule.module_name.clone_from(&file.module);
        }
        debug!(source, module = %file.module, rules = file.rules.len(), "parsed rule file");
        Ok(file)
    }
}

impl RuleSource for RuleLoader {
    fn load_rules<'a>(
        &'a self,
        target: &'a AuditTarget,
    ) -> BoxFuture<'a, Result<BTreeMap<String, Vec<ConfigurationRule>>, RuleError>> {
        Box::pin(async move {
            let dir = self.resolve_dir(target).await;
            Self::load_directory(&dir, self.max_files).await
        })
    }
}

/// Loads a YAML audit profile.
pub struct ProfileLoader;

impl ProfileLoader {
    pub async fn load(path: impl AsRef<Path>) -> Result<AuditProfile, RuleError> {
        let path = path.as_ref();
        let content = read_capped(path).await?;
        Self::parse_yaml(&content, &path.display().to_string())
    }

    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<AuditProfile, RuleError> {
        let profile: AuditProfile =
            serde_yaml::from_str(yaml_str).map_err(|e| RuleError::Parse {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        for rule in &profile.rules {
            if rule.target.trim().is_empty() || rule.match_name.is_empty() {
                return Err(RuleError::Invalid {
                    title: rule.match_name.clone(),
                    reason: "profile rules need a target and a match_name".to_owned(),
                });
            }
        }
        Ok(profile)
    }
}

async fn read_capped(path: &Path) -> Result<String, RuleError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RuleError::NotFound {
                path: path.display().to_string(),
            }
        } else {
            RuleError::Io {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            }
        }
    })?;

    if metadata.len() > MAX_RULE_FILE_SIZE {
        return Err(RuleError::Io {
            path: path.display().to_string(),
            reason: format!(
                "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                metadata.len()
            ),
        });
    }

    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RuleError::Io {
            path: path.display().to_string(),
            reason: format!("failed to read file: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironaudit_core::Platform;

    const CORE_RULES: &str = r#"
module: core
rules:
  - title: Debug disabled
    summary: Debug endpoints leak internals
    xpath_test: /debug == false
    platform: linux
    versions: [">=1.0.0"]
  - title: Manual review
"#;

    #[test]
    fn parse_valid_rule_file() {
        let file = RuleLoader::parse_yaml(CORE_RULES, "core.yml").unwrap();
        assert_eq!(file.module, "core");
        assert_eq!(file.rules.len(), 2);
        let debug = &file.rules[0];
        assert_eq!(debug.module_name, "core");
        assert_eq!(debug.platform, Some(Platform::Linux));
        assert_eq!(debug.xpath_test.as_deref(), Some("/debug == false"));
        assert!(file.rules[1].xpath_test.is_none());
    }

    #[test]
    fn parse_invalid_yaml_returns_error() {
        let result = RuleLoader::parse_yaml("not: [valid: yaml: {{{", "bad.yml");
        assert!(matches!(result, Err(RuleError::Parse { .. })));
    }

    #[test]
    fn empty_title_is_rejected() {
        let yaml = "module: core\nrules:\n  - title: \"\"\n";
        assert!(matches!(
            RuleLoader::parse_yaml(yaml, "empty.yml"),
            Err(RuleError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn load_nonexistent_directory_returns_not_found() {
        let result = RuleLoader::load_directory("/nonexistent/path/rules", 10).await;
        assert!(matches!(result, Err(RuleError::NotFound { .. })));
    }

    #[tokio::test]
    async fn bad_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("core.yml"), CORE_RULES).unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "module: [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let rules = RuleLoader::load_directory(dir.path(), 10).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules["core"].len(), 2);
    }

    #[tokio::test]
    async fn duplicate_titles_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yml"), CORE_RULES).unwrap();
        std::fs::write(dir.path().join("b.yml"), CORE_RULES).unwrap();

        let rules = RuleLoader::load_directory(dir.path(), 10).await.unwrap();
        assert_eq!(rules["core"].len(), 2);
    }

    #[tokio::test]
    async fn file_limit_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            std::fs::write(dir.path().join(format!("m{i}.yml")), format!("module: m{i}\n")).unwrap();
        }
        let result = RuleLoader::load_directory(dir.path(), 2).await;
        assert!(matches!(result, Err(RuleError::LimitExceeded { count: 3, max: 2 })));
    }

    #[tokio::test]
    async fn rule_source_prefers_target_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("generic.yml"), "module: generic\nrules:\n  - title: g\n")
            .unwrap();
        std::fs::create_dir(dir.path().join("nginx")).unwrap();
        std::fs::write(dir.path().join("nginx").join("http.yml"), "module: http\nrules:\n  - title: h\n")
            .unwrap();

        let loader = RuleLoader::new(dir.path(), 10);
        let nginx = loader
            .load_rules(&AuditTarget::server("nginx", "dpkg"))
            .await
            .unwrap();
        assert!(nginx.contains_key("http"));
        assert!(!nginx.contains_key("generic"));

        let other = loader
            .load_rules(&AuditTarget::server("httpd", "dpkg"))
            .await
            .unwrap();
        assert!(other.contains_key("generic"));
    }

    #[test]
    fn profile_parses_and_validates() {
        let yaml = r#"
rules:
  - target: npm
    match_name: "^lodash$"
    match_version: "<4.17.21"
  - category: include
    target: npm
    match_name: ".*"
"#;
        let profile = ProfileLoader::parse_yaml(yaml, "profile.yml").unwrap();
        assert_eq!(profile.rules.len(), 2);
        assert!(profile.rules[0].is_exclude());
        assert!(!profile.rules[1].is_exclude());

        let missing_target = "rules:\n  - target: \"\"\n    match_name: x\n";
        assert!(ProfileLoader::parse_yaml(missing_target, "p.yml").is_err());
    }
}
