//! `ironaudit rules` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use ironaudit_core::{ConfigurationRule, IronauditConfig};
use ironaudit_engine::RuleLoader;

use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config: &IronauditConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let default_dir = || PathBuf::from(&config.audit.rules_dir);
    match args.action {
        RulesAction::List { path, module } => {
            let dir = path.unwrap_or_else(default_dir);
            let report = list(&dir, config.audit.max_rule_files, module.as_deref()).await?;
            writer.render(&report)
        }
        RulesAction::Validate { path } => {
            let dir = path.unwrap_or_else(default_dir);
            let report = validate(&dir).await?;
            writer.render(&report)?;
            if report.invalid > 0 {
                return Err(CliError::Rule(format!(
                    "{} invalid rule files",
                    report.invalid
                )));
            }
            Ok(())
        }
    }
}

/// Load a rules directory, optionally keeping one module.
pub async fn list(
    dir: &Path,
    max_files: usize,
    module: Option<&str>,
) -> Result<RuleListReport, CliError> {
    info!(dir = %dir.display(), "loading configuration rules");

    let modules = RuleLoader::load_directory(dir, max_files).await?;
    let rules: Vec<RuleListEntry> = modules
        .into_iter()
        .filter(|(name, _)| module.is_none_or(|wanted| wanted == name.as_str()))
        .flat_map(|(_, rules)| rules)
        .map(RuleListEntry::from)
        .collect();

    Ok(RuleListReport {
        dir: dir.display().to_string(),
        total: rules.len(),
        rules,
    })
}

/// Parse every rule file on its own and collect per-file errors.
pub async fn validate(dir: &Path) -> Result<RuleValidationReport, CliError> {
    info!(dir = %dir.display(), "validating configuration rules");

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CliError::Rule(format!("cannot read {}: {e}", dir.display())))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path
            .extension()
            .is_some_and(|ext| ext == "yml" || ext == "yaml")
        {
            files.push(path);
        }
    }
    files.sort();

    let mut report = RuleValidationReport {
        path: dir.display().to_string(),
        total_files: files.len(),
        valid: 0,
        invalid: 0,
        rules: 0,
        errors: Vec::new(),
    };
    for file in files {
        match RuleLoader::load_file(&file).await {
            Ok(loaded) => {
                report.valid += 1;
                report.rules += loaded.rules.len();
            }
            Err(e) => {
                report.invalid += 1;
                report.errors.push(RuleFileError {
                    file: file.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

#[derive(Serialize)]
pub struct RuleListReport {
    pub dir: String,
    pub total: usize,
    pub rules: Vec<RuleListEntry>,
}

#[derive(Serialize)]
pub struct RuleListEntry {
    pub module: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub versions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl From<ConfigurationRule> for RuleListEntry {
    fn from(rule: ConfigurationRule) -> Self {
        Self {
            module: rule.module_name,
            title: rule.title,
            platform: rule.platform.map(String::from),
            versions: rule.versions,
            query: rule.xpath_test,
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Configuration Rules ({} total, {})",
            self.total.to_string().bold(),
            self.dir
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<16} {:<40} {:<10} {:<16} Query",
            "Module", "Title", "Platform", "Versions"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;

        for r in &self.rules {
            let query = match r.query {
                Some(ref q) => q.normal(),
                None => "(none)".yellow(),
            };
            writeln!(
                w,
                "{:<16} {:<40} {:<10} {:<16} {}",
                r.module,
                r.title,
                r.platform.as_deref().unwrap_or("any"),
                if r.versions.is_empty() {
                    "any".to_owned()
                } else {
                    r.versions.join(", ")
                },
                query
            )?;
        }

        Ok(())
    }
}

#[derive(Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub total_files: usize,
    pub valid: usize,
    pub invalid: usize,
    pub rules: usize,
    pub errors: Vec<RuleFileError>,
}

#[derive(Serialize)]
pub struct RuleFileError {
    pub file: String,
    pub error: String,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(
            w,
            "  Files: {} total, {} valid, {} invalid",
            self.total_files,
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            }
        )?;
        writeln!(w, "  Rules: {}", self.rules)?;

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "Errors:")?;
            for e in &self.errors {
                writeln!(w, "  {}: {}", e.file.red(), e.error)?;
            }
        }

        Ok(())
    }
}
