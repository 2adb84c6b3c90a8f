//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// ironaudit: audit installed packages and server configuration.
///
/// Use `ironaudit <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ironaudit", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ironaudit.toml settings file. Without it, `./ironaudit.toml`
    /// is used when present, otherwise built-in defaults.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one audit.
    Audit(AuditArgs),

    /// Inspect default configuration rules.
    Rules(RulesArgs),

    /// Manage settings.
    Config(ConfigArgs),
}

// ---- audit ----

/// Settings overrides and run-mode flags for one audit.
///
/// Every option overrides the matching `ironaudit.toml` field.
#[derive(Args, Debug, Default)]
pub struct AuditArgs {
    /// Lockfile to enumerate packages from (Cargo.lock, package-lock.json).
    #[arg(long)]
    pub lockfile: Option<PathBuf>,

    /// Package manager id of the target.
    #[arg(long)]
    pub package_manager: Option<String>,

    /// Directory of `{package_manager}.json` vulnerability files.
    #[arg(long)]
    pub vuln_db: Option<PathBuf>,

    /// Audit profile (YAML).
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Directory of default configuration rules (YAML).
    #[arg(long)]
    pub rules_dir: Option<PathBuf>,

    /// Write the audit summary to this JSON file.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Target kind.
    #[arg(long)]
    pub kind: Option<TargetKindArg>,

    /// Server or application name.
    #[arg(long)]
    pub name: Option<String>,

    /// Known target version; wins over the detected one.
    #[arg(long)]
    pub target_version: Option<String>,

    /// Server/application configuration file (JSON).
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Installed module as name@version. Repeatable.
    #[arg(long = "module")]
    pub modules: Vec<String>,

    /// Audit an application in development mode.
    #[arg(long)]
    pub app_development_mode: bool,

    /// Only enumerate packages.
    #[arg(long)]
    pub list_packages: bool,

    /// Enumerate packages and list matching artifacts.
    #[arg(long)]
    pub list_artifacts: bool,

    /// Skip the package vulnerability path.
    #[arg(long)]
    pub skip_packages_audit: bool,

    /// Print the parsed configuration and stop.
    #[arg(long)]
    pub print_configuration: bool,

    /// Do not run analyzers.
    #[arg(long)]
    pub only_local_rules: bool,

    /// List the default configuration rules without evaluating them.
    #[arg(long)]
    pub list_configuration_rules: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetKindArg {
    Packages,
    Server,
    Application,
}

impl TargetKindArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Packages => "packages",
            Self::Server => "server",
            Self::Application => "application",
        }
    }
}

// ---- rules ----

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List the default configuration rules.
    List {
        /// Rules directory (default: `audit.rules_dir`).
        #[arg(long)]
        path: Option<PathBuf>,

        /// Show only one module.
        #[arg(long)]
        module: Option<String>,
    },
    /// Validate every rule file and report per-file errors.
    Validate {
        /// Rules directory (default: `audit.rules_dir`).
        path: Option<PathBuf>,
    },
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the settings file and report errors.
    Validate,
    /// Show the effective settings (file + env overrides + defaults).
    Show {
        /// Show only one section (general, audit, flags, target).
        #[arg(long)]
        section: Option<String>,
    },
}
