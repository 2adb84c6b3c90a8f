//! # ironaudit-engine
//!
//! Audit phase orchestrator.
//!
//! An [`Auditor`] takes an enumerated package list, removes packages
//! excluded by an audit profile, fans queries out to every attached data
//! source, reconciles affected version ranges against installed versions,
//! and for server/application targets evaluates configuration rules
//! concurrently with the package path. Each run ends in one
//! [`AuditResult`](ironaudit_core::AuditResult).
//!
//! ## Failure tiers
//!
//! - phase-fatal: the run stops and the failing phase picks the result code
//! - item-recoverable: a warning is logged and only that item is skipped
//! - soft success: no eligible vulnerability source, empty result plus a warning
//!
//! ## Modules
//!
//! - [`auditor`]: [`Auditor`] and [`AuditorBuilder`]
//! - [`plan`]: flags resolved into an [`ExecutionPlan`]
//! - [`phase`]: [`PhaseKind`] and tagged [`PhaseError`]s
//! - [`profile`]: audit profile filter
//! - [`fanout`]: concurrent data source queries and batch merge
//! - [`evaluator`]: vulnerability version range evaluation
//! - [`config_rules`]: configuration rule gating and evaluation
//! - [`loader`]: YAML rule and profile loaders
//! - [`config`]: [`AuditorConfig`] and [`AuditFlags`]

pub mod auditor;
pub mod config;
pub mod config_rules;
pub mod error;
pub mod evaluator;
pub mod fanout;
pub mod loader;
pub mod phase;
pub mod plan;
pub mod profile;

pub use auditor::{Auditor, AuditorBuilder};
pub use config::{AuditFlags, AuditorConfig, AuditorConfigBuilder};
pub use config_rules::{ConfigurationRuleEvaluator, DisableReason, RuleEvaluation};
pub use error::EngineError;
pub use evaluator::VulnerabilityEvaluator;
pub use fanout::FanOutOutcome;
pub use loader::{ProfileLoader, RuleLoader};
pub use phase::{PhaseCause, PhaseError, PhaseKind};
pub use plan::{Attachments, ExecutionPlan};
pub use profile::filter_packages;
