//! Metric names and descriptions.
//!
//! Every metric recorded by the engine is named here and used with
//! `metrics::counter!()` / `metrics::histogram!()`. Nothing is exported
//! unless the embedding process installs a recorder.
//!
//! # Naming
//!
//! - prefix: `ironaudit_`
//! - suffix: `_total` (counter), `_seconds` (histogram)
//!
//! ```ignore
//! metrics::counter!(ironaudit_core::metrics::AUDIT_RUNS_TOTAL,
//!     ironaudit_core::metrics::LABEL_RESULT => "SUCCESS").increment(1);
//! ```

// ─── Label keys ──────────────────────────────────────────────────────

/// Phase name (packages, artifacts, vulnerabilities, ...)
pub const LABEL_PHASE: &str = "phase";

/// Data source name
pub const LABEL_SOURCE: &str = "source";

/// Terminal result code
pub const LABEL_RESULT: &str = "result";

// ─── Audit runs ──────────────────────────────────────────────────────

/// Completed audit runs (counter, label: result)
pub const AUDIT_RUNS_TOTAL: &str = "ironaudit_audit_runs_total";

/// Wall-clock duration of one phase (histogram, label: phase)
pub const PHASE_DURATION_SECONDS: &str = "ironaudit_phase_duration_seconds";

/// Failed phases (counter, label: phase)
pub const PHASE_FAILURES_TOTAL: &str = "ironaudit_phase_failures_total";

// ─── Package path ────────────────────────────────────────────────────

/// Packages removed by the audit profile (counter)
pub const PACKAGES_EXCLUDED_TOTAL: &str = "ironaudit_packages_excluded_total";

/// Data source queries (counter, labels: source, result)
pub const SOURCE_QUERIES_TOTAL: &str = "ironaudit_source_queries_total";

/// Vulnerabilities whose range contains an installed version (counter)
pub const VULNERABILITIES_IN_RANGE_TOTAL: &str = "ironaudit_vulnerabilities_in_range_total";

/// Recovered per-item errors: profile rules, oracle pairs, rule queries (counter, label: phase)
pub const ITEM_ERRORS_TOTAL: &str = "ironaudit_item_errors_total";

// ─── Configuration rules ─────────────────────────────────────────────

/// Evaluated configuration rules (counter)
pub const RULES_EVALUATED_TOTAL: &str = "ironaudit_rules_evaluated_total";

/// Disabled configuration rules (counter)
pub const RULES_DISABLED_TOTAL: &str = "ironaudit_rules_disabled_total";
