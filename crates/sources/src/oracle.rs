//! SemVer version range oracle.
//!
//! Range syntax accepted by [`SemverRangeOracle`]:
//!
//! - `||` separates alternatives; a version matches if any alternative matches
//! - inside an alternative, comparators are separated by whitespace or commas
//!   (`>=1.2.0 <2.0.0`, `>= 1.2, < 2`)
//! - `a - b` is an inclusive hyphen range
//! - `*`, `x` and the empty string match every version
//!
//! Each alternative is handed to [`semver::VersionReq`]; the grammar itself is
//! not reimplemented here. Installed versions that are not strict SemVer are
//! padded (`1.2` → `1.2.0`, `v3` → `3.0.0`) before comparison.

use ironaudit_core::VersionRangeOracle;
use ironaudit_core::error::VersionRangeError;
use semver::{Version, VersionReq};

/// [`VersionRangeOracle`] backed by the `semver` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverRangeOracle;

impl SemverRangeOracle {
    pub fn new() -> Self {
        Self
    }
}

impl VersionRangeOracle for SemverRangeOracle {
    fn is_in_range(&self, spec: &str, installed_version: &str) -> Result<bool, VersionRangeError> {
        let version = parse_version_lenient(installed_version)?;
        for alternative in spec.split("||") {
            let req = parse_alternative(spec, alternative)?;
            if req.matches(&version) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Parses a version, padding missing minor/patch components.
pub fn parse_version_lenient(raw: &str) -> Result<Version, VersionRangeError> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V', '=']);
    if let Ok(v) = Version::parse(trimmed) {
        return Ok(v);
    }

    // split off pre-release/build suffix before padding the numeric core
    let (core, suffix) = match trimmed.find(['-', '+']) {
        Some(pos) => trimmed.split_at(pos),
        None => (trimmed, ""),
    };
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid_version(raw, "expected 1 to 3 numeric components"));
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);

    Version::parse(&padded).map_err(|e| invalid_version(raw, &e.to_string()))
}

fn invalid_version(version: &str, reason: &str) -> VersionRangeError {
    VersionRangeError::InvalidVersion {
        version: version.to_owned(),
        reason: reason.to_owned(),
    }
}

fn parse_alternative(spec: &str, alternative: &str) -> Result<VersionReq, VersionRangeError> {
    let normalized = normalize_comparators(alternative);
    VersionReq::parse(&normalized).map_err(|e| VersionRangeError::InvalidRange {
        spec: spec.to_owned(),
        reason: e.to_string(),
    })
}

/// Rewrites one alternative into the comma-separated form `VersionReq` parses.
fn normalize_comparators(alternative: &str) -> String {
    let tokens: Vec<&str> = alternative
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() || tokens == ["x"] || tokens == ["X"] {
        return "*".to_owned();
    }

    // `a - b`
    if let [low, "-", high] = tokens.as_slice() {
        return format!(">={low}, <={high}");
    }

    let mut comparators: Vec<String> = Vec::with_capacity(tokens.len());
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => comparators.push(format!("{op}{token}")),
            None => comparators.push(token.to_owned()),
        }
    }
    if let Some(op) = pending_op {
        comparators.push(op.to_owned());
    }
    comparators.join(", ")
}
