//! Auditor settings.
//!
//! [`AuditorConfig`] is derived from the core [`IronauditConfig`] and adds
//! engine-only tuning (fan-out channel capacity, evaluator parallelism).
//!
//! ```
//! use ironaudit_engine::{AuditFlags, AuditorConfigBuilder};
//!
//! let config = AuditorConfigBuilder::new()
//!     .flags(AuditFlags::default().list_packages(true))
//!     .evaluation_parallelism(4)
//!     .build()
//!     .unwrap();
//! assert!(config.flags.list_packages);
//! ```

use serde::{Deserialize, Serialize};

use ironaudit_core::config::{FlagsConfig, IronauditConfig};

use crate::error::EngineError;

/// Maximum fan-out channel capacity.
const MAX_CHANNEL_CAPACITY: usize = 4096;

/// Maximum number of concurrent evaluation units.
const MAX_EVALUATION_PARALLELISM: usize = 256;

/// Run-mode flags. Read once per run into an [`ExecutionPlan`](crate::plan::ExecutionPlan).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFlags {
    /// Stop after enumerating and filtering packages.
    pub list_packages: bool,
    /// Search artifacts, then stop.
    pub list_artifacts: bool,
    /// Do not audit packages against vulnerability sources.
    pub skip_packages_audit: bool,
    /// Stop after parsing the configuration.
    pub print_configuration: bool,
    /// Evaluate only local configuration rules; combined with
    /// `skip_packages_audit` on an application it drops the package path.
    pub only_local_rules: bool,
    /// Stop after loading the default configuration rules.
    pub list_configuration_rules: bool,
}

impl AuditFlags {
    pub fn list_packages(mut self, on: bool) -> Self {
        self.list_packages = on;
        self
    }

    pub fn list_artifacts(mut self, on: bool) -> Self {
        self.list_artifacts = on;
        self
    }

    pub fn skip_packages_audit(mut self, on: bool) -> Self {
        self.skip_packages_audit = on;
        self
    }

    pub fn print_configuration(mut self, on: bool) -> Self {
        self.print_configuration = on;
        self
    }

    pub fn only_local_rules(mut self, on: bool) -> Self {
        self.only_local_rules = on;
        self
    }

    pub fn list_configuration_rules(mut self, on: bool) -> Self {
        self.list_configuration_rules = on;
        self
    }
}

impl From<&FlagsConfig> for AuditFlags {
    fn from(core: &FlagsConfig) -> Self {
        Self {
            list_packages: core.list_packages,
            list_artifacts: core.list_artifacts,
            skip_packages_audit: core.skip_packages_audit,
            print_configuration: core.print_configuration,
            only_local_rules: core.only_local_rules,
            list_configuration_rules: core.list_configuration_rules,
        }
    }
}

/// Engine settings for one [`Auditor`](crate::auditor::Auditor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditorConfig {
    pub flags: AuditFlags,
    /// Capacity of the channel that carries per-source result batches.
    pub fanout_channel_capacity: usize,
    /// Number of blocking units the vulnerability evaluator splits work into.
    pub evaluation_parallelism: usize,
}

impl Default for AuditorConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(MAX_EVALUATION_PARALLELISM);
        Self {
            flags: AuditFlags::default(),
            fanout_channel_capacity: 64,
            evaluation_parallelism: parallelism,
        }
    }
}

impl AuditorConfig {
    pub fn from_core(core: &IronauditConfig) -> Self {
        Self {
            flags: AuditFlags::from(&core.flags),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.fanout_channel_capacity == 0 || self.fanout_channel_capacity > MAX_CHANNEL_CAPACITY
        {
            return Err(EngineError::Config {
                field: "fanout_channel_capacity".to_owned(),
                reason: format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            });
        }

        if self.evaluation_parallelism == 0
            || self.evaluation_parallelism > MAX_EVALUATION_PARALLELISM
        {
            return Err(EngineError::Config {
                field: "evaluation_parallelism".to_owned(),
                reason: format!("must be 1-{MAX_EVALUATION_PARALLELISM}"),
            });
        }

        Ok(())
    }
}

#[derive(Default)]
pub struct AuditorConfigBuilder {
    config: AuditorConfig,
}

impl AuditorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: AuditFlags) -> Self {
        self.config.flags = flags;
        self
    }

    pub fn fanout_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.fanout_channel_capacity = capacity;
        self
    }

    pub fn evaluation_parallelism(mut self, parallelism: usize) -> Self {
        self.config.evaluation_parallelism = parallelism;
        self
    }

    pub fn build(self) -> Result<AuditorConfig, EngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
