//! Command handlers -- one module per subcommand

pub mod audit;
pub mod config;
pub mod rules;

use std::fmt;
use std::path::{Path, PathBuf};

use ironaudit_core::IronauditConfig;
use ironaudit_core::error::IronauditError;

/// Settings file picked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "ironaudit.toml";

/// Where the effective settings come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Built-in defaults plus environment overrides.
    Defaults,
}

impl ConfigSource {
    /// An explicit path always wins, then `./ironaudit.toml` when present.
    pub async fn resolve(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return Self::File(path.to_path_buf());
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        match tokio::fs::try_exists(&fallback).await {
            Ok(true) => Self::File(fallback),
            _ => Self::Defaults,
        }
    }

    pub async fn load(&self) -> Result<IronauditConfig, IronauditError> {
        match self {
            Self::File(path) => IronauditConfig::load(path).await,
            Self::Defaults => {
                let mut config = IronauditConfig::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => f.write_str("(built-in defaults)"),
        }
    }
}
