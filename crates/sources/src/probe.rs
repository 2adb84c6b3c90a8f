//! Application probe for servers and applications described by settings.
//!
//! Modules come from `name@version` specs; the version and configuration
//! are read from a JSON configuration file.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use ironaudit_core::error::{ConfigurationError, ProbeError};
use ironaudit_core::{ApplicationProbe, BoxFuture, ConfigurationTree, Package};

use crate::error::SourcesError;
use crate::json_tree::JsonConfigTree;

/// Pointer read by [`ApplicationProbe::scan_version`] unless overridden.
pub const DEFAULT_VERSION_POINTER: &str = "/version";

pub struct StaticProbe {
    modules: Vec<Package>,
    config_file: Option<PathBuf>,
    version_pointer: String,
}

impl StaticProbe {
    pub fn new(config_file: Option<PathBuf>) -> Self {
        Self {
            modules: Vec::new(),
            config_file,
            version_pointer: DEFAULT_VERSION_POINTER.to_owned(),
        }
    }

    pub fn with_modules(mut self, modules: Vec<Package>) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_version_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.version_pointer = pointer.into();
        self
    }

    async fn load_tree(&self) -> Result<JsonConfigTree, SourcesError> {
        match &self.config_file {
            Some(path) => JsonConfigTree::load(path).await,
            None => Err(SourcesError::ConfigurationParse {
                path: String::new(),
                reason: "no configuration file configured".to_owned(),
            }),
        }
    }
}

/// Parses `name@version` module specs. Scoped names (`@scope/name@1.0.0`)
/// split on the last `@`.
pub fn parse_module_specs(
    package_manager: &str,
    specs: &[String],
) -> Result<Vec<Package>, SourcesError> {
    specs
        .iter()
        .map(|spec| {
            let (name, version) = spec
                .rsplit_once('@')
                .filter(|(name, version)| !name.is_empty() && !version.is_empty())
                .ok_or_else(|| SourcesError::ModuleSpec { spec: spec.clone() })?;
            Ok(Package::new(package_manager, name, version))
        })
        .collect()
}

impl ApplicationProbe for StaticProbe {
    fn scan_modules(&self) -> BoxFuture<'_, Result<Vec<Package>, ProbeError>> {
        Box::pin(async move {
            debug!(modules = self.modules.len(), "reporting configured modules");
            Ok(self.modules.clone())
        })
    }

    fn scan_version(&self) -> BoxFuture<'_, Result<String, ProbeError>> {
        Box::pin(async move {
            let tree = self
                .load_tree()
                .await
                .map_err(|e| ProbeError::Version(e.to_string()))?;
            let node = tree.get(&self.version_pointer).ok_or_else(|| {
                ProbeError::Version(format!(
                    "no version at {} in {}",
                    self.version_pointer,
                    tree.path().display()
                ))
            })?;
            match node {
                serde_json::Value::String(s) => Ok(s.clone()),
                serde_json::Value::Number(n) => Ok(n.to_string()),
                other => Err(ProbeError::Version(format!(
                    "version at {} is not a string: {other}",
                    self.version_pointer
                ))),
            }
        })
    }

    fn parse_configuration(
        &self,
    ) -> BoxFuture<'_, Result<Arc<dyn ConfigurationTree>, ConfigurationError>> {
        Box::pin(async move {
            let tree = self.load_tree().await.map_err(ConfigurationError::from)?;
            Ok(Arc::new(tree) as Arc<dyn ConfigurationTree>)
        })
    }
}
