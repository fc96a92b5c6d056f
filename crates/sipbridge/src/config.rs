//! Bridge configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::error::Result;

/// Environment variable overriding [`BridgeConfig::log_filter`].
pub const LOG_FILTER_ENV: &str = "SIPBRIDGE_LOG";

/// What a dispatch shim does when a listener handler panics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPanicPolicy {
    /// Log at error level and keep dispatching (default)
    #[default]
    Log,
    /// Log, then abort the process
    Abort,
}

/// Bridge configuration, loadable from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// `tracing` filter directive (default: "info")
    pub log_filter: String,

    /// Route the engine's own log output into `tracing` (default: false)
    pub forward_native_logs: bool,

    /// Handler panic policy for dispatch shims (default: log)
    pub dispatch_panic: DispatchPanicPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            forward_native_logs: false,
            dispatch_panic: DispatchPanicPolicy::Log,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("log_filter must not be empty")]
    EmptyLogFilter,

    #[error("invalid log_filter '{filter}': {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

impl BridgeConfig {
    /// Parses TOML, applies environment overrides and validates.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(source)?;
        config.apply_overrides(std::env::var(LOG_FILTER_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("loading bridge config from {}", path.display());
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    fn apply_overrides(&mut self, log_filter: Option<String>) {
        if let Some(filter) = log_filter.filter(|filter| !filter.trim().is_empty()) {
            self.log_filter = filter;
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.log_filter.trim().is_empty() {
            return Err(ConfigValidationError::EmptyLogFilter);
        }
        EnvFilter::try_new(&self.log_filter).map_err(|e| ConfigValidationError::InvalidLogFilter {
            filter: self.log_filter.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
