//! Ledger configuration.
//!
//! Loaded from an optional TOML file; every field has a default.

use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Reported as the source service in audit events.
    pub service_name: String,

    /// Bound on every individual store call, in milliseconds.
    pub store_timeout_ms: u64,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Append audit events as JSON lines to this file.
    pub audit_path: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            service_name: "account-ledger".to_string(),
            store_timeout_ms: 5000,
            log_level: "info".to_string(),
            audit_path: None,
        }
    }
}

impl LedgerConfig {
    /// Reads a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: LedgerConfig =
            toml::from_str(text).map_err(|e| LedgerError::Config(e.to_string()))?;
        if config.store_timeout_ms == 0 {
            return Err(LedgerError::Config(
                "store_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(config)
    }

    /// Reads `path` if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
