//! Combined configuration for the `kagami` binary.

use std::path::Path;

use anyhow::{Context, Result};
use kagami_telemetry::LogConfig;
use kagami_vfs::{ConfigError, ShadowConfig};
use serde::{Deserialize, Serialize};

/// Everything `kagami` reads from its RON config file.
///
/// ```ron
/// (
///     shadow: (scratch_dir: Some("/var/tmp/kagami"), reap_on_open: true),
///     log: (filter: "kagami_vfs=debug,info"),
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KagamiConfig {
    pub shadow: ShadowConfig,
    pub log: LogConfig,
}

impl KagamiConfig {
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_ron(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
