//! Shadow configuration loaded from RON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default buffer size for shadow copies, in bytes.
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 10_240;

/// How shadows are materialized and where they live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Directory holding shadow copies. `None` uses a fresh temporary
    /// directory that is removed when the scratch area closes.
    pub scratch_dir: Option<PathBuf>,

    /// Buffer size for copying backend content into a shadow
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,

    /// Remove orphaned shadows when opening an existing scratch directory
    pub reap_on_open: bool,
}

fn default_copy_buffer_size() -> usize {
    DEFAULT_COPY_BUFFER_SIZE
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            reap_on_open: false,
        }
    }
}

impl ShadowConfig {
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size;
        self
    }

    pub fn with_reap_on_open(mut self, reap: bool) -> Self {
        self.reap_on_open = reap;
        self
    }

    /// Parse from a RON string. Missing fields take their defaults.
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(s)?)
    }

    /// Load from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}
