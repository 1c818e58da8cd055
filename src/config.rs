//! TOML-based configuration for the engine.
//!
//! Every knob has a serde default so an empty file (or no file) yields
//! a working configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsConfig {
    /// Maximum commits walked per side during merge-base search.
    #[serde(default = "default_max_traversal_depth")]
    pub max_traversal_depth: u32,

    /// Maximum commits inverted per rollback_range call; longer ranges
    /// are paginated by the caller.
    #[serde(default = "default_range_page_size")]
    pub range_page_size: usize,

    /// Branch names that cannot be deleted without force.
    #[serde(default = "default_protected_branches")]
    pub protected_branches: Vec<String>,

    /// Ref used as the merge base when two histories share no ancestor.
    /// The fallback is always surfaced via `no_common_ancestor`.
    #[serde(default = "default_root_ref")]
    pub default_root_ref: String,

    /// Schema assumed for unqualified names in definitions.
    #[serde(default = "default_schema")]
    pub default_schema: String,
}

fn default_max_traversal_depth() -> u32 {
    1000
}
fn default_range_page_size() -> usize {
    100
}
fn default_protected_branches() -> Vec<String> {
    vec!["main".to_string()]
}
fn default_root_ref() -> String {
    "main".to_string()
}
fn default_schema() -> String {
    "public".to_string()
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            max_traversal_depth: default_max_traversal_depth(),
            range_page_size: default_range_page_size(),
            protected_branches: default_protected_branches(),
            default_root_ref: default_root_ref(),
            default_schema: default_schema(),
        }
    }
}

impl VcsConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&raw)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load from a file if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
