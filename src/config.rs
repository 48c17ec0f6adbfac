//! Engine configuration.
//!
//! Loaded once from a JSON file at startup and immutable for the lifetime of
//! one engine process; changing it requires tearing the process down and
//! respawning.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("engine path is not configured")]
    MissingEnginePath,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Path to the engine binary.
    pub engine_path: String,
    /// Path to the network weights file, passed as `--weights=…`.
    pub weights_path: String,
    /// Default search depth when a request does not specify one.
    pub depth: u32,
    /// Number of candidate lines the engine reports.
    pub multipv: u32,
    pub threads: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_path: String::new(),
            weights_path: String::new(),
            depth: 20,
            multipv: 3,
            threads: 2,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a JSON file. A missing file yields the
    /// defaults; an unreadable or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A config without an engine path cannot start anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_path.is_empty() {
            return Err(ConfigError::MissingEnginePath);
        }
        Ok(())
    }
}
