//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{HotswapConfig, ServerConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate process configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<HotswapConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: HotswapConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Where each reload cycle gets its [`ServerConfig`] from.
///
/// The whole payload file becomes the response message; the bind address is
/// fixed by process configuration.
#[derive(Debug, Clone)]
pub struct PayloadSource {
    path: PathBuf,
    bind_address: String,
}

impl PayloadSource {
    pub fn new(path: impl Into<PathBuf>, bind_address: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            bind_address: bind_address.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a fresh serving configuration.
    pub fn load(&self) -> Result<ServerConfig, ConfigError> {
        let payload = fs::read(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;

        Ok(ServerConfig {
            bind_address: self.bind_address.clone(),
            payload: payload.into(),
        })
    }
}
