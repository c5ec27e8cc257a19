//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (not handled here)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. An explicit path (the `--config` flag)
//! 2. `$DEPFOREST_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/depforest/config.toml`
//! 4. `~/.depforest/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use depforest::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("workers: {}", config.workers());
//! println!("manifest: {}", config.manifest_path().display());
//! ```

pub mod schema;

pub use schema::{CloneDefaults, ToolConfig};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default manifest location relative to a working tree.
pub const DEFAULT_MANIFEST_PATH: &str = "eng/Version.Details.xml";

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 4;

/// Default retries for transport-class fetch failures.
pub const DEFAULT_FETCH_RETRIES: u32 = 2;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded configuration.
///
/// Accessor methods apply defaults for anything the file leaves out.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents
    pub file: ToolConfig,
    /// Path the configuration was loaded from, if any
    source: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Missing files in the default locations
    /// are not an error (defaults are used).
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed
    /// or validated.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let path = match explicit {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => return Err(ConfigError::NotFound(path.to_path_buf())),
            None => Self::find_default(),
        };

        let Some(path) = path else {
            return Ok(Config::default());
        };

        let file = Self::read_config(&path)?;
        file.validate()?;

        Ok(Config {
            file,
            source: Some(path),
        })
    }

    /// Search the default locations.
    fn find_default() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("DEPFOREST_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("depforest/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".depforest/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Read and parse a config file.
    fn read_config(path: &Path) -> Result<ToolConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Path the configuration was loaded from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    fn clone_defaults(&self) -> Option<&CloneDefaults> {
        self.file.clone.as_ref()
    }

    /// Maximum dependency depth.
    ///
    /// Defaults to unbounded (`u32::MAX`).
    pub fn depth(&self) -> u32 {
        self.clone_defaults()
            .and_then(|c| c.depth)
            .unwrap_or(u32::MAX)
    }

    /// Worker pool size.
    ///
    /// Defaults to [`DEFAULT_WORKERS`].
    pub fn workers(&self) -> usize {
        self.clone_defaults()
            .and_then(|c| c.workers)
            .unwrap_or(DEFAULT_WORKERS)
    }

    /// Whether toolset dependencies are traversed.
    ///
    /// Defaults to `false`.
    pub fn include_toolset(&self) -> bool {
        self.clone_defaults()
            .and_then(|c| c.include_toolset)
            .unwrap_or(false)
    }

    /// Retries for transport-class fetch failures.
    ///
    /// Defaults to [`DEFAULT_FETCH_RETRIES`].
    pub fn fetch_retries(&self) -> u32 {
        self.clone_defaults()
            .and_then(|c| c.fetch_retries)
            .unwrap_or(DEFAULT_FETCH_RETRIES)
    }

    /// Manifest location relative to a working tree.
    ///
    /// Defaults to [`DEFAULT_MANIFEST_PATH`].
    pub fn manifest_path(&self) -> PathBuf {
        PathBuf::from(
            self.clone_defaults()
                .and_then(|c| c.manifest_path.as_deref())
                .unwrap_or(DEFAULT_MANIFEST_PATH),
        )
    }
}
