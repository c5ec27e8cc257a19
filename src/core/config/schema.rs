//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Location
//!
//! In order of precedence:
//! 1. `--config <path>` on the command line
//! 2. `$DEPFOREST_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/depforest/config.toml`
//! 4. `~/.depforest/config.toml`
//!
//! # Validation
//!
//! Config values are validated after parsing (e.g., `workers` must be at
//! least one, the manifest path must be relative).

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Tool configuration (user scope).
///
/// # Example
///
/// ```toml
/// [clone]
/// depth = 10
/// workers = 8
/// include_toolset = false
/// fetch_retries = 2
/// manifest_path = "eng/Version.Details.xml"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Clone defaults
    pub clone: Option<CloneDefaults>,
}

impl ToolConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(clone) = &self.clone {
            clone.validate()?;
        }
        Ok(())
    }
}

/// Clone command defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CloneDefaults {
    /// Maximum dependency depth (unbounded when absent)
    pub depth: Option<u32>,

    /// Worker pool size for fetch and checkout
    pub workers: Option<usize>,

    /// Traverse toolset dependencies
    pub include_toolset: Option<bool>,

    /// Retries for transport-class fetch failures
    pub fetch_retries: Option<u32>,

    /// Manifest location relative to a working tree
    pub manifest_path: Option<String>,
}

impl CloneDefaults {
    /// Validate the clone defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidValue(
                "clone.workers must be at least 1".to_string(),
            ));
        }

        if let Some(manifest) = &self.manifest_path {
            if manifest.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "clone.manifest_path cannot be empty".to_string(),
                ));
            }
            let path = Path::new(manifest);
            if path.is_absolute() || path.components().any(|c| c.as_os_str() == "..") {
                return Err(ConfigError::InvalidValue(format!(
                    "clone.manifest_path '{}' must be relative to the working tree",
                    manifest
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses() {
        let config: ToolConfig = toml::from_str("").unwrap();
        assert_eq!(config, ToolConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_config_parses() {
        let toml = r#"
            [clone]
            depth = 3
            workers = 8
            include_toolset = true
            fetch_retries = 0
            manifest_path = "eng/deps.xml"
        "#;
        let config: ToolConfig = toml::from_str(toml).unwrap();
        let clone = config.clone.unwrap();
        assert_eq!(clone.depth, Some(3));
        assert_eq!(clone.workers, Some(8));
        assert_eq!(clone.include_toolset, Some(true));
        assert_eq!(clone.fetch_retries, Some(0));
        assert_eq!(clone.manifest_path.as_deref(), Some("eng/deps.xml"));
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<ToolConfig, _> = toml::from_str("[clone]\nshallow = true\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let defaults = CloneDefaults {
            workers: Some(0),
            ..Default::default()
        };
        assert!(defaults.validate().is_err());
    }

    #[test]
    fn escaping_manifest_path_rejected() {
        for bad in ["", "/etc/deps.toml", "../deps.toml", "eng/../../x.toml"] {
            let defaults = CloneDefaults {
                manifest_path: Some(bad.to_string()),
                ..Default::default()
            };
            assert!(defaults.validate().is_err(), "{bad} should be rejected");
        }
    }
}
