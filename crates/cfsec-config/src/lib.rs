//! Configuration management for CFSec
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (CFSEC_* prefix, highest precedence)
//! 2. cfsec.local.toml (gitignored, local overrides)
//! 3. cfsec.toml (git-tracked, project config)
//! 4. ~/.config/cfsec/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Longest cluster domain name the `Cluster` entity accepts.
pub const MAX_DOM_NAME_LEN: usize = 192;

/// Longest cluster description the `Cluster` entity accepts.
pub const MAX_DESCRIPTION_LEN: usize = 128;

/// Main CFSec configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CfSecConfig {
    pub audit: AuditConfig,
    pub keys: KeysConfig,
    pub logging: LoggingConfig,
    pub cluster: ClusterConfig,
}

/// Which controller actions append history rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub record_creates: bool,
    pub record_updates: bool,
    pub record_deletes: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            record_creates: true,
            record_updates: true,
            record_deletes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Generate a fresh primary key when create is handed a null one.
    pub generate_missing: bool,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            generate_missing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive string.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// The cluster row seeded at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub full_dom_name: String,
    pub description: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            full_dom_name: "localhost".to_string(),
            description: "Local cluster".to_string(),
        }
    }
}

impl CfSecConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Create a development configuration
    pub fn development() -> Self {
        Self {
            logging: LoggingConfig {
                filter: "debug,cfsec_kernel=trace".to_string(),
            },
            ..Default::default()
        }
    }

    /// Read a single TOML file without layering.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, e.g. to write a starter `cfsec.toml`.
    pub fn to_toml(&self) -> std::result::Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values that the schema would reject later anyway.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let dom_name = &self.cluster.full_dom_name;
        if dom_name.is_empty() || dom_name.chars().count() > MAX_DOM_NAME_LEN {
            return Err(ConfigError::ValidationError(format!(
                "cluster.full_dom_name must be 1..={MAX_DOM_NAME_LEN} characters"
            )));
        }

        let description = &self.cluster.description;
        if description.is_empty() || description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ConfigError::ValidationError(format!(
                "cluster.description must be 1..={MAX_DESCRIPTION_LEN} characters"
            )));
        }

        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.filter must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
