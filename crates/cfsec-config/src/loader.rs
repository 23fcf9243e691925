//! Layered configuration loading.
//!
//! Later layers win: built-in defaults, the per-user `config.toml`, the
//! project `cfsec.toml`, the untracked `cfsec.local.toml`, then `CFSEC_*`
//! environment variables (`CFSEC_AUDIT__RECORD_DELETES=false`). The merged
//! result is validated before it is returned.

use crate::{CfSecConfig, Paths};
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};

/// Builds a [`CfSecConfig`] from every configured layer.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_layer: bool,
}

impl ConfigLoader {
    /// Loader for the current directory with the `CFSEC` prefix.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "CFSEC".to_string(),
            user_layer: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skips the per-user config file.
    pub fn without_user_config(mut self) -> Self {
        self.user_layer = false;
        self
    }

    /// The config files that exist, lowest precedence first.
    pub fn files(&self) -> Vec<PathBuf> {
        let user = self
            .user_layer
            .then(|| Paths::new().user_config_file().ok())
            .flatten();
        user.into_iter()
            .chain([
                Paths::project_config_file(&self.project_dir),
                Paths::local_config_file(&self.project_dir),
            ])
            .filter(|path| path.exists())
            .collect()
    }

    /// Merges every layer and validates the result.
    ///
    /// A file that does not parse, a value of the wrong type, or a value that
    /// fails [`CfSecConfig::validate`] is an error; nothing falls back to the
    /// defaults.
    pub fn load(self) -> Result<CfSecConfig> {
        let defaults = Config::try_from(&CfSecConfig::default())
            .context("Failed to encode built-in defaults")?;

        let builder = self
            .files()
            .into_iter()
            .fold(Config::builder().add_source(defaults), |builder, path| {
                builder.add_source(File::from(path).format(FileFormat::Toml))
            })
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: CfSecConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config
            .validate()
            .context("Configuration failed validation")?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
