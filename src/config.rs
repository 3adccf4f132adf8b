//! Layered configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults (optionally the downloads profile)
//! 2. TOML file: `--config`, or `safedupe/config.toml` in the platform
//!    config directory
//! 3. `SAFEDUPE_`-prefixed environment variables, nested keys split on `__`
//!    (`SAFEDUPE_POLICY__REVIEW_THRESHOLD=0.8`)
//!
//! CLI flags such as `--db` are applied on top by the caller.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::policy::{Policy, PolicyError};

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or does not match the schema.
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// An explicitly requested file does not exist.
    #[error("Config file not found: {0}")]
    Missing(PathBuf),

    /// Values are well-formed but inconsistent.
    #[error("Invalid policy: {0}")]
    Policy(#[from] PolicyError),

    /// Printing the effective configuration failed.
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Built-in policy preset used as the lowest layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Profile {
    /// [`Policy::default`]
    #[default]
    Standard,
    /// [`Policy::downloads_profile`]
    Downloads,
}

impl Profile {
    fn policy(self) -> Policy {
        match self {
            Self::Standard => Policy::default(),
            Self::Downloads => Policy::downloads_profile(),
        }
    }
}

/// Effective configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding fingerprints and the deletion ledger.
    pub store_path: PathBuf,
    /// Directory receiving backups before deletion.
    pub backup_dir: PathBuf,
    /// Deletion and indexing policy.
    pub policy: Policy,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            store_path: data_dir.join("store.db"),
            backup_dir: data_dir.join("backups"),
            policy: Policy::default(),
        }
    }
}

impl Config {
    /// Load from all layers.
    ///
    /// An explicit `file` must exist; the default file is optional.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if a layer is malformed or the policy fails validation.
    pub fn load(file: Option<&Path>, profile: Profile) -> Result<Self, ConfigError> {
        let toml_path = match file {
            Some(path) if !path.exists() => return Err(ConfigError::Missing(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };
        if let Some(path) = &toml_path {
            log::debug!("Loading config from {}", path.display());
        }
        Self::from_figment(Self::figment(toml_path.as_deref(), profile))
    }

    /// The layered figment, exposed for tests and tooling.
    #[must_use]
    pub fn figment(file: Option<&Path>, profile: Profile) -> Figment {
        let defaults = Self {
            policy: profile.policy(),
            ..Self::default()
        };
        let mut figment = Figment::from(Serialized::defaults(defaults));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("SAFEDUPE_").split("__"))
    }

    /// Extract and validate.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] or [`ConfigError::Policy`].
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.policy.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Render`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `safedupe/config.toml` in the platform config directory.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "safedupe", "safedupe").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("com", "safedupe", "safedupe")
        .map_or_else(|| PathBuf::from(".safedupe"), |dirs| dirs.data_dir().to_path_buf())
}
