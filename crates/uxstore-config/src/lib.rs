//! Configuration for embedding `uxstore-core`.
//!
//! TOML config loading (defaults, file, `UXSTORE_` env overrides), the
//! translation to `uxstore_core::StoreConfig`, and the file-backed
//! preferences collaborator that loads and persists the `preferences`
//! key namespace.

pub mod preferences;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use uxstore_core::{CoreError, StoreConfig};

pub use preferences::FilePreferences;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub preferences: PreferencesSection,
}

/// `[store]` table, mirrors `StoreConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreSection {
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
    #[serde(default = "default_command_channel_size")]
    pub command_channel_size: usize,
    #[serde(default = "default_update_channel_size")]
    pub update_channel_size: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            command_channel_size: default_command_channel_size(),
            update_channel_size: default_update_channel_size(),
        }
    }
}

/// `[preferences]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PreferencesSection {
    /// Preferences file. Defaults to `preferences.toml` beside the config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Write preferences back whenever one changes.
    #[serde(default = "default_autosave")]
    pub autosave: bool,
}

impl Default for PreferencesSection {
    fn default() -> Self {
        Self {
            path: None,
            autosave: default_autosave(),
        }
    }
}

fn default_initial_capacity() -> usize {
    StoreConfig::default().initial_capacity
}
fn default_command_channel_size() -> usize {
    StoreConfig::default().command_channel_size
}
fn default_update_channel_size() -> usize {
    StoreConfig::default().update_channel_size
}
fn default_autosave() -> bool {
    true
}

impl Config {
    /// Validate the `[store]` table and build the core config.
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        let store = &self.store;
        for (field, value) in [
            ("store.command_channel_size", store.command_channel_size),
            ("store.update_channel_size", store.update_channel_size),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(StoreConfig {
            initial_capacity: store.initial_capacity,
            command_channel_size: store.command_channel_size,
            update_channel_size: store.update_channel_size,
        })
    }

    /// Resolved preferences file path.
    pub fn preferences_path(&self) -> PathBuf {
        self.preferences
            .path
            .clone()
            .unwrap_or_else(|| config_dir().join("preferences.toml"))
    }

    pub fn file_preferences(&self) -> FilePreferences {
        FilePreferences::new(self.preferences_path())
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn config_dir() -> PathBuf {
    ProjectDirs::from("com", "uxstore", "uxstore")
        .map_or_else(dirs_fallback, |dirs| dirs.config_dir().to_path_buf())
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("uxstore");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment.
///
/// Env overrides use `__` between table and field, e.g.
/// `UXSTORE_STORE__COMMAND_CHANNEL_SIZE=8`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("UXSTORE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_maps_to_default_store_config() {
        let cfg = Config::default();
        assert_eq!(cfg.store_config().unwrap(), StoreConfig::default());
        assert!(cfg.preferences.autosave);
    }

    #[test]
    fn zero_channel_size_is_rejected() {
        let mut cfg = Config::default();
        cfg.store.update_channel_size = 0;
        match cfg.store_config() {
            Err(ConfigError::Validation { field, .. }) => {
                assert_eq!(field, "store.update_channel_size");
            }
            other => panic!("expected Validation error, got: {other:?}"),
        }
    }

    #[test]
    fn explicit_preferences_path_wins() {
        let mut cfg = Config::default();
        cfg.preferences.path = Some(PathBuf::from("/tmp/prefs.toml"));
        assert_eq!(cfg.preferences_path(), PathBuf::from("/tmp/prefs.toml"));
        assert!(Config::default().preferences_path().ends_with("preferences.toml"));
    }
}
