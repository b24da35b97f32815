use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::DrafterError;

/// Top-level Drafter configuration, stored at `~/.drafter/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrafterConfig {
    /// Lease length granted to a file lock.
    #[serde(default = "default_lock_ttl_minutes")]
    pub lock_ttl_minutes: u64,

    /// Interval between heartbeat renewals of a held lock.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Interval between sweeps for expired locks.
    #[serde(default = "default_sweep_minutes")]
    pub sweep_minutes: u64,

    /// Project the CLI operates on when `--project` is not given.
    #[serde(default)]
    pub active_project: Option<Uuid>,

    /// User the CLI acts as when `--user` is not given.
    #[serde(default)]
    pub active_user: Option<Uuid>,
}

fn default_lock_ttl_minutes() -> u64 {
    30
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_sweep_minutes() -> u64 {
    5
}

impl Default for DrafterConfig {
    fn default() -> Self {
        Self {
            lock_ttl_minutes: 30,
            heartbeat_secs: 30,
            sweep_minutes: 5,
            active_project: None,
            active_user: None,
        }
    }
}

impl DrafterConfig {
    /// Returns the Drafter home directory (`~/.drafter/`).
    pub fn home_dir() -> Result<PathBuf, DrafterError> {
        let base = dirs::home_dir().ok_or_else(|| DrafterError::Config {
            message: "could not determine home directory".into(),
        })?;
        Ok(base.join(".drafter"))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Result<PathBuf, DrafterError> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Returns the path to the database file.
    pub fn db_path() -> Result<PathBuf, DrafterError> {
        Ok(Self::home_dir()?.join("drafter.db"))
    }

    /// Load config from the default location, or return defaults if not found.
    pub fn load() -> Result<Self, DrafterError> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, DrafterError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| DrafterError::Serialization(e.to_string()))
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<(), DrafterError> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), DrafterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| DrafterError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Initialize the Drafter home directory with default config.
    pub fn init() -> Result<PathBuf, DrafterError> {
        let home = Self::home_dir()?;
        std::fs::create_dir_all(&home)?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            Self::default().save_to(&config_path)?;
        }

        Ok(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrip() {
        let config = DrafterConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: DrafterConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config.lock_ttl_minutes, deserialized.lock_ttl_minutes);
        assert_eq!(config.heartbeat_secs, deserialized.heartbeat_secs);
        assert_eq!(config.sweep_minutes, deserialized.sweep_minutes);
        assert!(deserialized.active_project.is_none());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: DrafterConfig = toml::from_str("lock_ttl_minutes = 10\n").unwrap();
        assert_eq!(parsed.lock_ttl_minutes, 10);
        assert_eq!(parsed.heartbeat_secs, 30);
        assert_eq!(parsed.sweep_minutes, 5);
    }
}
