//! Configuration management with file persistence

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::{DEFAULT_ID_FLOOR, DatabaseConfig, default_database_path};

/// Store configuration, persisted as TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database: DatabaseSection,
    pub bootstrap: BootstrapSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Path to the SQLite database file
    pub path: PathBuf,
    /// Maximum number of pooled connections
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSection {
    /// Engine-assigned user and group ids start above this floor, keeping
    /// them clear of fixture and seed data
    pub id_floor: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseSection {
                path: default_database_path(),
                max_connections: 5,
            },
            bootstrap: BootstrapSection {
                id_floor: DEFAULT_ID_FLOOR,
            },
        }
    }
}

impl StoreConfig {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("parley").join("store.toml")
        } else {
            PathBuf::from("store.toml")
        }
    }

    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config file: {path:?}"))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {parent:?}"))?;
        }

        let raw = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, raw).with_context(|| format!("Failed to write config file: {path:?}"))
    }

    /// Translate into the database-layer configuration
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::with_path(&self.database.path)
            .max_connections(self.database.max_connections)
            .id_floor(self.bootstrap.id_floor)
    }
}
