//! # Migration Configuration
//!
//! Configuration for the data migration engine and the `tessera-migrate` CLI.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Command-line flags (highest priority, CLI only)                    │
//! │     --db ./tessera.db  --source ./export.json                          │
//! │                                                                         │
//! │  2. Environment Variables                                              │
//! │     TESSERA_DB_PATH, TESSERA_SOURCE_PATH, TESSERA_BATCH_SIZE,          │
//! │     TESSERA_CHECKPOINT_INTERVAL, TESSERA_MIGRATION_VERSION             │
//! │                                                                         │
//! │  3. TOML Config File                                                   │
//! │     ~/.config/tessera-pos/migration.toml (Linux)                       │
//! │     ~/Library/Application Support/com.tessera.pos/migration.toml       │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! │     batch_size = 100, checkpoint_interval = 100, current_version = 1   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # migration.toml
//! [database]
//! path = "/var/lib/tessera/tessera.db"
//!
//! [source]
//! export_path = "/var/lib/tessera/legacy-export.json"
//!
//! [migration]
//! batch_size = 100
//! checkpoint_interval = 100
//! current_version = 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use tessera_core::{BATCH_SIZE, CHECKPOINT_INTERVAL, CURRENT_MIGRATION_VERSION};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Sections
// =============================================================================

/// Destination database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "tessera", "pos")
        .map(|dirs| dirs.data_dir().join("tessera.db"))
        .unwrap_or_else(|| PathBuf::from("tessera.db"))
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
        }
    }
}

/// Legacy store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Export file of the legacy document store.
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

/// Copy tuning and versioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Records per destination transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum records between two checkpoint writes.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Data format version a completed run is stamped with.
    #[serde(default = "default_current_version")]
    pub current_version: i64,
}

fn default_batch_size() -> usize {
    BATCH_SIZE
}
fn default_checkpoint_interval() -> usize {
    CHECKPOINT_INTERVAL
}
fn default_current_version() -> i64 {
    CURRENT_MIGRATION_VERSION
}

impl Default for MigrationSettings {
    fn default() -> Self {
        MigrationSettings {
            batch_size: default_batch_size(),
            checkpoint_interval: default_checkpoint_interval(),
            current_version: default_current_version(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete migration configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub source: SourceSettings,

    #[serde(default)]
    pub migration: MigrationSettings,
}

impl MigrationConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (migration.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading migration config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DbResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DbError::config("No config path available"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Migration config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        let m = &self.migration;

        if m.batch_size == 0 {
            return Err(DbError::config("batch_size must be greater than 0"));
        }

        if m.checkpoint_interval == 0 {
            return Err(DbError::config("checkpoint_interval must be greater than 0"));
        }

        // Checkpoints are written between batches, never inside one
        if m.batch_size > m.checkpoint_interval {
            return Err(DbError::config(format!(
                "batch_size ({}) must not exceed checkpoint_interval ({})",
                m.batch_size, m.checkpoint_interval
            )));
        }

        if m.current_version < 1 {
            return Err(DbError::config("current_version must be at least 1"));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("TESSERA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(path) = var("TESSERA_SOURCE_PATH") {
            debug!(path = %path, "Overriding source export from environment");
            self.source.export_path = Some(PathBuf::from(path));
        }

        if let Some(size) = var("TESSERA_BATCH_SIZE") {
            match size.parse() {
                Ok(n) => self.migration.batch_size = n,
                Err(_) => warn!(value = %size, "Ignoring invalid TESSERA_BATCH_SIZE"),
            }
        }

        if let Some(interval) = var("TESSERA_CHECKPOINT_INTERVAL") {
            match interval.parse() {
                Ok(n) => self.migration.checkpoint_interval = n,
                Err(_) => warn!(value = %interval, "Ignoring invalid TESSERA_CHECKPOINT_INTERVAL"),
            }
        }

        if let Some(version) = var("TESSERA_MIGRATION_VERSION") {
            match version.parse() {
                Ok(v) => self.migration.current_version = v,
                Err(_) => warn!(value = %version, "Ignoring invalid TESSERA_MIGRATION_VERSION"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tessera", "pos")
            .map(|dirs| dirs.config_dir().join("migration.toml"))
    }

    /// Pool settings for the configured database.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
    }
}
