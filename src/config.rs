use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::db::{Connection, OpenMode, OpenOptions};
use crate::core::{Error, Result};

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub sqlite: Option<SqliteConfig>,
}

/// SQLite connection settings. Every field is optional; unset fields keep
/// the [`OpenOptions`] defaults.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteConfig {
    pub mode: Option<OpenMode>,
    pub uri: Option<bool>,
    pub wal: Option<bool>,
    pub busy_timeout_ms: Option<u64>,
    pub foreign_keys: Option<bool>,
    pub interrupt_check_ops: Option<u32>,
}

impl SqliteConfig {
    /// Builds the open options these settings describe.
    pub fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        if let Some(mode) = self.mode {
            options.mode(mode);
        }
        if let Some(uri) = self.uri {
            options.uri(uri);
        }
        if let Some(wal) = self.wal {
            options.wal(wal);
        }
        if let Some(ms) = self.busy_timeout_ms {
            options.busy_timeout(Duration::from_millis(ms));
        }
        if let Some(enabled) = self.foreign_keys {
            options.foreign_keys(enabled);
        }
        if let Some(ops) = self.interrupt_check_ops {
            options.interrupt_check_ops(ops);
        }
        options
    }
}

impl Config {
    /// Default location of the configuration file:
    /// `<config dir>/sqlbridge/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlbridge").join("config.toml"))
    }

    /// Settings for new connections, falling back to defaults when the
    /// file has no `[sqlite]` table.
    pub fn sqlite(&self) -> SqliteConfig {
        self.sqlite.clone().unwrap_or_default()
    }
}

impl Connection {
    /// Opens `path` with the settings from a `[sqlite]` configuration table.
    pub fn open_with_config(path: &str, config: &SqliteConfig) -> Result<Connection> {
        config.open_options().open(path)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// use sqlbridge::config::load_config;
///
/// let config = load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}
