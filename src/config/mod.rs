use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    core::errors::{BudgetError, Result},
    storage::JsonFileStore,
    utils::paths::{app_data_dir, config_file_in, ensure_dir, write_atomic},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub ledger_name: String,
    /// Overrides the application data directory for ledger files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "Config::default_autosave")]
    pub autosave: bool,
    #[serde(default = "Config::default_retention")]
    pub backup_retention: usize,
    /// Extra `tracing` directive, e.g. `biweekly_ledger=debug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_name: "household".into(),
            data_dir: None,
            autosave: Self::default_autosave(),
            backup_retention: Self::default_retention(),
            log_filter: None,
        }
    }
}

impl Config {
    fn default_autosave() -> bool {
        true
    }

    fn default_retention() -> usize {
        5
    }

    /// Data directory for ledger files, falling back to `fallback`.
    pub fn data_root(&self, fallback: &Path) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }

    /// JSON store for the configured ledger.
    pub fn open_store(&self, fallback: &Path) -> Result<JsonFileStore> {
        JsonFileStore::new(
            &self.data_root(fallback),
            &self.ledger_name,
            Some(self.backup_retention),
        )
    }

    fn validate(&self) -> Result<()> {
        if self.ledger_name.trim().is_empty() {
            return Err(BudgetError::Config("ledger_name cannot be empty".into()));
        }
        if self.backup_retention == 0 {
            return Err(BudgetError::Config(
                "backup_retention must keep at least one backup".into(),
            ));
        }
        Ok(())
    }
}

/// Reads and writes `config.json` under the application data directory.
pub struct ConfigManager {
    base: PathBuf,
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::with_base_dir(app_data_dir())
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self> {
        ensure_dir(&base)?;
        Ok(Self {
            path: config_file_in(&base),
            base,
        })
    }

    /// Defaults are returned while no config file exists.
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            return Ok(Config::default());
        }
        let data = fs::read_to_string(&self.path)?;
        let config: Config = serde_json::from_str(&data)
            .map_err(|err| BudgetError::Config(format!("{}: {}", self.path.display(), err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        config.validate()?;
        let json = serde_json::to_string_pretty(config)?;
        write_atomic(&self.path, &json)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
