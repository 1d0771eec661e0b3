//! Configuration management for the rule adapter

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::policy::schema::DEFAULT_TABLE;
use crate::policy::BatchMode;

/// Database path that selects an in-memory store
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub adapter: AdapterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`
    pub path: PathBuf,
    /// How long a writer waits on a locked database
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    pub synchronous: Synchronous,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rules.db"),
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Wal,
            synchronous: Synchronous::Normal,
        }
    }
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdapterConfig {
    /// Rule table name; must be a plain SQL identifier
    pub table: String,
    pub batch_mode: BatchMode,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            batch_mode: BatchMode::PerRule,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl JournalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
    Off,
    Normal,
    Full,
}

impl Synchronous {
    pub fn as_str(&self) -> &'static str {
        match self {
            Synchronous::Off => "OFF",
            Synchronous::Normal => "NORMAL",
            Synchronous::Full => "FULL",
        }
    }
}

impl fmt::Display for Synchronous {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "rule-adapter") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from("rules.db"));
        assert_eq!(config.database.journal_mode, JournalMode::Wal);
        assert_eq!(config.adapter.table, "casbin_rule");
        assert_eq!(config.adapter.batch_mode, BatchMode::PerRule);
        assert!(!config.database.is_in_memory());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[database]
path = ":memory:"

[adapter]
table = "authz_rules"
batch_mode = "atomic"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.database.is_in_memory());
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.database.synchronous, Synchronous::Normal);
        assert_eq!(config.adapter.table, "authz_rules");
        assert_eq!(config.adapter.batch_mode, BatchMode::Atomic);
    }

    #[test]
    fn test_rejects_unknown_enum_values() {
        let toml = r#"
[adapter]
batch_mode = "sometimes"
"#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.database.journal_mode = JournalMode::Delete;
        config.adapter.table = "rules".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
