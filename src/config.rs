//! Store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::schema::Schema;

pub const DEFAULT_DB_NAME: &str = "test.db";
pub const ENV_DB_PATH: &str = "SQLITE_MANAGER_DB_PATH";
pub const ENV_BACKUP_DIR: &str = "SQLITE_MANAGER_BACKUP_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "SQLITE_MANAGER_BUSY_TIMEOUT_MS";

/// SQLite store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Directory scanned by `list_backups`. Defaults to `backups/` next to
    /// the database file.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    /// Tables created on open when missing
    #[serde(default)]
    pub schema: Schema,
    /// Engine-level busy timeout; unset leaves the engine default.
    #[serde(default)]
    pub busy_timeout: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DB_NAME, Schema::new())
    }
}

impl StoreConfig {
    /// Create a new store config with path and schema
    pub fn new(db_path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            db_path: db_path.into(),
            backup_dir: None,
            schema,
            busy_timeout: None,
        }
    }

    /// Config for a database called `name` (`.db` appended when missing),
    /// placed in `dir` or the current working directory.
    pub fn for_database(name: &str, dir: Option<&Path>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("database name is empty".to_string()));
        }
        let file = if name.ends_with(".db") {
            name.to_string()
        } else {
            format!("{name}.db")
        };
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir().map_err(|e| StoreError::io(Path::new("."), e))?,
        };
        Ok(Self::new(dir.join(file), Schema::new()))
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => self
                .db_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join("backups"),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from a key lookup, so callers can source settings from
    /// anything that maps names to strings.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::new(
            lookup(ENV_DB_PATH).unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            Schema::new(),
        );
        if let Some(dir) = lookup(ENV_BACKUP_DIR) {
            config.backup_dir = Some(dir.into());
        }
        if let Some(ms) = lookup(ENV_BUSY_TIMEOUT_MS) {
            let ms = ms.trim().parse::<u64>().map_err(|_| {
                StoreError::Validation(format!("{ENV_BUSY_TIMEOUT_MS} must be milliseconds, got '{ms}'"))
            })?;
            config.busy_timeout = Some(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn database_names_get_db_suffix() {
        let config = StoreConfig::for_database("mydb", Some(Path::new("/data"))).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/mydb.db"));
        let config = StoreConfig::for_database("other.db", Some(Path::new("/data"))).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/other.db"));
        assert!(StoreConfig::for_database("  ", None).is_err());
    }

    #[test]
    fn backup_dir_defaults_next_to_database() {
        let config = StoreConfig::new("/var/lib/app/main.db", Schema::new());
        assert_eq!(config.backup_dir(), PathBuf::from("/var/lib/app/backups"));
        assert_eq!(
            config.with_backup_dir("/snapshots").backup_dir(),
            PathBuf::from("/snapshots")
        );
        assert_eq!(StoreConfig::default().backup_dir(), PathBuf::from("backups"));
    }

    #[test]
    fn reads_settings_from_lookup() {
        let vars = HashMap::from([
            (ENV_DB_PATH, "/tmp/x.db"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
        ]);
        let config = StoreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.busy_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.backup_dir, None);

        let bad = HashMap::from([(ENV_BUSY_TIMEOUT_MS, "soon")]);
        assert!(matches!(
            StoreConfig::from_lookup(|k| bad.get(k).map(|v| v.to_string())),
            Err(StoreError::Validation(_))
        ));
    }
}
