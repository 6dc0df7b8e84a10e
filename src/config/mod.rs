//! Configuration management.
//!
//! Settings are resolved by the embedding application and handed to the
//! [`ConnectionRegistry`](crate::ConnectionRegistry). This module only parses
//! and validates them.

mod connection;
mod fingerprint;
mod runtime;

pub use connection::{
    ConnectionConfig, DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_POOL_MAX_SIZE, PoolSettings,
};
pub use fingerprint::Fingerprint;
pub use runtime::RuntimeFlags;

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the connection used when none is given.
pub const DEFAULT_CONNECTION: &str = "default";

/// All database settings for a process.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSettings {
    /// Named connection configurations.
    pub connections: BTreeMap<String, ConnectionConfig>,
    /// Runtime mode flags.
    pub runtime: RuntimeFlags,
    /// Root directory for the schema cache. `None` disables disk caching.
    pub cache_dir: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Debug mode.
    pub debug: Option<bool>,
    /// Interactive mode.
    pub interactive: Option<bool>,
    /// Schema cache directory.
    pub cache_dir: Option<String>,
    /// Named connections.
    #[serde(default, alias = "mysql")]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

impl DatabaseSettings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named connection.
    #[must_use]
    pub fn with_connection(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), config);
        self
    }

    /// Sets the runtime flags.
    #[must_use]
    pub const fn with_runtime(mut self, runtime: RuntimeFlags) -> Self {
        self.runtime = runtime;
        self
    }

    /// Sets the schema cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Looks up a named connection.
    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("no database configuration named '{name}'")))
    }

    /// Parses settings from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("invalid database config: {e}")))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads settings from a file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Loads settings from the default location.
    ///
    /// Reads a `.env` file if present, then checks the platform config dir
    /// (`<config>/dbflow/database.toml`), then applies environment overrides.
    /// Returns default settings if no file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let _ = dotenvy::dotenv();

        let from_file = directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("dbflow").join("database.toml"))
            .filter(|path| path.exists())
            .and_then(|path| match Self::load_from_file(&path) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable database config");
                    None
                },
            });

        let mut settings = from_file.unwrap_or_default();
        if settings.cache_dir.is_none() {
            settings.cache_dir = default_cache_dir();
        }
        settings.with_env_overrides()
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `DBFLOW_DEBUG` | Debug mode (disables disk cache) |
    /// | `DBFLOW_INTERACTIVE` | Interactive mode (disables disk cache) |
    /// | `DBFLOW_CACHE_DIR` | Schema cache directory |
    /// | `DBFLOW_POOL_MAX_SIZE` | Max handles per pool |
    /// | `DBFLOW_POOL_ACQUIRE_TIMEOUT_MS` | Checkout wait |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.runtime = self.runtime.with_env_overrides();
        if let Ok(dir) = std::env::var("DBFLOW_CACHE_DIR")
            && !dir.trim().is_empty()
        {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        for config in self.connections.values_mut() {
            config.pool = config.pool.with_env_overrides();
        }
        self
    }

    fn from_config_file(file: ConfigFile) -> Self {
        let mut settings = Self {
            connections: file.connections,
            ..Self::default()
        };
        if let Some(debug) = file.debug {
            settings.runtime.debug = debug;
        }
        if let Some(interactive) = file.interactive {
            settings.runtime.interactive = interactive;
        }
        settings.cache_dir = file.cache_dir.map(PathBuf::from);
        settings
    }
}

/// Platform cache directory for schema metadata.
#[must_use]
pub fn default_cache_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.cache_dir().join("dbflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        debug = true
        cache_dir = "/tmp/dbflow-cache"

        [connections.default]
        database = "app.db"
        prefix = "app_"

        [connections.default.pool]
        max_size = 4

        [connections.reporting]
        database = "report.db"
        rw_separate = false
    "#;

    #[test]
    fn test_from_toml() {
        let settings = DatabaseSettings::from_toml(SAMPLE).unwrap();
        assert!(settings.runtime.debug);
        assert_eq!(settings.cache_dir, Some(PathBuf::from("/tmp/dbflow-cache")));
        let default = settings.connection(DEFAULT_CONNECTION).unwrap();
        assert_eq!(default.prefix, "app_");
        assert_eq!(default.pool.max_size, 4);
        assert_eq!(default.pool.acquire_timeout_ms, DEFAULT_ACQUIRE_TIMEOUT_MS);
    }

    #[test]
    fn test_mysql_section_alias() {
        let settings = DatabaseSettings::from_toml(
            r#"
            [mysql.default]
            database = "legacy.db"
            "#,
        )
        .unwrap();
        assert_eq!(settings.connection("default").unwrap().database, "legacy.db");
    }

    #[test]
    fn test_unknown_connection_is_configuration_error() {
        let settings = DatabaseSettings::new();
        assert!(matches!(
            settings.connection("missing"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            DatabaseSettings::from_toml("connections = 3"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = DatabaseSettings::load_from_file(Path::new("/nonexistent/dbflow.toml"));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
