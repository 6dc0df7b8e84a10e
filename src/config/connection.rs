//! Per-connection configuration.

use super::Fingerprint;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default maximum handles per pool.
pub const DEFAULT_POOL_MAX_SIZE: usize = 10;

/// Default checkout wait in milliseconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5000;

/// Handle pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum open handles for one configuration.
    pub max_size: usize,
    /// How long a checkout waits for a free handle (0 = 60s safety cap).
    pub acquire_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_MAX_SIZE,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

impl PoolSettings {
    /// Applies environment variable overrides.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `DBFLOW_POOL_MAX_SIZE` | Max open handles | 10 |
    /// | `DBFLOW_POOL_ACQUIRE_TIMEOUT_MS` | Checkout wait | 5000 |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("DBFLOW_POOL_MAX_SIZE")
            && let Ok(parsed) = v.parse::<usize>()
        {
            self.max_size = parsed.max(1);
        }
        if let Ok(v) = std::env::var("DBFLOW_POOL_ACQUIRE_TIMEOUT_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.acquire_timeout_ms = parsed;
        }
        self
    }

    /// Sets the maximum pool size.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the checkout timeout.
    #[must_use]
    pub const fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }
}

/// A resolved database configuration.
///
/// Immutable once handed to the registry; its [`Fingerprint`] identifies the
/// pool it is served from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Registered driver name.
    pub driver: String,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name (a file path for `SQLite`).
    pub database: String,
    /// Connection charset.
    pub charset: String,
    /// Login user.
    pub user: Option<String>,
    /// Login password.
    #[serde(with = "optional_secret_serde")]
    pub password: Option<SecretString>,
    /// Table prefix applied by `Connection::name`.
    pub prefix: String,
    /// Driver-specific options.
    pub options: BTreeMap<String, String>,
    /// Ask the driver for a persistent connection.
    pub persistence: bool,
    /// Read replicas.
    #[serde(alias = "slave")]
    pub replicas: Vec<Self>,
    /// Route reads to replicas. Defaults to "replicas are declared".
    pub rw_separate: Option<bool>,
    /// Pool sizing.
    pub pool: PoolSettings,
    /// Reject unknown columns in write payloads instead of dropping them.
    pub strict_fields: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3306,
            database: String::new(),
            charset: "utf8mb4".to_string(),
            user: None,
            password: None,
            prefix: String::new(),
            options: BTreeMap::new(),
            persistence: false,
            replicas: Vec::new(),
            rw_separate: None,
            pool: PoolSettings::default(),
            strict_fields: false,
        }
    }
}

impl ConnectionConfig {
    /// Creates a configuration for the bundled `SQLite` driver.
    #[must_use]
    pub fn sqlite(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Sets the table prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Adds a read replica.
    #[must_use]
    pub fn with_replica(mut self, replica: Self) -> Self {
        self.replicas.push(replica);
        self
    }

    /// Sets the read/write split flag explicitly.
    #[must_use]
    pub const fn with_rw_separate(mut self, enabled: bool) -> Self {
        self.rw_separate = Some(enabled);
        self
    }

    /// Sets pool sizing.
    #[must_use]
    pub const fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Enables strict field checking for write payloads.
    #[must_use]
    pub const fn with_strict_fields(mut self, strict: bool) -> Self {
        self.strict_fields = strict;
        self
    }

    /// Returns true if reads should be routed to replicas.
    #[must_use]
    pub fn reads_from_replicas(&self) -> bool {
        self.rw_separate.unwrap_or(!self.replicas.is_empty()) && !self.replicas.is_empty()
    }

    /// Returns true for `SQLite` in-memory databases, which cannot share state
    /// across handles.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database == ":memory:" || self.database.is_empty()
    }

    /// Returns the pool settings actually applied.
    #[must_use]
    pub fn effective_pool(&self) -> PoolSettings {
        let mut pool = self.pool;
        pool.max_size = pool.max_size.max(1);
        if self.driver == "sqlite" && self.is_in_memory() {
            pool.max_size = 1;
        }
        pool
    }

    /// Computes the pool fingerprint for this configuration.
    #[must_use]
    pub fn fingerprint(&self, options: &BTreeMap<String, String>) -> Fingerprint {
        Fingerprint::compute(self, options)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.driver.trim().is_empty() {
            return Err(Error::Configuration("driver name is empty".to_string()));
        }
        if self.database.trim().is_empty() && self.driver != "sqlite" {
            return Err(Error::Configuration(format!(
                "database name is empty for driver '{}'",
                self.driver
            )));
        }
        if self.rw_separate == Some(true) && self.replicas.is_empty() {
            return Err(Error::Configuration(
                "rw_separate is enabled but no replicas are configured".to_string(),
            ));
        }
        for replica in &self.replicas {
            replica.validate()?;
        }
        Ok(())
    }

    /// Serializable view used for fingerprinting. Includes the password.
    pub(crate) fn identity(&self) -> serde_json::Value {
        serde_json::json!({
            "driver": self.driver,
            "host": self.host,
            "port": self.port,
            "database": self.database,
            "charset": self.charset,
            "user": self.user,
            "password": self.password.as_ref().map(|p| p.expose_secret().to_string()),
            "prefix": self.prefix,
            "options": self.options,
            "persistence": self.persistence,
            "replicas": self.replicas.iter().map(Self::identity).collect::<Vec<_>>(),
            "rw_separate": self.rw_separate,
            "pool": self.pool,
            "strict_fields": self.strict_fields,
        })
    }
}

/// Serde module for optional `SecretString` fields.
mod optional_secret_serde {
    use secrecy::SecretString;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(SecretString::from))
    }
}
