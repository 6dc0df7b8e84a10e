//! Connection registry: one [`Connection`] and one pool per fingerprint.

use super::driver::Driver;
use super::manager::Connection;
use super::metadata::MetadataCache;
use super::pool::HandlePool;
use super::sqlite::SqliteDriver;
use super::sync::acquire_lock;
use crate::config::{ConnectionConfig, DatabaseSettings, Fingerprint, RuntimeFlags};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

/// Owns every pool and connection of a process.
///
/// Configurations with equal fingerprints share one [`Connection`] (and so
/// one master pool); replica configurations shared between masters share
/// their pool as well. Create one registry at startup and pass it to the
/// code that needs database access.
///
/// # Example
///
/// ```rust,ignore
/// use dbflow::{ConnectionConfig, ConnectionRegistry, RuntimeFlags};
///
/// let registry = ConnectionRegistry::new(RuntimeFlags::production(), None);
/// let conn = registry.connection(&ConnectionConfig::sqlite("app.db"))?;
/// let total = conn.table("users").count()?;
/// ```
pub struct ConnectionRegistry {
    runtime: RuntimeFlags,
    cache_dir: Option<PathBuf>,
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
    connections: Mutex<HashMap<Fingerprint, Arc<Connection>>>,
    pools: Mutex<HashMap<Fingerprint, Arc<HandlePool>>>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("runtime", &self.runtime)
            .field("cache_dir", &self.cache_dir)
            .field("connections", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(RuntimeFlags::default(), None)
    }
}

impl ConnectionRegistry {
    /// Creates a registry with the `sqlite` driver registered.
    ///
    /// `cache_dir` is the root of the on-disk metadata cache; it is ignored in
    /// debug and interactive modes.
    #[must_use]
    pub fn new(runtime: RuntimeFlags, cache_dir: Option<PathBuf>) -> Self {
        let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();
        drivers.insert("sqlite".to_string(), Arc::new(SqliteDriver));
        Self {
            runtime,
            cache_dir,
            drivers: RwLock::new(drivers),
            connections: Mutex::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a registry from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self::new(settings.runtime, settings.cache_dir.clone())
    }

    /// Registers (or replaces) a driver under `name`.
    pub fn register_driver(&self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        let name = name.into();
        tracing::debug!(driver = %name, "Registered database driver");
        match self.drivers.write() {
            Ok(mut drivers) => drivers.insert(name, driver),
            Err(poisoned) => poisoned.into_inner().insert(name, driver),
        };
    }

    /// Returns the connection for `config`, opening it on first use.
    pub fn connection(&self, config: &ConnectionConfig) -> Result<Arc<Connection>> {
        self.connection_with_options(config, &BTreeMap::new())
    }

    /// Returns the connection for `config` plus extra driver options.
    ///
    /// The options take part in the fingerprint, so different options yield
    /// different pools. Connecting happens outside the registry lock; when
    /// two callers race to open the same fingerprint, the first to finish
    /// wins and both receive its connection.
    pub fn connection_with_options(
        &self,
        config: &ConnectionConfig,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<Connection>> {
        config.validate()?;
        let fingerprint = config.fingerprint(options);
        if let Some(conn) = acquire_lock(&self.connections).get(&fingerprint) {
            return Ok(Arc::clone(conn));
        }

        let master = self.pool(fingerprint.clone(), config, options)?;
        let replicas = config
            .replicas
            .iter()
            .map(|replica| self.pool(replica.fingerprint(options), replica, options))
            .collect::<Result<Vec<_>>>()?;
        let disk_root = if self.runtime.allows_disk_cache() {
            self.cache_dir.clone()
        } else {
            None
        };
        let metadata = MetadataCache::new(&config.database, disk_root);
        let conn = Arc::new(Connection::open(
            config.clone(),
            fingerprint.clone(),
            master,
            replicas,
            metadata,
        )?);
        let mut connections = acquire_lock(&self.connections);
        let conn = Arc::clone(connections.entry(fingerprint).or_insert(conn));
        drop(connections);
        Ok(conn)
    }

    fn pool(
        &self,
        fingerprint: Fingerprint,
        config: &ConnectionConfig,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<HandlePool>> {
        let mut pools = acquire_lock(&self.pools);
        if let Some(pool) = pools.get(&fingerprint) {
            return Ok(Arc::clone(pool));
        }
        let driver = self.driver(&config.driver)?;
        let mut merged = config.options.clone();
        merged.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        let pool = Arc::new(HandlePool::new(
            fingerprint.clone(),
            driver,
            config.clone(),
            merged,
        ));
        pools.insert(fingerprint, Arc::clone(&pool));
        drop(pools);
        tracing::debug!(pool = pool.fingerprint().short(), driver = %config.driver, "Created connection pool");
        Ok(pool)
    }

    fn driver(&self, name: &str) -> Result<Arc<dyn Driver>> {
        let drivers = match self.drivers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        drivers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("unknown database driver '{name}'")))
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.connections).len()
    }

    /// Returns true if no connection has been opened.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every connection and pool.
    ///
    /// Connections already handed out keep working; the next lookup opens
    /// fresh ones.
    pub fn destroy(&self) {
        let dropped = {
            let mut connections = acquire_lock(&self.connections);
            let count = connections.len();
            connections.clear();
            count
        };
        acquire_lock(&self.pools).clear();
        tracing::debug!(connections = dropped, "Destroyed connection registry");
    }

    /// The runtime flags in effect.
    #[must_use]
    pub const fn runtime(&self) -> RuntimeFlags {
        self.runtime
    }
}
