//! Repository facade.
//!
//! [`Db`] pairs resolved [`DatabaseSettings`] with a [`ConnectionRegistry`]
//! and hands out connections by name. The default connection is opened on
//! first use and kept for the life of the facade.

use crate::config::{DEFAULT_CONNECTION, DatabaseSettings};
use crate::connection::{Connection, ConnectionRegistry};
use crate::models::{Row, Value};
use crate::query::Query;
use crate::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Entry point for application code.
///
/// # Example
///
/// ```rust,ignore
/// use dbflow::{ConnectionConfig, DatabaseSettings, Db};
///
/// let settings = DatabaseSettings::new()
///     .with_connection("default", ConnectionConfig::sqlite("app.db"));
/// let db = Db::new(settings);
/// let adults = db.table("users")?.and_where("age", ">", 18).count()?;
/// ```
#[derive(Debug)]
pub struct Db {
    settings: DatabaseSettings,
    registry: Arc<ConnectionRegistry>,
    default: OnceCell<Arc<Connection>>,
}

impl Db {
    /// Creates a facade with its own registry.
    #[must_use]
    pub fn new(settings: DatabaseSettings) -> Self {
        let registry = Arc::new(ConnectionRegistry::from_settings(&settings));
        Self::with_registry(settings, registry)
    }

    /// Creates a facade over an existing registry, so several facades can
    /// share pools.
    #[must_use]
    pub fn with_registry(settings: DatabaseSettings, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            settings,
            registry,
            default: OnceCell::new(),
        }
    }

    /// Loads settings from the default location and environment.
    #[must_use]
    pub fn from_default_settings() -> Self {
        Self::new(DatabaseSettings::load_default())
    }

    /// Returns the named connection.
    pub fn connect(&self, name: &str) -> Result<Arc<Connection>> {
        let config = self.settings.connection(name)?;
        self.registry.connection(config)
    }

    /// Returns the default connection.
    pub fn connection(&self) -> Result<&Arc<Connection>> {
        self.default
            .get_or_try_init(|| self.connect(DEFAULT_CONNECTION))
    }

    /// Starts a query on `table` using the default connection.
    pub fn table(&self, table: impl Into<String>) -> Result<Query<'_>> {
        Ok(self.connection()?.table(table))
    }

    /// Starts a query on the prefixed `table` using the default connection.
    pub fn name(&self, table: &str) -> Result<Query<'_>> {
        Ok(self.connection()?.name(table))
    }

    /// Runs raw SQL on the default connection.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.connection()?.query(sql, params)
    }

    /// Runs raw SQL on the default connection and returns the first row.
    pub fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        self.connection()?.query_one(sql, params)
    }

    /// Runs raw SQL that changes rows on the default connection.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.connection()?.execute(sql, params)
    }

    /// The shared registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The settings this facade resolves names against.
    #[must_use]
    pub const fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, RuntimeFlags};
    use crate::connection::Driver;
    use crate::connection::testing::ScriptedDriver;
    use crate::{Error, codes};

    fn scripted(database: &str) -> ConnectionConfig {
        ConnectionConfig {
            driver: "scripted".to_string(),
            database: database.to_string(),
            ..ConnectionConfig::default()
        }
    }

    fn facade() -> (Db, Arc<ScriptedDriver>) {
        let driver = Arc::new(ScriptedDriver::default().with_table("users", &[("id", "PRI", "")]));
        let registry = Arc::new(ConnectionRegistry::new(RuntimeFlags::debug(), None));
        registry.register_driver("scripted", Arc::clone(&driver) as Arc<dyn Driver>);
        let settings = DatabaseSettings::new()
            .with_connection("default", scripted("app"))
            .with_connection("reporting", scripted("report"));
        (Db::with_registry(settings, registry), driver)
    }

    #[test]
    fn test_default_connection_is_reused() {
        let (db, _) = facade();
        let a = Arc::clone(db.connection().unwrap());
        let b = Arc::clone(db.connection().unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.config().database, "app");
    }

    #[test]
    fn test_named_connections() {
        let (db, _) = facade();
        let reporting = db.connect("reporting").unwrap();
        assert_eq!(reporting.config().database, "report");
        assert_eq!(db.registry().len(), 1);

        let err = db.connect("missing").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(err.code(), codes::CONFIGURATION);
    }

    #[test]
    fn test_forwards_to_default_connection() {
        let (db, driver) = facade();
        db.table("users").unwrap().where_eq("id", 1).delete().unwrap();
        db.execute("UPDATE users SET id = id", &[]).unwrap();
        assert_eq!(
            driver.sql_log(),
            ["DELETE FROM `users` WHERE `id` = ?", "UPDATE users SET id = id"]
        );
    }
}
