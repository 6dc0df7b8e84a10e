//! Connection manager: routing, execution, error classification.

use super::driver::{ColumnInfo, DriverHandle, ExecOutcome};
use super::error::classify;
use super::metadata::{MetadataCache, TableMetadata};
use super::pool::{HandlePool, PooledHandle};
use super::sync::{acquire_lock, record_statement_metrics};
use super::transaction::{Transaction, TxSlot};
use crate::config::{ConnectionConfig, Fingerprint};
use crate::models::{Changes, Record, Row, Value};
use crate::query::{Query, Statement, format_table};
use crate::{Error, Result};
use rand::Rng;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Where a statement runs.
#[derive(Clone, Copy)]
pub(crate) enum Route<'a> {
    /// Reads go to a random replica when read splitting is on; everything
    /// else goes to the master.
    Auto,
    /// The handle pinned by an open transaction.
    Pinned(&'a Mutex<TxSlot>),
}

/// Kind of work a statement does, for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// A live database connection: one master pool, optional replica pools and
/// the table metadata of its database.
///
/// Obtained from [`ConnectionRegistry::connection`](super::ConnectionRegistry::connection)
/// and shared behind an `Arc`. Every statement checks a handle out of the
/// right pool and returns it when done, on success and failure alike.
pub struct Connection {
    config: ConnectionConfig,
    fingerprint: Fingerprint,
    master: Arc<HandlePool>,
    replicas: Vec<Arc<HandlePool>>,
    metadata: MetadataCache,
    last_sql: Mutex<String>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("fingerprint", &self.fingerprint.short())
            .field("database", &self.config.database)
            .field("master", &self.master)
            .field("replicas", &self.replicas)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Assembles a connection and opens one master handle.
    pub(crate) fn open(
        config: ConnectionConfig,
        fingerprint: Fingerprint,
        master: Arc<HandlePool>,
        replicas: Vec<Arc<HandlePool>>,
        metadata: MetadataCache,
    ) -> Result<Self> {
        master.warm()?;
        tracing::info!(
            fingerprint = fingerprint.short(),
            database = %config.database,
            replicas = replicas.len(),
            read_split = config.reads_from_replicas(),
            "Database connection ready"
        );
        Ok(Self {
            config,
            fingerprint,
            master,
            replicas,
            metadata,
            last_sql: Mutex::new(String::new()),
        })
    }

    /// Starts a query on `table`.
    pub fn table(&self, table: impl Into<String>) -> Query<'_> {
        Query::new(self, Route::Auto, table.into())
    }

    /// Starts a query on the configured prefix followed by `table`.
    pub fn name(&self, table: &str) -> Query<'_> {
        self.table(self.prefixed(table))
    }

    pub(crate) fn prefixed(&self, table: &str) -> String {
        format!("{}{table}", self.config.prefix)
    }

    /// Runs raw SQL that returns rows. Routed like any read.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.fetch_all(Route::Auto, "raw", &raw_statement(sql, params))
    }

    /// Runs raw SQL and returns its first row.
    pub fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Runs raw SQL that changes rows on the master; returns the affected count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.write(Route::Auto, "raw", &raw_statement(sql, params))
            .map(|outcome| outcome.affected)
    }

    /// Lists the tables of the database.
    pub fn tables(&self) -> Result<Vec<String>> {
        let stmt = raw_statement("SHOW TABLES", &[]);
        self.run(Route::Auto, Access::Read, "introspect", &stmt, |h| {
            h.list_tables()
        })
    }

    /// Describes a table's columns, bypassing the metadata cache.
    pub fn describe(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.describe_on(Route::Auto, table)
    }

    fn describe_on(&self, route: Route<'_>, table: &str) -> Result<Vec<ColumnInfo>> {
        let stmt = raw_statement(&format!("SHOW FIELDS FROM {}", format_table(table, "")), &[]);
        self.run(route, Access::Write, "introspect", &stmt, |h| {
            h.describe_table(table)
        })
    }

    /// Cached metadata for `table`.
    pub fn metadata(&self, table: &str) -> Result<Arc<TableMetadata>> {
        self.table_metadata(Route::Auto, table)
    }

    pub(crate) fn table_metadata(
        &self,
        route: Route<'_>,
        table: &str,
    ) -> Result<Arc<TableMetadata>> {
        if table.trim().is_empty() {
            return Err(Error::build("db table name is empty"));
        }
        self.metadata
            .get_or_load(table, || self.describe_on(route, table))
    }

    /// Column names of `table`, in declaration order.
    pub fn fields(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.metadata(table)?.fields.clone())
    }

    /// First primary-key column of `table`, empty if there is none.
    pub fn primary_key(&self, table: &str) -> Result<String> {
        Ok(self.metadata(table)?.primary_key.clone())
    }

    /// Returns true if `table`'s primary key is generated by the database.
    pub fn is_auto_increment(&self, table: &str) -> Result<bool> {
        Ok(self.metadata(table)?.pk_auto_increment)
    }

    /// Forgets `table`'s metadata in memory and on disk.
    pub fn evict(&self, table: &str) -> Result<()> {
        self.metadata.evict(table)
    }

    /// Alias of [`evict`](Self::evict).
    pub fn remove_cache(&self, table: &str) -> Result<()> {
        self.evict(table)
    }

    /// Checks that a master handle is alive.
    pub fn ping(&self) -> bool {
        self.master
            .checkout()
            .is_ok_and(|mut handle| handle.driver_mut().ping())
    }

    /// Quotes a value as a SQL literal.
    #[must_use]
    pub fn quote(&self, value: &Value) -> String {
        value.to_sql_literal()
    }

    /// The last statement sent to the driver, with parameters interpolated.
    #[must_use]
    pub fn last_sql(&self) -> String {
        acquire_lock(&self.last_sql).clone()
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Identity of this connection's master pool.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Begins a transaction on a dedicated master handle.
    ///
    /// The handle stays checked out until the [`Transaction`] is dropped.
    pub fn start_trans(&self) -> Result<Transaction<'_>> {
        Transaction::begin(self)
    }

    /// Runs `f` in a transaction: commits on `Ok`, rolls back on `Err`.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let tx = self.start_trans()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            },
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!(error = %rollback, "Rollback after failed transaction body failed");
                }
                Err(e)
            },
        }
    }

    pub(crate) fn checkout_master(&self) -> Result<PooledHandle> {
        self.master.checkout()
    }

    pub(crate) fn fetch_all(
        &self,
        route: Route<'_>,
        kind: &'static str,
        stmt: &Statement,
    ) -> Result<Vec<Row>> {
        self.run(route, Access::Read, kind, stmt, |h| {
            h.query(&stmt.sql, &stmt.params)
        })
    }

    pub(crate) fn write(
        &self,
        route: Route<'_>,
        kind: &'static str,
        stmt: &Statement,
    ) -> Result<ExecOutcome> {
        self.run(route, Access::Write, kind, stmt, |h| {
            h.execute(&stmt.sql, &stmt.params)
        })
    }

    /// Drops columns the table does not have, or rejects them in strict mode.
    pub(crate) fn filter_record(
        &self,
        table: &str,
        meta: &TableMetadata,
        record: &mut Record,
    ) -> Result<()> {
        let dropped = record.retain_columns(|c| meta.has_field(c));
        self.report_dropped(table, &dropped)
    }

    pub(crate) fn filter_changes(
        &self,
        table: &str,
        meta: &TableMetadata,
        changes: &mut Changes,
    ) -> Result<()> {
        let dropped = changes.retain_columns(|c| meta.has_field(c));
        self.report_dropped(table, &dropped)
    }

    fn report_dropped(&self, table: &str, dropped: &[String]) -> Result<()> {
        if dropped.is_empty() {
            return Ok(());
        }
        if self.config.strict_fields {
            return Err(Error::build(format!(
                "unknown columns for table '{table}': {}",
                dropped.join(", ")
            )));
        }
        tracing::debug!(table, dropped = ?dropped, "Dropped unknown columns from write payload");
        Ok(())
    }

    fn pick_pool(&self, access: Access) -> (&'static str, &Arc<HandlePool>) {
        if access == Access::Read && self.config.reads_from_replicas() && !self.replicas.is_empty() {
            let idx = rand::rng().random_range(0..self.replicas.len());
            if let Some(pool) = self.replicas.get(idx) {
                return ("replica", pool);
            }
        }
        ("master", &self.master)
    }

    fn run<T>(
        &self,
        route: Route<'_>,
        access: Access,
        kind: &'static str,
        stmt: &Statement,
        op: impl FnOnce(&mut dyn DriverHandle) -> std::result::Result<T, super::DriverError>,
    ) -> Result<T> {
        match route {
            Route::Pinned(slot) => {
                let mut slot = acquire_lock(slot);
                self.on_handle("pinned", kind, stmt, &mut slot.handle, op)
            },
            Route::Auto => {
                let (label, pool) = self.pick_pool(access);
                let mut handle = pool.checkout()?;
                self.on_handle(label, kind, stmt, &mut handle, op)
            },
        }
    }

    /// Executes `op` on a checked-out handle with logging, metrics and
    /// error classification. A lost connection marks the handle broken.
    pub(crate) fn on_handle<T>(
        &self,
        route: &'static str,
        kind: &'static str,
        stmt: &Statement,
        handle: &mut PooledHandle,
        op: impl FnOnce(&mut dyn DriverHandle) -> std::result::Result<T, super::DriverError>,
    ) -> Result<T> {
        let sql = stmt.debug_sql();
        acquire_lock(&self.last_sql).clone_from(&sql);
        let start = Instant::now();
        match op(handle.driver_mut()) {
            Ok(value) => {
                record_statement_metrics(route, kind, start, "success");
                tracing::debug!(
                    route,
                    kind,
                    sql = %sql,
                    elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Executed statement"
                );
                Ok(value)
            },
            Err(e) => {
                record_statement_metrics(route, kind, start, "error");
                let err = classify(e, sql);
                if err.is_connection_lost() {
                    handle.mark_broken();
                }
                tracing::warn!(route, kind, error = %err, "Statement failed");
                Err(err)
            },
        }
    }
}

fn raw_statement(sql: &str, params: &[Value]) -> Statement {
    Statement {
        sql: sql.to_string(),
        params: params.to_vec(),
    }
}
