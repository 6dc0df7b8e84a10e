//! Transactions pinned to one master handle.

use super::manager::{Connection, Route};
use super::pool::PooledHandle;
use super::sync::acquire_lock;
use crate::models::{Row, Value};
use crate::query::{Query, Statement};
use crate::Result;
use std::fmt;
use std::sync::Mutex;

/// The handle owned by a transaction.
pub(crate) struct TxSlot {
    pub(crate) handle: PooledHandle,
    active: bool,
}

/// A transaction on one checked-out master handle.
///
/// Every statement issued through the transaction, reads included, runs on
/// that handle. `start_trans`, `commit` and `rollback` are idempotent: each is
/// a no-op if the transaction is already in the requested state. Dropping an
/// active transaction rolls it back.
pub struct Transaction<'c> {
    conn: &'c Connection,
    slot: Mutex<TxSlot>,
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("active", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl<'c> Transaction<'c> {
    pub(crate) fn begin(conn: &'c Connection) -> Result<Self> {
        let handle = conn.checkout_master()?;
        let tx = Self {
            conn,
            slot: Mutex::new(TxSlot {
                handle,
                active: false,
            }),
        };
        tx.start_trans()?;
        Ok(tx)
    }

    /// Starts a query on `table` inside the transaction.
    pub fn table(&self, table: impl Into<String>) -> Query<'_> {
        Query::new(self.conn, Route::Pinned(&self.slot), table.into())
    }

    /// Starts a query on the prefixed `table` inside the transaction.
    pub fn name(&self, table: &str) -> Query<'_> {
        self.table(self.conn.prefixed(table))
    }

    /// Runs raw SQL that returns rows.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let stmt = Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        self.conn.fetch_all(Route::Pinned(&self.slot), "raw", &stmt)
    }

    /// Runs raw SQL and returns its first row.
    pub fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Runs raw SQL that changes rows; returns the affected count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let stmt = Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        self.conn
            .write(Route::Pinned(&self.slot), "raw", &stmt)
            .map(|outcome| outcome.affected)
    }

    /// Returns true while a transaction is open on the handle.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        acquire_lock(&self.slot).active
    }

    /// Opens a new transaction on the pinned handle if none is active.
    pub fn start_trans(&self) -> Result<()> {
        let mut slot = acquire_lock(&self.slot);
        if slot.active {
            return Ok(());
        }
        self.conn
            .on_handle("pinned", "begin", &control("BEGIN"), &mut slot.handle, |h| h.begin())?;
        slot.active = true;
        Ok(())
    }

    /// Commits the active transaction.
    pub fn commit(&self) -> Result<()> {
        let mut slot = acquire_lock(&self.slot);
        if !slot.active {
            return Ok(());
        }
        slot.active = false;
        self.conn
            .on_handle("pinned", "commit", &control("COMMIT"), &mut slot.handle, |h| h.commit())
    }

    /// Rolls back the active transaction.
    pub fn rollback(&self) -> Result<()> {
        let mut slot = acquire_lock(&self.slot);
        if !slot.active {
            return Ok(());
        }
        slot.active = false;
        self.conn.on_handle(
            "pinned",
            "rollback",
            &control("ROLLBACK"),
            &mut slot.handle,
            |h| h.rollback(),
        )
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.in_transaction() {
            tracing::warn!("Transaction dropped while active, rolling back");
            if let Err(e) = self.rollback() {
                tracing::warn!(error = %e, "Rollback of dropped transaction failed");
                acquire_lock(&self.slot).handle.mark_broken();
            }
        }
    }
}

fn control(sql: &str) -> Statement {
    Statement {
        sql: sql.to_string(),
        params: Vec::new(),
    }
}
