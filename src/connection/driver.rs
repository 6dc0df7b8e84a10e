//! Driver seam.
//!
//! A [`Driver`] opens [`DriverHandle`]s for a configuration. Handles are owned
//! by the pool and only ever touched by one caller at a time.

use crate::config::ConnectionConfig;
use crate::models::{Row, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// A failure reported by a driver, before classification.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct DriverError {
    /// Native error code, if the driver reports one.
    pub code: Option<i64>,
    /// Native error message.
    pub message: String,
}

impl DriverError {
    /// Creates a driver error.
    #[must_use]
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Result of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    /// Rows changed.
    pub affected: u64,
    /// Identifier generated by the last insert on this handle.
    pub last_insert_id: Option<i64>,
}

/// One column of a table description, shaped like MySQL's `SHOW FIELDS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub field: String,
    /// Declared type.
    pub column_type: String,
    /// Column accepts NULL.
    pub null: bool,
    /// Key flag: `PRI`, `UNI`, `MUL` or empty.
    pub key: String,
    /// Default value expression.
    pub default: Option<String>,
    /// Extra attributes such as `auto_increment`.
    pub extra: String,
}

impl ColumnInfo {
    /// Returns true if the column is part of the primary key.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.key.eq_ignore_ascii_case("PRI")
    }

    /// Returns true if the column is generated by the database.
    #[must_use]
    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_lowercase().contains("auto_increment")
    }
}

/// Opens handles for a configuration.
pub trait Driver: Send + Sync {
    /// Registered driver name.
    fn name(&self) -> &str;

    /// Opens a new handle.
    ///
    /// `options` is the configuration's option map merged with any
    /// per-registration execution options.
    fn connect(
        &self,
        config: &ConnectionConfig,
        options: &BTreeMap<String, String>,
    ) -> Result<Box<dyn DriverHandle>, DriverError>;
}

/// An open database connection.
///
/// Statements use `?` placeholders, backtick-quoted identifiers and
/// `LIMIT offset,count`.
pub trait DriverHandle: Send {
    /// Runs a statement that returns rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError>;

    /// Runs a statement that changes rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, DriverError>;

    /// Describes a table's columns in declaration order.
    fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DriverError>;

    /// Lists the tables of the current database.
    fn list_tables(&mut self) -> Result<Vec<String>, DriverError>;

    /// Starts a transaction.
    fn begin(&mut self) -> Result<(), DriverError>;

    /// Commits the open transaction.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Rolls back the open transaction.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Checks that the connection is alive.
    fn ping(&mut self) -> bool;

    /// Quotes a value as a SQL literal.
    fn quote(&self, value: &Value) -> String {
        value.to_sql_literal()
    }
}

/// Placeholder left behind when a pooled handle is returned.
pub(crate) struct ClosedHandle;

impl ClosedHandle {
    fn error() -> DriverError {
        DriverError::new(None, "connection closed")
    }
}

impl DriverHandle for ClosedHandle {
    fn query(&mut self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>, DriverError> {
        Err(Self::error())
    }

    fn execute(&mut self, _sql: &str, _params: &[Value]) -> Result<ExecOutcome, DriverError> {
        Err(Self::error())
    }

    fn describe_table(&mut self, _table: &str) -> Result<Vec<ColumnInfo>, DriverError> {
        Err(Self::error())
    }

    fn list_tables(&mut self) -> Result<Vec<String>, DriverError> {
        Err(Self::error())
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        Err(Self::error())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        Err(Self::error())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        Err(Self::error())
    }

    fn ping(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_flags() {
        let column = ColumnInfo {
            field: "id".to_string(),
            column_type: "int(11)".to_string(),
            null: false,
            key: "PRI".to_string(),
            default: None,
            extra: "auto_increment".to_string(),
        };
        assert!(column.is_primary());
        assert!(column.is_auto_increment());
    }

    #[test]
    fn test_closed_handle_refuses_work() {
        let mut handle = ClosedHandle;
        assert!(handle.query("SELECT 1", &[]).is_err());
        assert!(!handle.ping());
        assert_eq!(handle.quote(&Value::from("it's")), "'it''s'");
    }
}
