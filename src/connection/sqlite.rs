//! Bundled `SQLite` driver.
//!
//! Accepts the builder's MySQL-flavoured dialect: backtick identifiers and
//! `LIMIT offset,count` are native to `SQLite`, `FIND_IN_SET` is registered as a
//! scalar function and a trailing `FOR UPDATE` is dropped (writers are already
//! serialized and transactions begin `IMMEDIATE`).

use super::driver::{ColumnInfo, Driver, DriverError, DriverHandle, ExecOutcome};
use crate::config::ConnectionConfig;
use crate::models::{Row, Value};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use std::collections::BTreeMap;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: &str = "5000";

/// Driver for `SQLite` database files.
///
/// Recognized options: `busy_timeout` (ms), `journal_mode`, `synchronous`,
/// `foreign_keys`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(
        &self,
        config: &ConnectionConfig,
        options: &BTreeMap<String, String>,
    ) -> Result<Box<dyn DriverHandle>, DriverError> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.database)?
        };
        configure_connection(&conn, options, config.is_in_memory());
        register_functions(&conn)?;
        Ok(Box::new(SqliteHandle { conn }))
    }
}

/// Applies pragmas for concurrent access.
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits for locks instead of failing immediately
///
/// Pragma failures are ignored: `journal_mode` reports its result as a row,
/// and in-memory databases cannot use WAL.
fn configure_connection(conn: &Connection, options: &BTreeMap<String, String>, in_memory: bool) {
    let option = |key: &str, default: &'static str| {
        options
            .get(key)
            .map_or(default, String::as_str)
            .to_string()
    };
    if !in_memory {
        let _ = conn.pragma_update(None, "journal_mode", option("journal_mode", "WAL"));
    }
    let _ = conn.pragma_update(None, "synchronous", option("synchronous", "NORMAL"));
    let _ = conn.pragma_update(
        None,
        "busy_timeout",
        option("busy_timeout", DEFAULT_BUSY_TIMEOUT_MS),
    );
    if let Some(fk) = options.get("foreign_keys") {
        let _ = conn.pragma_update(None, "foreign_keys", fk);
    }
}

fn register_functions(conn: &Connection) -> Result<(), DriverError> {
    conn.create_scalar_function(
        "FIND_IN_SET",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let needle = text_of(ctx.get_raw(0));
            let haystack = text_of(ctx.get_raw(1));
            Ok(match (needle, haystack) {
                (Some(needle), Some(haystack)) => Some(find_in_set(&needle, &haystack)),
                _ => None,
            })
        },
    )?;
    Ok(())
}

fn text_of(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

/// 1-based position of `needle` in the comma-separated `haystack`, 0 if absent.
fn find_in_set(needle: &str, haystack: &str) -> i64 {
    if haystack.is_empty() || needle.contains(',') {
        return 0;
    }
    haystack
        .split(',')
        .position(|item| item == needle)
        .and_then(|idx| i64::try_from(idx + 1).ok())
        .unwrap_or(0)
}

fn strip_locking_clause(sql: &str) -> &str {
    let trimmed = sql.trim_end();
    let upper = trimmed.len().checked_sub(" FOR UPDATE".len()).and_then(|start| {
        trimmed
            .get(start..)
            .filter(|tail| tail.eq_ignore_ascii_case(" FOR UPDATE"))
            .map(|_| start)
    });
    upper.map_or(trimmed, |start| &trimmed[..start])
}

struct SqliteHandle {
    conn: Connection,
}

impl DriverHandle for SqliteHandle {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        let mut stmt = self.conn.prepare(strip_locking_clause(sql))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|idx| row.get_ref(idx).map(from_value_ref))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, DriverError> {
        let affected = self.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(ExecOutcome {
            affected: u64::try_from(affected).unwrap_or(u64::MAX),
            last_insert_id: Some(self.conn.last_insert_rowid()),
        })
    }

    fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DriverError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let raw = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if raw.is_empty() {
            return Err(DriverError::new(
                Some(1146),
                format!("Table '{table}' doesn't exist"),
            ));
        }
        let pk_columns = raw.iter().filter(|(.., pk)| *pk > 0).count();
        Ok(raw
            .into_iter()
            .map(|(field, column_type, not_null, default, pk)| {
                let rowid_alias =
                    pk > 0 && pk_columns == 1 && column_type.eq_ignore_ascii_case("INTEGER");
                ColumnInfo {
                    field,
                    column_type,
                    null: !not_null,
                    key: if pk > 0 { "PRI".to_string() } else { String::new() },
                    default,
                    extra: if rowid_alias {
                        "auto_increment".to_string()
                    } else {
                        String::new()
                    },
                }
            })
            .collect())
    }

    fn list_tables(&mut self) -> Result<Vec<String>, DriverError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        Ok(self.conn.execute_batch("BEGIN IMMEDIATE")?)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        Ok(self.conn.execute_batch("COMMIT")?)
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        Ok(self.conn.execute_batch("ROLLBACK")?)
    }

    fn ping(&mut self) -> bool {
        self.conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => Some(i64::from(failure.extended_code)),
            _ => None,
        };
        Self::new(code, err.to_string())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::from(rusqlite::types::Null),
            Self::Int(v) => ToSqlOutput::from(*v),
            Self::Float(v) => ToSqlOutput::from(*v),
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
            Self::Bytes(b) => ToSqlOutput::from(b.as_slice()),
            Self::Bool(b) => ToSqlOutput::from(*b),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}
