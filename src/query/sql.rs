//! SQL statement assembly.
//!
//! Clause order for SELECT is fixed:
//! `SELECT proj FROM table[ alias][ joins][ WHERE][ GROUP BY][ HAVING][ ORDER BY][ LIMIT][ FOR UPDATE]`.

use super::compiler::{compile, quote_column};
use super::state::QueryState;
use crate::models::{Assignment, Changes, Record, Value};
use crate::{Error, Result};
use serde::Serialize;
use std::fmt::Write;

/// Compiled SQL text plus its ordered parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    /// SQL with `?` placeholders.
    pub sql: String,
    /// Values bound to the placeholders, left to right.
    pub params: Vec<Value>,
}

impl Statement {
    /// Renders the SQL with parameters interpolated, for diagnostics.
    #[must_use]
    pub fn debug_sql(&self) -> String {
        interpolate(&self.sql, &self.params)
    }
}

/// Formats `table` and `alias` for a FROM clause.
///
/// Table expressions containing a space (`users u`, subqueries) are used as given.
#[must_use]
pub fn format_table(table: &str, alias: &str) -> String {
    let table = table.trim();
    let mut out = if table.contains(' ') || table.contains('`') {
        table.to_string()
    } else {
        format!("`{table}`")
    };
    let alias = alias.trim();
    if !alias.is_empty() {
        let _ = write!(out, " `{alias}`");
    }
    out
}

struct Source {
    from: String,
    condition: String,
    /// Join parameters followed by WHERE parameters.
    params: Vec<Value>,
}

fn source(state: &QueryState) -> Result<Source> {
    if state.table.trim().is_empty() {
        return Err(Error::build("db table name is empty"));
    }
    let mut from = format_table(&state.table, &state.alias);
    for join in &state.joins {
        let _ = write!(from, " {}", join.trim());
    }
    let (where_sql, where_params) = compile(&state.predicates);
    let condition = if where_sql.is_empty() {
        String::new()
    } else {
        format!(" WHERE {where_sql}")
    };
    let mut params = state.join_params.clone();
    params.extend(where_params);
    Ok(Source {
        from,
        condition,
        params,
    })
}

fn push_clause(sql: &mut String, keyword: &str, expr: &str) {
    let expr = expr.trim();
    if !expr.is_empty() {
        let _ = write!(sql, " {keyword} {expr}");
    }
}

fn with_projection_params(state: &QueryState, params: Vec<Value>) -> Vec<Value> {
    let mut out = state.select_params.clone();
    out.extend(params);
    out
}

/// Builds the main SELECT statement.
///
/// Parameters bind as projection, then joins, then WHERE.
pub fn build_select(state: &QueryState) -> Result<Statement> {
    let Source {
        from,
        condition,
        params,
    } = source(state)?;
    let params = with_projection_params(state, params);
    let mut sql = format!("SELECT {} FROM {from}{condition}", projection(state));
    push_clause(&mut sql, "GROUP BY", &state.group_by);
    push_clause(&mut sql, "HAVING", &state.having);
    push_clause(&mut sql, "ORDER BY", &state.order_by);
    if let Some(limit) = state.limit {
        let _ = write!(sql, " LIMIT {limit}");
    }
    if state.for_update {
        sql.push_str(" FOR UPDATE");
    }
    Ok(Statement { sql, params })
}

/// Builds the pagination COUNT statement.
///
/// Never carries `ORDER BY`, `LIMIT` or `FOR UPDATE`. With a `GROUP BY` the
/// grouped query is counted through a subquery, which keeps the projection
/// and its parameters; otherwise the projection is dropped along with them.
pub fn build_count(state: &QueryState) -> Result<Statement> {
    let Source {
        from,
        condition,
        params,
    } = source(state)?;
    if state.group_by.trim().is_empty() {
        return Ok(Statement {
            sql: format!("SELECT COUNT(*) as total FROM {from}{condition} LIMIT 1"),
            params,
        });
    }
    let mut inner = format!("SELECT {} FROM {from}{condition}", projection(state));
    push_clause(&mut inner, "GROUP BY", &state.group_by);
    push_clause(&mut inner, "HAVING", &state.having);
    Ok(Statement {
        sql: format!("SELECT COUNT(*) as total FROM ({inner}) c LIMIT 1"),
        params: with_projection_params(state, params),
    })
}

fn projection(state: &QueryState) -> &str {
    let select = state.select.trim();
    if select.is_empty() { "*" } else { select }
}

/// Builds a single-row INSERT.
pub fn build_insert(table: &str, record: &Record) -> Result<Statement> {
    if record.is_empty() {
        return Err(Error::build("db insert data is empty"));
    }
    let columns = record.columns().map(quote_column).collect::<Vec<_>>().join(",");
    let placeholders = vec!["?"; record.len()].join(",");
    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            format_table(table, "")
        ),
        params: record.values().cloned().collect(),
    })
}

/// Builds a multi-row INSERT.
///
/// Every record must have the same columns in the same order as the first.
pub fn build_insert_list(table: &str, records: &[Record]) -> Result<Statement> {
    let Some(first) = records.first() else {
        return Err(Error::build("db insert list is empty"));
    };
    if first.is_empty() {
        return Err(Error::build("db insert data is empty"));
    }
    let shape: Vec<&str> = first.columns().collect();
    let row = format!("({})", vec!["?"; shape.len()].join(","));
    let mut params = Vec::with_capacity(shape.len() * records.len());
    for (idx, record) in records.iter().enumerate() {
        if !record.columns().eq(shape.iter().copied()) {
            return Err(Error::build(format!(
                "db insert list row {idx} does not match the columns of the first row"
            )));
        }
        params.extend(record.values().cloned());
    }
    let columns = shape.iter().map(|c| quote_column(c)).collect::<Vec<_>>().join(",");
    let rows = vec![row; records.len()].join(",");
    Ok(Statement {
        sql: format!("INSERT INTO {} ({columns}) VALUES {rows}", format_table(table, "")),
        params,
    })
}

/// Builds an UPDATE. Assignment parameters precede WHERE parameters.
pub fn build_update(state: &QueryState, changes: &Changes) -> Result<Statement> {
    if state.table.trim().is_empty() {
        return Err(Error::build("db table name is empty"));
    }
    if !state.has_conditions() {
        return Err(Error::build("db update need where condition"));
    }
    if changes.is_empty() {
        return Err(Error::build("db update data is empty"));
    }
    let mut params = Vec::new();
    let assignments = changes
        .iter()
        .map(|(column, assignment)| {
            let quoted = quote_column(column);
            match assignment {
                Assignment::Set(value) => {
                    params.push(value.clone());
                    format!("{quoted} = ?")
                },
                Assignment::Delta { op, value } => {
                    params.push(value.clone());
                    format!("{quoted} = {column}{op}?")
                },
                Assignment::Raw(expr) => format!("{quoted} = {expr}"),
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    let (where_sql, where_params) = compile(&state.predicates);
    params.extend(where_params);
    Ok(Statement {
        sql: format!(
            "UPDATE {} SET {assignments} WHERE {where_sql}",
            format_table(&state.table, "")
        ),
        params,
    })
}

/// Builds a DELETE.
pub fn build_delete(state: &QueryState) -> Result<Statement> {
    if state.table.trim().is_empty() {
        return Err(Error::build("db table name is empty"));
    }
    if !state.has_conditions() {
        return Err(Error::build("db delete need where condition"));
    }
    let (where_sql, params) = compile(&state.predicates);
    Ok(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {where_sql}",
            format_table(&state.table, "")
        ),
        params,
    })
}

/// Replaces each `?` with the next parameter's debug literal.
///
/// Surplus placeholders are left as `?`.
#[must_use]
pub fn interpolate(sql: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len() + params.len() * 4);
    let mut params = params.iter();
    for ch in sql.chars() {
        if ch != '?' {
            out.push(ch);
            continue;
        }
        match params.next() {
            Some(value) => out.push_str(&value.to_debug_literal()),
            None => out.push('?'),
        }
    }
    out
}
