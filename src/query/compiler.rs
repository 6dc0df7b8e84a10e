//! Recursive WHERE compiler.
//!
//! Compilation is pure: the same node list always yields the same SQL text and
//! the same parameter list, and the `n`-th `?` in the text binds the `n`-th
//! parameter.

use super::predicate::{Logic, Operand, Operator, PredicateNode};
use crate::models::Value;
use std::fmt::Write;

/// Compiles a predicate list into `(fragment, params)`.
///
/// The fragment carries no `WHERE` keyword and no leading connective. An empty
/// list yields an empty fragment.
#[must_use]
pub fn compile(nodes: &[PredicateNode]) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let sql = compile_into(nodes, &mut params);
    (sql, params)
}

fn compile_into(nodes: &[PredicateNode], params: &mut Vec<Value>) -> String {
    let mut condition = String::new();
    for node in nodes {
        match node {
            PredicateNode::Leaf {
                column,
                operator,
                operand,
                logic,
            } => render_leaf(&mut condition, params, column, *operator, operand, *logic),
            PredicateNode::Raw { sql, .. } if sql.trim().is_empty() => {},
            PredicateNode::Raw { sql, params: bound } => {
                condition.push_str(sql);
                params.extend(bound.iter().cloned());
            },
            PredicateNode::Group { logic, nodes } => {
                let inner = compile_into(nodes, params);
                if !inner.is_empty() {
                    let _ = write!(condition, " {logic} ({inner})");
                }
            },
        }
    }
    trim_leading_logic(&condition).to_string()
}

fn render_leaf(
    out: &mut String,
    params: &mut Vec<Value>,
    column: &str,
    operator: Operator,
    operand: &Operand,
    logic: Logic,
) {
    let col = quote_column(column);
    match (operator, operand) {
        (Operator::Between, Operand::Pair(low, high)) => {
            let _ = write!(out, " {logic} {col} BETWEEN ? AND ?");
            params.push(low.clone());
            params.push(high.clone());
        },
        (Operator::In, Operand::List(values)) if values.is_empty() => {
            let _ = write!(out, " {logic} {col} IN(NULL)");
        },
        (Operator::In, Operand::List(values)) => {
            let placeholders = vec!["?"; values.len()].join(",");
            let _ = write!(out, " {logic} {col} IN({placeholders})");
            params.extend(values.iter().cloned());
        },
        (Operator::FindInSet, Operand::Single(value)) => {
            let _ = write!(out, " {logic} FIND_IN_SET(?, {col})");
            params.push(value.clone());
        },
        (op, Operand::Single(value)) => {
            let _ = write!(out, " {logic} {col} {op} ?");
            params.push(value.clone());
        },
        // Leaves are normalized on construction; anything else is a hand-built node.
        (op, Operand::Pair(low, high)) => {
            let _ = write!(out, " {logic} {col} {op} ? AND ?");
            params.push(low.clone());
            params.push(high.clone());
        },
        (op, Operand::List(values)) => {
            let placeholders = vec!["?"; values.len().max(1)].join(",");
            let _ = write!(out, " {logic} {col} {op} ({placeholders})");
            if values.is_empty() {
                params.push(Value::Null);
            }
            params.extend(values.iter().cloned());
        },
    }
}

/// Quotes a column identifier.
///
/// `table.column` becomes `` `table`.column ``; a bare name becomes
/// `` `name` ``. Names that already contain a backtick are left alone.
#[must_use]
pub fn quote_column(column: &str) -> String {
    let column = column.trim();
    if column.contains('`') {
        return column.to_string();
    }
    match column.split_once('.') {
        Some((table, rest)) => format!("`{table}`.{rest}"),
        None => format!("`{column}`"),
    }
}

fn trim_leading_logic(condition: &str) -> &str {
    let trimmed = condition.trim();
    trimmed
        .strip_prefix("AND ")
        .or_else(|| trimmed.strip_prefix("OR "))
        .map_or(trimmed, str::trim_start)
}
