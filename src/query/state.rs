//! Mutable state of one logical statement.

use super::predicate::PredicateNode;
use crate::models::Value;
use std::fmt;

/// `LIMIT` clause value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// `LIMIT count`
    Count(u64),
    /// `LIMIT offset,count`
    Range {
        /// Rows skipped.
        offset: u64,
        /// Rows returned.
        count: u64,
    },
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Range { offset, count } => write!(f, "{offset},{count}"),
        }
    }
}

/// Everything a statement accumulates before a terminal operation runs it.
///
/// Owned by exactly one [`Query`](super::Query) and consumed by its terminal
/// operation; never shared between statements.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    /// Table name as given (prefix already applied).
    pub table: String,
    /// Optional table alias.
    pub alias: String,
    /// Projection, `*` by default.
    pub select: String,
    /// Join clauses, rendered in order.
    pub joins: Vec<String>,
    /// WHERE predicates.
    pub predicates: Vec<PredicateNode>,
    /// Parameters for placeholders in the projection.
    pub select_params: Vec<Value>,
    /// Parameters for placeholders in the join clauses.
    pub join_params: Vec<Value>,
    /// `GROUP BY` expression.
    pub group_by: String,
    /// `HAVING` expression.
    pub having: String,
    /// `ORDER BY` expression.
    pub order_by: String,
    /// `LIMIT` clause.
    pub limit: Option<Limit>,
    /// Append `FOR UPDATE` to the main SELECT.
    pub for_update: bool,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            table: String::new(),
            alias: String::new(),
            select: "*".to_string(),
            joins: Vec::new(),
            predicates: Vec::new(),
            select_params: Vec::new(),
            join_params: Vec::new(),
            group_by: String::new(),
            having: String::new(),
            order_by: String::new(),
            limit: None,
            for_update: false,
        }
    }
}

impl QueryState {
    /// Creates a state targeting `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Returns true if at least one predicate compiles to SQL.
    #[must_use]
    pub fn has_conditions(&self) -> bool {
        self.predicates.iter().any(|node| !node.is_blank())
    }
}
