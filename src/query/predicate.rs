//! WHERE-clause predicate tree.

use crate::models::Value;
use crate::{Error, Result};
use std::fmt;

/// Logical connective placed before a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logic {
    /// `AND`
    #[default]
    And,
    /// `OR`
    Or,
}

impl Logic {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    /// Parses `AND` / `OR` (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a leaf predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<>`
    Ne,
    /// `like`
    Like,
    /// `BETWEEN ? AND ?`
    Between,
    /// `IN(...)`
    In,
    /// `FIND_IN_SET(?, col)`
    FindInSet,
}

impl Operator {
    /// Parses an operator token (case-insensitive for keywords).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "=" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<>" | "!=" => Some(Self::Ne),
            "like" => Some(Self::Like),
            "between" => Some(Self::Between),
            "in" => Some(Self::In),
            "find_in_set" => Some(Self::FindInSet),
            _ => None,
        }
    }

    /// Returns the operator as written in SQL.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Ne => "<>",
            Self::Like => "like",
            Self::Between => "BETWEEN",
            Self::In => "IN",
            Self::FindInSet => "FIND_IN_SET",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a leaf predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// One bound value.
    Single(Value),
    /// `(low, high)` for `BETWEEN`.
    Pair(Value, Value),
    /// A value list for `IN`.
    List(Vec<Value>),
}

impl Operand {
    /// Number of parameters this operand binds.
    #[must_use]
    pub fn param_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Pair(..) => 2,
            Self::List(values) => values.len(),
        }
    }

    fn from_json(json: &serde_json::Value) -> Self {
        match json.as_array() {
            Some(items) => Self::List(items.iter().map(Value::from_json).collect()),
            None => Self::Single(Value::from_json(json)),
        }
    }

    pub(crate) fn from_json_items(items: &[serde_json::Value]) -> Self {
        match items {
            [single] => Self::from_json(single),
            many => Self::List(many.iter().map(Value::from_json).collect()),
        }
    }
}

macro_rules! impl_operand_from_scalar {
    ($($t:ty),*) => {
        $(impl From<$t> for Operand {
            fn from(v: $t) -> Self {
                Self::Single(Value::from(v))
            }
        })*
    };
}

impl_operand_from_scalar!(
    i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, bool, &str, String, &String
);

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Self::Single(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Operand {
    fn from(values: [T; N]) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Operand {
    fn from((low, high): (A, B)) -> Self {
        Self::Pair(low.into(), high.into())
    }
}

/// One node of a WHERE expression.
///
/// Traversal order of the tree determines both the SQL text order and the
/// bound-parameter order.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode {
    /// `<logic> <column> <operator> <operand>`
    Leaf {
        /// Column, optionally `table.column`.
        column: String,
        /// Comparison operator.
        operator: Operator,
        /// Right-hand side.
        operand: Operand,
        /// Connective placed before this predicate.
        logic: Logic,
    },
    /// SQL text concatenated verbatim, with its own bound parameters.
    Raw {
        /// SQL fragment, including any leading connective.
        sql: String,
        /// Values for `?` placeholders inside `sql`.
        params: Vec<Value>,
    },
    /// A parenthesised subgroup: `<logic> (<nodes>)`.
    Group {
        /// Connective placed before the group.
        logic: Logic,
        /// Nested predicates.
        nodes: Vec<Self>,
    },
}

impl PredicateNode {
    /// Builds a validated leaf.
    ///
    /// `BETWEEN` requires exactly two values; `IN` accepts a single value as a
    /// one-element list; the remaining operators require a single value.
    pub fn leaf(
        column: impl Into<String>,
        operator: Operator,
        operand: impl Into<Operand>,
        logic: Logic,
    ) -> Result<Self> {
        let column = column.into();
        if column.trim().is_empty() {
            return Err(Error::build("where condition needs a column name"));
        }
        let operand = normalize(&column, operator, operand.into())?;
        Ok(Self::Leaf {
            column,
            operator,
            operand,
            logic,
        })
    }

    /// Builds a leaf from an operator token such as `">="` or `"between"`.
    pub fn parse_leaf(
        column: impl Into<String>,
        operator: &str,
        operand: impl Into<Operand>,
        logic: Logic,
    ) -> Result<Self> {
        let column = column.into();
        let op = Operator::parse(operator).ok_or_else(|| {
            Error::build(format!("unsupported where operator '{operator}' on '{column}'"))
        })?;
        Self::leaf(column, op, operand, logic)
    }

    /// Builds a raw fragment preceded by `logic`.
    ///
    /// A blank fragment yields a node that compiles to nothing; its
    /// parameters are dropped with it.
    #[must_use]
    pub fn raw(logic: Logic, sql: &str, params: Vec<Value>) -> Self {
        let sql = sql.trim();
        if sql.is_empty() {
            return Self::Raw {
                sql: String::new(),
                params: Vec::new(),
            };
        }
        Self::Raw {
            sql: format!(" {logic} {sql}"),
            params,
        }
    }

    /// Returns true if the node compiles to nothing: a blank raw fragment, or
    /// a group whose members are all blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Leaf { .. } => false,
            Self::Raw { sql, .. } => sql.trim().is_empty(),
            Self::Group { nodes, .. } => nodes.iter().all(Self::is_blank),
        }
    }
}

fn normalize(column: &str, operator: Operator, operand: Operand) -> Result<Operand> {
    match (operator, operand) {
        (Operator::Between, pair @ Operand::Pair(..)) => Ok(pair),
        (Operator::Between, Operand::List(values)) if values.len() == 2 => {
            let mut it = values.into_iter();
            match (it.next(), it.next()) {
                (Some(low), Some(high)) => Ok(Operand::Pair(low, high)),
                _ => Err(between_error(column)),
            }
        },
        (Operator::Between, _) => Err(between_error(column)),
        (Operator::In, list @ Operand::List(_)) => Ok(list),
        (Operator::In, Operand::Single(v)) => Ok(Operand::List(vec![v])),
        (Operator::In, Operand::Pair(a, b)) => Ok(Operand::List(vec![a, b])),
        (_, single @ Operand::Single(_)) => Ok(single),
        (op, _) => Err(Error::build(format!(
            "operator '{op}' on '{column}' expects a single value"
        ))),
    }
}

fn between_error(column: &str) -> Error {
    Error::build(format!("between on '{column}' expects exactly two values"))
}
