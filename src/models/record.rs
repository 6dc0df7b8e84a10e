//! Write payloads: insert records and update change-sets.

use super::Value;
use crate::{Error, Result};
use std::fmt;

/// An ordered column → value map used as an insert payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing an existing value in place.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a field in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Returns a field's value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Returns true if the column is present.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|(c, _)| c == column)
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

    /// Iterates `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Keeps only the columns accepted by `keep`; returns the dropped names.
    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut dropped = Vec::new();
        self.fields.retain(|(c, _)| {
            let ok = keep(c);
            if !ok {
                dropped.push(c.clone());
            }
            ok
        });
        dropped
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a record from a JSON object.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| Error::build("record payload must be a JSON object"))?;
        Ok(object
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Arithmetic operator used by delta assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl ArithOp {
    /// Returns the SQL symbol.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    /// Parses an operator symbol.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            _ => None,
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single column is changed by an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `col = ?`
    Set(Value),
    /// `col = col <op> ?`
    Delta {
        /// Arithmetic operator.
        op: ArithOp,
        /// Bound operand.
        value: Value,
    },
    /// `col = <expr>`, inserted verbatim.
    Raw(String),
}

/// An ordered column → assignment map used as an update payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Changes {
    entries: Vec<(String, Assignment)>,
}

impl Changes {
    /// Creates an empty change-set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a bound value.
    #[must_use]
    pub fn set(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Assignment::Set(value.into()))
    }

    /// Applies an arithmetic delta with a bound operand.
    #[must_use]
    pub fn delta(self, column: impl Into<String>, op: ArithOp, value: impl Into<Value>) -> Self {
        self.with(
            column,
            Assignment::Delta {
                op,
                value: value.into(),
            },
        )
    }

    /// `col = col + step`.
    #[must_use]
    pub fn increment(self, column: impl Into<String>, step: impl Into<Value>) -> Self {
        self.delta(column, ArithOp::Add, step)
    }

    /// `col = col - step`.
    #[must_use]
    pub fn decrement(self, column: impl Into<String>, step: impl Into<Value>) -> Self {
        self.delta(column, ArithOp::Sub, step)
    }

    /// Assigns an unescaped SQL expression.
    #[must_use]
    pub fn raw(self, column: impl Into<String>, expr: impl Into<String>) -> Self {
        self.with(column, Assignment::Raw(expr.into()))
    }

    /// Adds or replaces an assignment.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, assignment: Assignment) -> Self {
        let column = column.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = assignment,
            None => self.entries.push((column, assignment)),
        }
        self
    }

    /// Iterates `(column, assignment)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Assignment)> {
        self.entries.iter().map(|(c, a)| (c.as_str(), a))
    }

    /// Keeps only the columns accepted by `keep`; returns the dropped names.
    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut dropped = Vec::new();
        self.entries.retain(|(c, _)| {
            let ok = keep(c);
            if !ok {
                dropped.push(c.clone());
            }
            ok
        });
        dropped
    }

    /// Number of assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a change-set from a JSON object.
    ///
    /// | Shape | Meaning |
    /// |-------|---------|
    /// | scalar | bound value |
    /// | `["raw", expr]` | verbatim expression |
    /// | `[op, delta]` | arithmetic delta, operand bound |
    /// | `[a, op, b]` | verbatim `a op b` |
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| Error::build("update payload must be a JSON object"))?;
        let mut changes = Self::new();
        for (column, value) in object {
            let assignment = match value.as_array().map(Vec::as_slice) {
                None => Assignment::Set(Value::from_json(value)),
                Some([head, expr]) if head.as_str() == Some("raw") => {
                    Assignment::Raw(json_text(expr))
                },
                Some([op, delta]) => {
                    let op = op.as_str().and_then(ArithOp::parse).ok_or_else(|| {
                        Error::build(format!("unsupported update operator for '{column}'"))
                    })?;
                    Assignment::Delta {
                        op,
                        value: Value::from_json(delta),
                    }
                },
                Some([a, op, b]) => {
                    Assignment::Raw(format!("{}{}{}", json_text(a), json_text(op), json_text(b)))
                },
                Some(_) => {
                    return Err(Error::build(format!(
                        "unsupported update value shape for '{column}'"
                    )));
                },
            };
            changes = changes.with(column.clone(), assignment);
        }
        Ok(changes)
    }
}

fn json_text(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), ToString::to_string)
}

impl From<Record> for Changes {
    fn from(record: Record) -> Self {
        Self {
            entries: record
                .fields
                .into_iter()
                .map(|(c, v)| (c, Assignment::Set(v)))
                .collect(),
        }
    }
}
