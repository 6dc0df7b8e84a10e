//! Batch condition lists.

use super::predicate::{Logic, Operand, PredicateNode};
use crate::{Error, Result};

/// One entry of a batch condition list.
#[derive(Debug, Clone, PartialEq)]
struct Condition {
    column: String,
    operator: String,
    operand: Operand,
    logic: Option<Logic>,
}

/// An ordered list of conditions applied in one `where` call.
///
/// Unlike a map, the same column may appear more than once, so
/// `status = 'active' OR status = 'pending'` is expressible.
///
/// # Example
///
/// ```rust
/// use dbflow::Conditions;
///
/// let conditions = Conditions::new()
///     .or_eq("status", "active")
///     .or_eq("status", "pending")
///     .op("age", ">", 18);
/// assert_eq!(conditions.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conditions {
    items: Vec<Condition>,
}

impl Conditions {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`, joined with the call's connective.
    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.push(column, "=", value, None)
    }

    /// `column <op> value`, joined with the call's connective.
    #[must_use]
    pub fn op(self, column: impl Into<String>, op: &str, value: impl Into<Operand>) -> Self {
        self.push(column, op, value, None)
    }

    /// `OR column = value`.
    #[must_use]
    pub fn or_eq(self, column: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.push(column, "=", value, Some(Logic::Or))
    }

    /// `OR column <op> value`.
    #[must_use]
    pub fn or_op(self, column: impl Into<String>, op: &str, value: impl Into<Operand>) -> Self {
        self.push(column, op, value, Some(Logic::Or))
    }

    /// `AND column <op> value`, regardless of the call's connective.
    #[must_use]
    pub fn and_op(self, column: impl Into<String>, op: &str, value: impl Into<Operand>) -> Self {
        self.push(column, op, value, Some(Logic::And))
    }

    fn push(
        mut self,
        column: impl Into<String>,
        op: &str,
        operand: impl Into<Operand>,
        logic: Option<Logic>,
    ) -> Self {
        self.items.push(Condition {
            column: column.into(),
            operator: op.to_string(),
            operand: operand.into(),
            logic,
        });
        self
    }

    /// Number of conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parses a JSON condition list.
    ///
    /// Object form, one entry per column:
    ///
    /// | Value | Meaning |
    /// |-------|---------|
    /// | scalar | `col = v` |
    /// | `[op, v]` | `col op v` |
    /// | `[op, a, b, ...]` | `col op (a, b, ...)` |
    /// | `["OR" \| "AND", v]` | `col = v` with that connective |
    /// | `["OR" \| "AND", op, v, ...]` | `col op v` with that connective |
    ///
    /// Array form: `[[col, v], [col, op, v], ...]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryBuild`] for any other shape.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => map
                .iter()
                .try_fold(Self::new(), |acc, (column, value)| acc.push_json(column, value)),
            serde_json::Value::Array(entries) => entries.iter().try_fold(Self::new(), |acc, entry| {
                match entry.as_array().map(Vec::as_slice) {
                    Some([column, value]) => {
                        let column = json_column(column)?;
                        Ok(acc.push(column, "=", Operand::from_json_items(std::slice::from_ref(value)), None))
                    },
                    Some([column, op, rest @ ..]) if !rest.is_empty() => {
                        let column = json_column(column)?;
                        let op = json_operator(op)?;
                        Ok(acc.push(column, &op, Operand::from_json_items(rest), None))
                    },
                    _ => Err(Error::build(format!("unsupported condition entry: {entry}"))),
                }
            }),
            other => Err(Error::build(format!("unsupported condition list: {other}"))),
        }
    }

    fn push_json(self, column: &str, value: &serde_json::Value) -> Result<Self> {
        let Some(items) = value.as_array() else {
            return Ok(self.push(column, "=", Operand::from_json_items(std::slice::from_ref(value)), None));
        };
        let (logic, rest) = match items.split_first() {
            Some((head, rest)) => match head.as_str().and_then(Logic::parse) {
                Some(logic) => (Some(logic), rest),
                None => (None, items.as_slice()),
            },
            None => (None, items.as_slice()),
        };
        match rest {
            [] => Err(Error::build(format!("empty condition for '{column}'"))),
            [value] => Ok(self.push(column, "=", Operand::from_json_items(std::slice::from_ref(value)), logic)),
            [op, values @ ..] => {
                let op = json_operator(op)?;
                Ok(self.push(column, &op, Operand::from_json_items(values), logic))
            },
        }
    }

    /// Converts the list into predicate nodes.
    ///
    /// Entries without an explicit connective use `default_logic`.
    pub(crate) fn into_nodes(self, default_logic: Logic) -> Result<Vec<PredicateNode>> {
        self.items
            .into_iter()
            .map(|c| {
                PredicateNode::parse_leaf(
                    c.column,
                    &c.operator,
                    c.operand,
                    c.logic.unwrap_or(default_logic),
                )
            })
            .collect()
    }
}

fn json_column(value: &serde_json::Value) -> Result<String> {
    value
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| Error::build(format!("condition column must be a string, got {value}")))
}

fn json_operator(value: &serde_json::Value) -> Result<String> {
    value
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| Error::build(format!("condition operator must be a string, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compiler::compile;
    use crate::Value;
    use serde_json::json;

    fn compiled(conditions: Conditions, logic: Logic) -> (String, Vec<Value>) {
        compile(&conditions.into_nodes(logic).unwrap())
    }

    #[test]
    fn test_duplicate_columns_are_kept() {
        let conditions = Conditions::new()
            .or_eq("status", "active")
            .or_eq("status", "pending");
        let (sql, params) = compiled(conditions, Logic::And);
        assert_eq!(sql, "`status` = ? OR `status` = ?");
        assert_eq!(params, vec![Value::from("active"), Value::from("pending")]);
    }

    #[test]
    fn test_default_logic_applies() {
        let (sql, _) = compiled(Conditions::new().eq("a", 1).eq("b", 2), Logic::Or);
        assert_eq!(sql, "`a` = ? OR `b` = ?");
    }

    #[test]
    fn test_object_form() {
        let conditions = Conditions::from_json(&json!({
            "age": [">", 18],
            "id": ["in", 1, 2, 3],
            "name": "Ann",
            "score": ["between", [10, 20]],
            "status": ["OR", "active"],
            "tag": ["OR", "find_in_set", "red"],
        }))
        .unwrap();
        let (sql, params) = compiled(conditions, Logic::And);
        assert_eq!(
            sql,
            "`age` > ? AND `id` IN(?,?,?) AND `name` = ? AND `score` BETWEEN ? AND ? \
             OR `status` = ? OR FIND_IN_SET(?, `tag`)"
        );
        assert_eq!(params.len(), 9);
    }

    #[test]
    fn test_array_form() {
        let conditions =
            Conditions::from_json(&json!([["name", "Ann"], ["age", ">=", 21]])).unwrap();
        let (sql, params) = compiled(conditions, Logic::And);
        assert_eq!(sql, "`name` = ? AND `age` >= ?");
        assert_eq!(params, vec![Value::from("Ann"), Value::Int(21)]);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(Conditions::from_json(&json!("age = 1")).is_err());
        assert!(Conditions::from_json(&json!([["only"]])).is_err());
        assert!(Conditions::from_json(&json!({"age": []})).is_err());
        assert!(Conditions::from_json(&json!({"age": [5, 6]})).is_err());
    }

    #[test]
    fn test_unknown_operator_surfaces_on_conversion() {
        let conditions = Conditions::from_json(&json!({"age": ["~", 1]})).unwrap();
        assert!(conditions.into_nodes(Logic::And).is_err());
    }
}
