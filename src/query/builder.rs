//! Fluent statement builder and its terminal operations.

use super::conditions::Conditions;
use super::predicate::{Logic, Operand, Operator, PredicateNode};
use super::sql::{
    Statement, build_count, build_delete, build_insert, build_insert_list, build_select,
    build_update,
};
use super::state::{Limit, QueryState};
use crate::connection::{Connection, Route};
use crate::models::{Changes, Page, Record, Row, Value};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Column alias used for aggregate projections.
const AGGREGATE_ALIAS: &str = "dbflow_aggregate";

/// WHERE methods shared by [`Query`] and [`WhereGroup`].
///
/// Each expects an inherent `push_predicate(&mut self, Result<PredicateNode>)`.
macro_rules! predicate_methods {
    () => {
        /// `AND column <op> value`. `op` is one of `= < <= > >= <> != like
        /// between in find_in_set` (case-insensitive).
        #[must_use]
        pub fn and_where(
            mut self,
            column: impl Into<String>,
            op: &str,
            value: impl Into<Operand>,
        ) -> Self {
            self.push_predicate(PredicateNode::parse_leaf(column, op, value, Logic::And));
            self
        }

        /// `OR column <op> value`.
        #[must_use]
        pub fn or_where(
            mut self,
            column: impl Into<String>,
            op: &str,
            value: impl Into<Operand>,
        ) -> Self {
            self.push_predicate(PredicateNode::parse_leaf(column, op, value, Logic::Or));
            self
        }

        /// `AND column = value`.
        #[must_use]
        pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Operand>) -> Self {
            self.push_predicate(PredicateNode::leaf(column, Operator::Eq, value, Logic::And));
            self
        }

        /// `OR column = value`.
        #[must_use]
        pub fn or_where_eq(mut self, column: impl Into<String>, value: impl Into<Operand>) -> Self {
            self.push_predicate(PredicateNode::leaf(column, Operator::Eq, value, Logic::Or));
            self
        }

        /// `AND column IN(...)`. An empty list matches nothing.
        #[must_use]
        pub fn where_in(mut self, column: impl Into<String>, values: impl Into<Operand>) -> Self {
            self.push_predicate(PredicateNode::leaf(column, Operator::In, values, Logic::And));
            self
        }

        /// `AND column BETWEEN low AND high`.
        #[must_use]
        pub fn where_between(
            mut self,
            column: impl Into<String>,
            low: impl Into<Value>,
            high: impl Into<Value>,
        ) -> Self {
            let operand = Operand::Pair(low.into(), high.into());
            self.push_predicate(PredicateNode::leaf(
                column,
                Operator::Between,
                operand,
                Logic::And,
            ));
            self
        }

        /// `AND column like pattern`.
        #[must_use]
        pub fn where_like(mut self, column: impl Into<String>, pattern: impl Into<Value>) -> Self {
            self.push_predicate(PredicateNode::leaf(
                column,
                Operator::Like,
                Operand::Single(pattern.into()),
                Logic::And,
            ));
            self
        }

        /// `AND FIND_IN_SET(value, column)`.
        #[must_use]
        pub fn where_find_in_set(
            mut self,
            column: impl Into<String>,
            value: impl Into<Value>,
        ) -> Self {
            self.push_predicate(PredicateNode::leaf(
                column,
                Operator::FindInSet,
                Operand::Single(value.into()),
                Logic::And,
            ));
            self
        }

        /// `AND <sql>`, inserted verbatim with its own parameters.
        #[must_use]
        pub fn where_raw(mut self, sql: &str, params: Vec<Value>) -> Self {
            self.push_raw(Logic::And, sql, params);
            self
        }

        /// `OR <sql>`, inserted verbatim with its own parameters.
        #[must_use]
        pub fn or_where_raw(mut self, sql: &str, params: Vec<Value>) -> Self {
            self.push_raw(Logic::Or, sql, params);
            self
        }

        /// Appends a batch of conditions joined with `AND`.
        #[must_use]
        pub fn where_conditions(mut self, conditions: Conditions) -> Self {
            self.push_conditions(conditions.into_nodes(Logic::And));
            self
        }

        /// Appends a batch of conditions joined with `OR`.
        #[must_use]
        pub fn or_where_conditions(mut self, conditions: Conditions) -> Self {
            self.push_conditions(conditions.into_nodes(Logic::Or));
            self
        }

        /// Appends conditions parsed from JSON, see [`Conditions::from_json`].
        #[must_use]
        pub fn where_json(mut self, json: &serde_json::Value) -> Self {
            self.push_conditions(
                Conditions::from_json(json).and_then(|c| c.into_nodes(Logic::And)),
            );
            self
        }

        /// `AND (<group>)`. A group that adds nothing is skipped.
        #[must_use]
        pub fn where_group(mut self, build: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
            self.push_group(Logic::And, build(WhereGroup::default()));
            self
        }

        /// `OR (<group>)`. A group that adds nothing is skipped.
        #[must_use]
        pub fn or_where_group(mut self, build: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
            self.push_group(Logic::Or, build(WhereGroup::default()));
            self
        }

        fn push_conditions(&mut self, nodes: Result<Vec<PredicateNode>>) {
            match nodes {
                Ok(nodes) => {
                    for node in nodes {
                        self.push_predicate(Ok(node));
                    }
                },
                Err(e) => self.push_predicate(Err(e)),
            }
        }

        fn push_group(&mut self, logic: Logic, group: WhereGroup) {
            if let Some(e) = group.error {
                self.push_predicate(Err(e));
                return;
            }
            let node = PredicateNode::Group {
                logic,
                nodes: group.nodes,
            };
            if !node.is_blank() {
                self.push_predicate(Ok(node));
            }
        }

        fn push_raw(&mut self, logic: Logic, sql: &str, params: Vec<Value>) {
            let node = PredicateNode::raw(logic, sql, params);
            if !node.is_blank() {
                self.push_predicate(Ok(node));
            }
        }
    };
}

/// A parenthesised predicate group under construction.
///
/// Passed to the closure of [`Query::where_group`]; supports the same WHERE
/// methods as [`Query`], including nested groups.
#[derive(Debug, Default)]
pub struct WhereGroup {
    nodes: Vec<PredicateNode>,
    error: Option<Error>,
}

impl WhereGroup {
    predicate_methods!();

    fn push_predicate(&mut self, node: Result<PredicateNode>) {
        if self.error.is_some() {
            return;
        }
        match node {
            Ok(node) => self.nodes.push(node),
            Err(e) => self.error = Some(e),
        }
    }
}

/// Result of [`Query::column_by`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyedColumn {
    /// The only selected field is the key itself: its values, in row order.
    Flat(Vec<Value>),
    /// One selected field: key value to field value.
    Values(Vec<(Value, Value)>),
    /// Several selected fields: key value to the whole row.
    Rows(Vec<(Value, Row)>),
}

impl KeyedColumn {
    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(v) => v.len(),
            Self::Values(v) => v.len(),
            Self::Rows(r) => r.len(),
        }
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One logical statement under construction.
///
/// Builder methods return the query for chaining; terminal methods consume it,
/// so a query runs at most once. The first builder error is kept and returned
/// by the terminal method without touching the database.
///
/// # Example
///
/// ```rust,ignore
/// let adults = conn
///     .table("users")
///     .and_where("age", ">=", 18)
///     .where_group(|g| g.where_eq("status", "active").or_where_eq("status", "trial"))
///     .order_by("id DESC")
///     .list(false)?;
/// ```
pub struct Query<'a> {
    conn: &'a Connection,
    route: Route<'a>,
    state: QueryState,
    page: Option<&'a mut Page>,
    error: Option<Error>,
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let route = match self.route {
            Route::Auto => "auto",
            Route::Pinned(_) => "pinned",
        };
        f.debug_struct("Query")
            .field("route", &route)
            .field("state", &self.state)
            .field("page", &self.page)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<'a> Query<'a> {
    pub(crate) fn new(conn: &'a Connection, route: Route<'a>, table: String) -> Self {
        Self {
            conn,
            route,
            state: QueryState::new(table),
            page: None,
            error: None,
        }
    }

    predicate_methods!();

    fn push_predicate(&mut self, node: Result<PredicateNode>) {
        if self.error.is_some() {
            return;
        }
        match node {
            Ok(node) => self.state.predicates.push(node),
            Err(e) => self.error = Some(e),
        }
    }

    /// `AND <primary key> = value`, resolving the key from table metadata.
    #[must_use]
    pub fn where_pk(mut self, value: impl Into<Operand>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let node = self
            .conn
            .table_metadata(self.route, &self.state.table)
            .and_then(|meta| {
                if meta.primary_key.is_empty() {
                    Err(Error::build(format!(
                        "table '{}' has no primary key",
                        self.state.table
                    )))
                } else {
                    PredicateNode::leaf(meta.primary_key.clone(), Operator::Eq, value, Logic::And)
                }
            });
        self.push_predicate(node);
        self
    }

    /// Sets the table alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.state.alias = alias.into();
        self
    }

    /// Sets the projection, e.g. `"id, name"`.
    #[must_use]
    pub fn select(mut self, fields: impl Into<String>) -> Self {
        self.state.select = fields.into();
        self
    }

    /// Appends a join clause, e.g. `"LEFT JOIN orders o ON o.user_id = u.id"`.
    #[must_use]
    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.state.joins.push(clause.into());
        self
    }

    /// Appends a join clause with parameters for its `?` placeholders.
    #[must_use]
    pub fn join_with<V: Into<Value>>(
        mut self,
        clause: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.state.joins.push(clause.into());
        self.state.join_params.extend(values.into_iter().map(Into::into));
        self
    }

    /// Sets `GROUP BY`.
    #[must_use]
    pub fn group_by(mut self, expr: impl Into<String>) -> Self {
        self.state.group_by = expr.into();
        self
    }

    /// Sets `HAVING`.
    #[must_use]
    pub fn having(mut self, expr: impl Into<String>) -> Self {
        self.state.having = expr.into();
        self
    }

    /// Sets `ORDER BY`.
    #[must_use]
    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.state.order_by = expr.into();
        self
    }

    /// `LIMIT count`.
    #[must_use]
    pub const fn limit(mut self, count: u64) -> Self {
        self.state.limit = Some(Limit::Count(count));
        self
    }

    /// `LIMIT offset,count`.
    #[must_use]
    pub const fn limit_range(mut self, offset: u64, count: u64) -> Self {
        self.state.limit = Some(Limit::Range { offset, count });
        self
    }

    /// Attaches a page: sets `LIMIT (p-1)*limit,limit` and lets
    /// [`list`](Self::list) write the totals back.
    #[must_use]
    pub fn page(mut self, page: &'a mut Page) -> Self {
        self.state.limit = Some(Limit::Range {
            offset: page.offset(),
            count: page.limit,
        });
        self.page = Some(page);
        self
    }

    /// Appends `FOR UPDATE` to the main SELECT.
    #[must_use]
    pub const fn for_update(mut self) -> Self {
        self.state.for_update = true;
        self
    }

    /// Binds parameters for `?` placeholders in the projection.
    ///
    /// They are bound ahead of every join and WHERE parameter, and left out of
    /// the pagination COUNT whenever that statement drops the projection.
    #[must_use]
    pub fn bind<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.state.select_params.extend(values.into_iter().map(Into::into));
        self
    }

    /// The accumulated state.
    #[must_use]
    pub const fn state(&self) -> &QueryState {
        &self.state
    }

    /// Compiles the SELECT without running it.
    pub fn to_sql(self) -> Result<Statement> {
        let state = self.into_state()?;
        build_select(&state)
    }

    fn into_state(self) -> Result<QueryState> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.state),
        }
    }

    fn check(&self) -> Result<()> {
        if self.state.table.trim().is_empty() {
            return Err(Error::build("db table name is empty"));
        }
        Ok(())
    }

    fn fetch(self) -> Result<Vec<Row>> {
        let conn = self.conn;
        let route = self.route;
        let state = self.into_state()?;
        let stmt = build_select(&state)?;
        conn.fetch_all(route, "select", &stmt)
    }

    /// Returns the first matching row.
    pub fn row(mut self) -> Result<Option<Row>> {
        self.state.limit = Some(Limit::Count(1));
        Ok(self.fetch()?.into_iter().next())
    }

    /// Returns the first column of the first matching row.
    ///
    /// An empty `field` keeps the current projection.
    pub fn value(mut self, field: &str) -> Result<Option<Value>> {
        if !field.trim().is_empty() {
            self.state.select = field.to_string();
        }
        Ok(self
            .row()?
            .and_then(|row| row.into_values().into_iter().next()))
    }

    /// Returns the first column of every matching row.
    pub fn column(mut self, field: &str) -> Result<Vec<Value>> {
        if !field.trim().is_empty() {
            self.state.select = field.to_string();
        }
        Ok(self
            .fetch()?
            .into_iter()
            .filter_map(|row| row.into_values().into_iter().next())
            .collect())
    }

    /// Returns matching rows keyed by `key`.
    ///
    /// With a single selected field each key maps to that field's value;
    /// otherwise it maps to the whole row. `key` is added to the projection
    /// when missing. Duplicate keys keep the last row, at the position of the
    /// first. Selecting only the key yields its values as a flat column.
    pub fn column_by(mut self, fields: &str, key: &str) -> Result<KeyedColumn> {
        let key_name = output_name(key);
        let selected: Vec<&str> = fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();
        if key_name.is_empty() || selected.is_empty() {
            return Err(Error::build("column_by needs fields and a key column"));
        }
        let value_field = match selected.as_slice() {
            [only] if output_name(only) == key_name => {
                return self.column(only).map(KeyedColumn::Flat);
            },
            [only] => Some(output_name(only)),
            _ => None,
        };
        self.state.select = if selected.iter().any(|f| output_name(f) == key_name) {
            selected.join(",")
        } else {
            format!("{key},{}", selected.join(","))
        };

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut keyed: Vec<(Value, Row)> = Vec::new();
        for row in self.fetch()? {
            let Some(k) = row.get(&key_name).cloned() else {
                continue;
            };
            match index.get(&k.to_debug_literal()) {
                Some(&pos) => keyed[pos].1 = row,
                None => {
                    index.insert(k.to_debug_literal(), keyed.len());
                    keyed.push((k, row));
                },
            }
        }

        Ok(match value_field {
            Some(field) => KeyedColumn::Values(
                keyed
                    .into_iter()
                    .map(|(k, mut row)| {
                        let v = row.take(&field).unwrap_or_default();
                        (k, v)
                    })
                    .collect(),
            ),
            None => KeyedColumn::Rows(keyed),
        })
    }

    /// Returns every matching row.
    ///
    /// With a page attached and `need_page` set, a `COUNT(*)` statement runs
    /// first and its result is written to the page. With `need_page` unset the
    /// page totals are zeroed and no count runs.
    pub fn list(self, need_page: bool) -> Result<Vec<Row>> {
        let Self {
            conn,
            route,
            state,
            page,
            error,
        } = self;
        if let Some(e) = error {
            return Err(e);
        }
        if let Some(page) = page {
            if need_page {
                let stmt = build_count(&state)?;
                let total = conn
                    .fetch_all(route, "count", &stmt)?
                    .into_iter()
                    .next()
                    .and_then(|row| row.get_index(0).and_then(Value::as_i64))
                    .unwrap_or(0);
                page.record_total(u64::try_from(total).unwrap_or(0));
            } else {
                page.reset_totals();
            }
        }
        let stmt = build_select(&state)?;
        conn.fetch_all(route, "select", &stmt)
    }

    fn aggregate(mut self, func: &str, field: &str) -> Result<Value> {
        let field = if field.trim().is_empty() { "*" } else { field.trim() };
        self.state.select = format!("{func}({field}) AS {AGGREGATE_ALIAS}");
        let value = self.value("")?.unwrap_or_default();
        Ok(if value.is_falsy() { Value::Int(0) } else { value })
    }

    /// `COUNT(*)` of the matching rows.
    pub fn count(self) -> Result<u64> {
        self.count_of("*")
    }

    /// `COUNT(field)` of the matching rows.
    pub fn count_of(self, field: &str) -> Result<u64> {
        let value = self.aggregate("COUNT", field)?;
        Ok(value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0))
    }

    /// `SUM(field)`; `0` when nothing matches.
    pub fn sum(self, field: &str) -> Result<Value> {
        self.aggregate("SUM", field)
    }

    /// `AVG(field)`; `0` when nothing matches.
    pub fn avg(self, field: &str) -> Result<Value> {
        self.aggregate("AVG", field)
    }

    /// `MAX(field)`; `0` when nothing matches.
    pub fn max(self, field: &str) -> Result<Value> {
        self.aggregate("MAX", field)
    }

    /// `MIN(field)`; `0` when nothing matches.
    pub fn min(self, field: &str) -> Result<Value> {
        self.aggregate("MIN", field)
    }

    /// `field = field + step` on the matching rows.
    pub fn inc(self, field: &str, step: impl Into<Value>) -> Result<u64> {
        self.update(Changes::new().increment(field, step))
    }

    /// `field = field - step` on the matching rows.
    pub fn dec(self, field: &str, step: impl Into<Value>) -> Result<u64> {
        self.update(Changes::new().decrement(field, step))
    }

    /// Inserts one row and returns its key.
    ///
    /// Columns the table does not have are dropped (or rejected when the
    /// connection uses strict fields). Returns the generated id for an
    /// auto-increment primary key, otherwise the supplied primary-key value
    /// (`Null` if none was supplied).
    pub fn insert(self, mut record: Record) -> Result<Value> {
        self.check()?;
        if record.is_empty() {
            return Err(Error::build("db insert data is empty"));
        }
        let conn = self.conn;
        let route = self.route;
        let state = self.into_state()?;
        let meta = conn.table_metadata(route, &state.table)?;
        conn.filter_record(&state.table, &meta, &mut record)?;
        let stmt = build_insert(&state.table, &record)?;
        let outcome = conn.write(route, "insert", &stmt)?;
        if meta.pk_auto_increment {
            return Ok(outcome.last_insert_id.map_or(Value::Null, Value::Int));
        }
        Ok(record.get(&meta.primary_key).cloned().unwrap_or_default())
    }

    fn insert_many(self, mut records: Vec<Record>) -> Result<(u64, Option<i64>)> {
        self.check()?;
        if records.is_empty() {
            return Err(Error::build("db insert list is empty"));
        }
        let conn = self.conn;
        let route = self.route;
        let state = self.into_state()?;
        let meta = conn.table_metadata(route, &state.table)?;
        for record in &mut records {
            conn.filter_record(&state.table, &meta, record)?;
        }
        let stmt = build_insert_list(&state.table, &records)?;
        let outcome = conn.write(route, "insert", &stmt)?;
        Ok((outcome.affected, outcome.last_insert_id))
    }

    /// Inserts several rows with one multi-row INSERT; returns the affected count.
    ///
    /// Every record must carry the same columns in the same order.
    pub fn insert_list(self, records: Vec<Record>) -> Result<u64> {
        self.insert_many(records).map(|(affected, _)| affected)
    }

    /// Like [`insert_list`](Self::insert_list) but returns the id the driver
    /// reports for the batch.
    ///
    /// MySQL reports the id of the first inserted row; SQLite the last.
    pub fn insert_list_id(self, records: Vec<Record>) -> Result<Value> {
        self.insert_many(records)
            .map(|(_, id)| id.map_or(Value::Null, Value::Int))
    }

    /// Updates the matching rows; returns the affected count.
    ///
    /// Refuses to run without a WHERE clause.
    pub fn update(self, changes: impl Into<Changes>) -> Result<u64> {
        self.check()?;
        if self.error.is_none() && !self.state.has_conditions() {
            return Err(Error::build("db update need where condition"));
        }
        let mut changes = changes.into();
        if changes.is_empty() {
            return Err(Error::build("db update data is empty"));
        }
        let conn = self.conn;
        let route = self.route;
        let state = self.into_state()?;
        let meta = conn.table_metadata(route, &state.table)?;
        conn.filter_changes(&state.table, &meta, &mut changes)?;
        let stmt = build_update(&state, &changes)?;
        conn.write(route, "update", &stmt)
            .map(|outcome| outcome.affected)
    }

    /// Deletes the matching rows; returns the affected count.
    ///
    /// Refuses to run without a WHERE clause.
    pub fn delete(self) -> Result<u64> {
        self.check()?;
        let conn = self.conn;
        let route = self.route;
        let state = self.into_state()?;
        let stmt = build_delete(&state)?;
        conn.write(route, "delete", &stmt)
            .map(|outcome| outcome.affected)
    }
}

/// Name a projected field appears under in a result row.
///
/// `u.name` → `name`, `` `name` `` → `name`, `COUNT(*) AS n` → `n`.
///
/// An unaliased call such as `COUNT(o.id)` keeps the whole expression, which
/// is the column name the server reports for it.
fn output_name(field: &str) -> String {
    let field = field.trim();
    let lower = field.to_ascii_lowercase();
    let name = lower
        .rfind(" as ")
        .map_or(field, |idx| &field[idx + 4..])
        .trim();
    if name.contains('(') {
        return name.to_string();
    }
    let name = name.rsplit('.').next().unwrap_or(name);
    name.trim_matches('`').to_string()
}
